//! Renumber sync: recomputes `order` after a structural change and
//! persists every block of the affected list.
//!
//! Every block is saved, not only the ones whose order moved, so the
//! server's stored order always matches the list as shown. The saves are
//! independent calls, all in flight at once; answers are applied in the
//! order they complete.

use std::sync::Arc;

use campaign_core::event_bus::BuilderEventType;
use campaign_core::{BuilderError, BuilderResult};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::builder::PhaseBuilder;
use crate::lifecycle::BlockTrigger;
use crate::store::BlockId;

/// Outcome of one renumbering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenumberReport {
    /// Blocks whose save succeeded, in completion order.
    pub saved: Vec<BlockId>,
    /// Blocks whose save failed, with the operator-facing message.
    pub failed: Vec<(BlockId, String)>,
}

impl RenumberReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: RenumberReport) {
        self.saved.extend(other.saved);
        self.failed.extend(other.failed);
    }
}

impl PhaseBuilder {
    /// Walks the whole phase list, assigns `order = position + 1` and saves
    /// every phase.
    pub async fn renumber_phases(&mut self) -> RenumberReport {
        self.store.assign_phase_orders();
        let keys = self.store.phase_keys().to_vec();
        let report = self.persist_all(keys).await;
        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Renumbered phases"
        );
        report
    }

    /// Renumbers and saves the activity list of a single phase.
    pub async fn renumber_activities(&mut self, phase: BlockId) -> BuilderResult<RenumberReport> {
        if self.store.phase(phase)?.id.is_none() {
            return Err(BuilderError::ParentUnsaved(phase.0));
        }
        self.store.assign_activity_orders(phase)?;
        let keys = self.store.activity_keys(phase)?.to_vec();
        let report = self.persist_all(keys).await;
        info!(
            block = %phase,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Renumbered activities"
        );
        Ok(report)
    }

    /// Re-saves only the blocks of a list that already have an id, after
    /// removing an unsaved block shifted them. Forms still being drafted
    /// are left alone.
    pub(crate) async fn resave_shifted(&mut self, keys: Vec<BlockId>) -> RenumberReport {
        let report = self.persist_all(keys).await;
        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Re-saved shifted blocks"
        );
        report
    }

    async fn persist_all(&mut self, keys: Vec<BlockId>) -> RenumberReport {
        let mut report = RenumberReport::default();
        let mut requests = Vec::with_capacity(keys.len());
        for key in keys {
            match self.prepare_save(key) {
                Ok(request) => requests.push(request),
                Err(e) => report.failed.push((key, e.user_message())),
            }
        }

        let client = Arc::clone(&self.client);
        let mut in_flight: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| {
                let client = Arc::clone(&client);
                async move {
                    let result = request.send(client.as_ref()).await;
                    (request, result)
                }
            })
            .collect();

        while let Some((request, result)) = in_flight.next().await {
            let key = request.key();
            match self.apply_save(&request, result, BlockTrigger::Sync) {
                Ok(_) => report.saved.push(key),
                Err(e) => {
                    warn!(block = %key, error = %e, "Renumber save failed");
                    report.failed.push((key, e.user_message()));
                }
            }
        }

        let saved = report.saved.clone();
        self.confirm_condition_ids(&saved).await;

        if let Some(first) = report.saved.first().or(report.failed.first().map(|(k, _)| k)) {
            self.emit(
                BuilderEventType::Renumbered,
                *first,
                None,
                Some(format!("saved={} failed={}", report.saved.len(), report.failed.len())),
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lifecycle::BlockState;
    use crate::memory::{MemoryBackend, Method};
    use crate::prompt::AutoConfirm;
    use crate::types::{Phase, PhaseFields};

    fn named(name: &str, order: u32) -> Phase {
        Phase {
            fields: PhaseFields {
                name: name.into(),
                ..PhaseFields::default()
            },
            order,
            ..Phase::default()
        }
    }

    #[tokio::test]
    async fn test_renumber_saves_every_phase() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_phase(named("A", 1));
        backend.insert_phase(named("B", 2));
        backend.insert_phase(named("C", 3));
        let mut builder = PhaseBuilder::new(backend.clone(), Arc::new(AutoConfirm::yes()));
        builder.load().await.unwrap();
        backend.clear_calls();

        let report = builder.renumber_phases().await;
        assert!(report.is_clean());
        assert_eq!(report.saved.len(), 3);
        assert_eq!(backend.calls_with(Method::Put).len(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_answers_are_applied() {
        let backend = Arc::new(MemoryBackend::new());
        let mut builder = PhaseBuilder::new(backend.clone(), Arc::new(AutoConfirm::yes()));
        let first = builder.add_phase();
        let second = builder.add_phase();

        // The first request answers last.
        backend.delay_next([Duration::from_millis(40), Duration::ZERO]);
        let report = builder.renumber_phases().await;

        assert_eq!(report.saved, vec![second, first]);
        let completions = backend.completions();
        assert_eq!(completions[0].body.as_ref().unwrap()["phase"]["order"], 2);
        assert_eq!(completions[1].body.as_ref().unwrap()["phase"]["order"], 1);

        for key in [first, second] {
            let block = builder.store().phase(key).unwrap();
            assert!(block.id.is_some());
            // Renumbering persists without closing the open form.
            assert_eq!(block.state(), BlockState::SavedOpen);
        }
        assert_eq!(builder.store().phase(first).unwrap().order, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let backend = Arc::new(MemoryBackend::new());
        let a = backend.insert_phase(named("A", 1));
        backend.insert_phase(named("B", 2));
        let mut builder = PhaseBuilder::new(backend.clone(), Arc::new(AutoConfirm::yes()));
        builder.load().await.unwrap();
        backend.fail_path(Method::Put, format!("/phases/{}.json", a), 422, "order is invalid");

        let report = builder.renumber_phases().await;
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1, "order is invalid");

        let failed = builder.store().find_phase_by_id(a).unwrap();
        assert_eq!(
            builder.store().phase(failed).unwrap().last_error.as_deref(),
            Some("order is invalid")
        );
    }

    #[tokio::test]
    async fn test_activity_renumber_needs_saved_phase() {
        let backend = Arc::new(MemoryBackend::new());
        let mut builder = PhaseBuilder::new(backend, Arc::new(AutoConfirm::yes()));
        let phase = builder.add_phase();
        assert!(matches!(
            builder.renumber_activities(phase).await,
            Err(BuilderError::ParentUnsaved(_))
        ));
    }
}
