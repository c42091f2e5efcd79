//! Drag-and-drop coordinator: phase reordering, activity moves and
//! palette drops with duplicate admission control.

use campaign_core::event_bus::BuilderEventType;
use campaign_core::{BuilderError, BuilderResult};
use tracing::{info, warn};

use crate::builder::PhaseBuilder;
use crate::prompt::DUPLICATE_ACTIVITY_ALERT;
use crate::renumber::RenumberReport;
use crate::store::BlockId;
use crate::types::{ActivityIdentity, PaletteItem};

/// Result of dropping an activity onto a phase's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The block now sits in the target list; `report` covers the
    /// renumbering of every list the drop touched.
    Accepted { block: BlockId, report: RenumberReport },
    /// The drop was undone. The operator has already been alerted.
    Rejected { reason: String },
}

impl DropOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DropOutcome::Accepted { .. })
    }
}

impl PhaseBuilder {
    /// Activity lists only accept drops once their phase has an id.
    fn ensure_drop_target(&self, phase: BlockId) -> BuilderResult<()> {
        if self.store.phase(phase)?.is_saved() {
            Ok(())
        } else {
            Err(BuilderError::NotDropTarget(phase.0))
        }
    }

    /// Scans the target list for an activity with the same identity. On a
    /// match the operator is alerted and the rejection is returned.
    fn admit(
        &self,
        phase: BlockId,
        identity: &ActivityIdentity,
        moving: Option<BlockId>,
    ) -> Option<DropOutcome> {
        self.store.find_duplicate(phase, identity, moving)?;
        let reason = BuilderError::DuplicateActivity {
            activity_type: identity.activity_type.clone(),
            activity_id: identity.activity_id,
        }
        .to_string();
        warn!(block = %phase, activity = %identity, "Rejected duplicate activity drop");
        self.prompt.alert(DUPLICATE_ACTIVITY_ALERT);
        self.emit(BuilderEventType::DropRejected, phase, None, Some(identity.to_string()));
        Some(DropOutcome::Rejected { reason })
    }

    /// Drops a phase at `to_index` of the phase list and renumbers the
    /// whole list.
    pub async fn move_phase(&mut self, key: BlockId, to_index: usize) -> BuilderResult<RenumberReport> {
        self.store.move_phase(key, to_index)?;
        info!(block = %key, to_index, "Moved phase");
        Ok(self.renumber_phases().await)
    }

    /// Drops an existing activity at `to_index` of `target`'s list, which
    /// may be its own phase. A cross-phase move passes the same admission
    /// check as a palette drop, and both lists are renumbered.
    pub async fn move_activity(
        &mut self,
        key: BlockId,
        target: BlockId,
        to_index: usize,
    ) -> BuilderResult<DropOutcome> {
        let block = self.store.activity(key)?;
        let (source, identity) = (block.phase, block.identity());
        self.ensure_drop_target(target)?;
        if source != target {
            if let Some(rejected) = self.admit(target, &identity, Some(key)) {
                return Ok(rejected);
            }
        }

        self.store.move_activity(key, target, to_index)?;
        info!(block = %key, from = %source, to = %target, to_index, "Moved activity");
        let mut report = self.renumber_activities(target).await?;
        if source != target {
            report.merge(self.renumber_activities(source).await?);
        }
        Ok(DropOutcome::Accepted { block: key, report })
    }

    /// Receives a palette item at `index` of `phase`'s list. A duplicate is
    /// rejected before anything is materialized; otherwise a fresh, open
    /// activity block is inserted and the list renumbered.
    pub async fn drop_from_palette(
        &mut self,
        phase: BlockId,
        index: usize,
        item: &PaletteItem,
    ) -> BuilderResult<DropOutcome> {
        self.ensure_drop_target(phase)?;
        if let Some(rejected) = self.admit(phase, &item.identity(), None) {
            return Ok(rejected);
        }

        let key = self.store.insert_new_activity(phase, index, item)?;
        info!(
            block = %key,
            phase = %phase,
            activity_type = %item.activity_type,
            activity_id = item.activity_id,
            "Added activity from palette"
        );
        self.emit(BuilderEventType::ActivityAdded, key, None, Some(item.identity().to_string()));
        let report = self.renumber_activities(phase).await?;
        Ok(DropOutcome::Accepted { block: key, report })
    }

    /// Drop onto the empty-state zone of a phase: same admission, appended.
    pub async fn drop_on_empty_zone(&mut self, phase: BlockId, item: &PaletteItem) -> BuilderResult<DropOutcome> {
        let index = self.store.activity_count(phase);
        self.drop_from_palette(phase, index, item).await
    }
}
