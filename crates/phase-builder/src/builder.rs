//! Builder root, one instance per campaign editing session.

use std::sync::Arc;

use campaign_core::event_bus::{make_event, noop_sink, BuilderEventType, EventSink};
use campaign_core::BuilderResult;
use tracing::info;

use crate::persistence::PersistenceClient;
use crate::prompt::UserPrompt;
use crate::render::{render_builder, BuilderView};
use crate::store::{BlockId, BuilderStore};

/// Owns the entity store for one campaign and wires every builder
/// operation to the injected persistence client, prompt and event sink.
///
/// Operations are spread over the component modules: block editing in
/// `block`, condition rows in `conditions`, drag and drop in `dragdrop`,
/// order maintenance in `renumber`.
pub struct PhaseBuilder {
    pub(crate) store: BuilderStore,
    pub(crate) client: Arc<dyn PersistenceClient>,
    pub(crate) prompt: Arc<dyn UserPrompt>,
    pub(crate) events: Arc<dyn EventSink>,
    phase_count: u32,
}

impl std::fmt::Debug for PhaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseBuilder")
            .field("phases", &self.store.phase_len())
            .field("phase_count", &self.phase_count)
            .finish()
    }
}

impl PhaseBuilder {
    pub fn new(client: Arc<dyn PersistenceClient>, prompt: Arc<dyn UserPrompt>) -> Self {
        Self {
            store: BuilderStore::new(),
            client,
            prompt,
            events: noop_sink(),
            phase_count: 0,
        }
    }

    /// Attach an event sink for observing builder activity.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Replaces the session state with the campaign's phases as the server
    /// lists them. Every block starts closed.
    pub async fn load(&mut self) -> BuilderResult<usize> {
        let phases = self.client.list_phases().await?;
        self.store.clear();
        for phase in phases {
            self.store.insert_loaded_phase(phase);
        }
        self.phase_count = self.store.phase_len() as u32;
        info!(phases = self.phase_count, "Loaded campaign phases");
        Ok(self.store.phase_len())
    }

    /// Appends a new, open, unsaved phase. Its `order` is a placeholder
    /// taken from the monotonically increasing phase counter until the next
    /// save or renumbering pass derives the real one.
    pub fn add_phase(&mut self) -> BlockId {
        self.phase_count += 1;
        let key = self.store.insert_new_phase(self.phase_count);
        info!(block = %key, placeholder_order = self.phase_count, "Added phase");
        self.emit(BuilderEventType::PhaseAdded, key, None, None);
        key
    }

    pub fn phase_count(&self) -> u32 {
        self.phase_count
    }

    pub fn store(&self) -> &BuilderStore {
        &self.store
    }

    /// The current view projection of the whole builder.
    pub fn view(&self) -> BuilderView {
        render_builder(&self.store)
    }

    pub(crate) fn emit(
        &self,
        event_type: BuilderEventType,
        block: BlockId,
        record_id: Option<i64>,
        detail: Option<String>,
    ) {
        self.events
            .emit(make_event(event_type, Some(block.0), record_id, detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::BlockState;
    use crate::memory::MemoryBackend;
    use crate::prompt::AutoConfirm;
    use campaign_core::event_bus::capture_sink;

    #[tokio::test]
    async fn test_load_renders_closed_blocks_in_server_order() {
        let backend = Arc::new(MemoryBackend::with_demo_data());
        let mut builder = PhaseBuilder::new(backend, Arc::new(AutoConfirm::yes()));
        assert_eq!(builder.load().await.unwrap(), 2);

        let names: Vec<_> = builder.store().phases().map(|p| p.fields.name.clone()).collect();
        assert_eq!(names, vec!["Kickoff", "Wrap-up"]);
        assert!(builder
            .store()
            .phases()
            .all(|p| p.state() == BlockState::SavedClosed));
        assert_eq!(builder.phase_count(), 2);
    }

    #[tokio::test]
    async fn test_add_phase_uses_counter_placeholder() {
        let sink = capture_sink();
        let mut builder = PhaseBuilder::new(
            Arc::new(MemoryBackend::with_demo_data()),
            Arc::new(AutoConfirm::yes()),
        )
        .with_event_sink(sink.clone());
        builder.load().await.unwrap();

        let key = builder.add_phase();
        let block = builder.store().phase(key).unwrap();
        assert_eq!(block.order, 3);
        assert_eq!(block.fields.name, "Untitled");
        assert_eq!(block.state(), BlockState::UnsavedOpen);
        assert_eq!(sink.count_type(BuilderEventType::PhaseAdded), 1);
    }
}
