//! Builder event bus — trait for observing what the phase builder does.
//!
//! The builder accepts an `Arc<dyn EventSink>` and emits one event per
//! structural change, save round trip or rejected drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderEventType {
    PhaseAdded,
    ActivityAdded,
    BlockSaved,
    BlockSaveFailed,
    BlockRemoved,
    ConditionAdded,
    ConditionRemoved,
    DropRejected,
    Renumbered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderEvent {
    pub event_id: Uuid,
    pub event_type: BuilderEventType,
    /// Local block key the event concerns.
    pub block: Option<u64>,
    /// Server id of the record, once known.
    pub record_id: Option<i64>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for receiving builder events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BuilderEvent);
}

/// No-op sink for callers that don't observe the builder.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: BuilderEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<BuilderEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<BuilderEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: BuilderEventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: BuilderEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `BuilderEvent`.
pub fn make_event(
    event_type: BuilderEventType,
    block: Option<u64>,
    record_id: Option<i64>,
    detail: Option<String>,
) -> BuilderEvent {
    BuilderEvent {
        event_id: Uuid::new_v4(),
        event_type,
        block,
        record_id,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
