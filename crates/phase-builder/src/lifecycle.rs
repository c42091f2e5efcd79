use std::fmt;

use campaign_core::{BuilderError, BuilderResult};
use serde::{Deserialize, Serialize};

/// Editing state of one phase or activity block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    UnsavedOpen,
    SavedOpen,
    SavedClosed,
    Removed,
}

impl BlockState {
    pub fn is_open(self) -> bool {
        matches!(self, BlockState::UnsavedOpen | BlockState::SavedOpen)
    }

    pub fn is_saved(self) -> bool {
        matches!(self, BlockState::SavedOpen | BlockState::SavedClosed)
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockState::UnsavedOpen => "unsaved_open",
            BlockState::SavedOpen => "saved_open",
            BlockState::SavedClosed => "saved_closed",
            BlockState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// What moved a block between states.
///
/// `Sync` is the save issued by a renumbering pass: it persists the block
/// like `Save` but leaves an open form open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTrigger {
    Open,
    Close,
    Save,
    Sync,
    Cancel,
    Delete,
}

impl fmt::Display for BlockTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockTrigger::Open => "open",
            BlockTrigger::Close => "close",
            BlockTrigger::Save => "save",
            BlockTrigger::Sync => "sync",
            BlockTrigger::Cancel => "cancel",
            BlockTrigger::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Describes a single valid state transition for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: BlockState,
    pub to: BlockState,
    pub trigger: BlockTrigger,
}

const fn edge(from: BlockState, trigger: BlockTrigger, to: BlockState) -> StateTransition {
    StateTransition { from, to, trigger }
}

pub const TRANSITIONS: &[StateTransition] = &[
    // UnsavedOpen ->
    edge(BlockState::UnsavedOpen, BlockTrigger::Save, BlockState::SavedClosed),
    edge(BlockState::UnsavedOpen, BlockTrigger::Sync, BlockState::SavedOpen),
    edge(BlockState::UnsavedOpen, BlockTrigger::Open, BlockState::UnsavedOpen),
    edge(BlockState::UnsavedOpen, BlockTrigger::Cancel, BlockState::Removed),
    // SavedOpen ->
    edge(BlockState::SavedOpen, BlockTrigger::Save, BlockState::SavedClosed),
    edge(BlockState::SavedOpen, BlockTrigger::Sync, BlockState::SavedOpen),
    edge(BlockState::SavedOpen, BlockTrigger::Open, BlockState::SavedOpen),
    edge(BlockState::SavedOpen, BlockTrigger::Close, BlockState::SavedClosed),
    edge(BlockState::SavedOpen, BlockTrigger::Cancel, BlockState::SavedClosed),
    edge(BlockState::SavedOpen, BlockTrigger::Delete, BlockState::Removed),
    // SavedClosed ->
    edge(BlockState::SavedClosed, BlockTrigger::Save, BlockState::SavedClosed),
    edge(BlockState::SavedClosed, BlockTrigger::Sync, BlockState::SavedClosed),
    edge(BlockState::SavedClosed, BlockTrigger::Open, BlockState::SavedOpen),
    edge(BlockState::SavedClosed, BlockTrigger::Close, BlockState::SavedClosed),
    edge(BlockState::SavedClosed, BlockTrigger::Delete, BlockState::Removed),
];

/// Guards a block's editing lifecycle by enforcing the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLifecycle {
    state: BlockState,
}

impl BlockLifecycle {
    /// A block the operator just added: unsaved, form open.
    pub fn unsaved() -> Self {
        Self {
            state: BlockState::UnsavedOpen,
        }
    }

    /// A block materialized from server data: saved, form closed.
    pub fn loaded() -> Self {
        Self {
            state: BlockState::SavedClosed,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn next_state(&self, trigger: BlockTrigger) -> Option<BlockState> {
        TRANSITIONS
            .iter()
            .find(|t| t.from == self.state && t.trigger == trigger)
            .map(|t| t.to)
    }

    pub fn can_fire(&self, trigger: BlockTrigger) -> bool {
        self.next_state(trigger).is_some()
    }

    /// Checks that `trigger` is allowed without moving.
    pub fn check(&self, trigger: BlockTrigger) -> BuilderResult<BlockState> {
        self.next_state(trigger)
            .ok_or_else(|| BuilderError::InvalidTransition {
                from: self.state.to_string(),
                to: trigger.to_string(),
            })
    }

    /// Attempts to move the block via `trigger`.
    pub fn fire(&mut self, trigger: BlockTrigger) -> BuilderResult<BlockState> {
        let next = self.check(trigger)?;
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_saves_to_closed() {
        let mut lifecycle = BlockLifecycle::unsaved();
        assert_eq!(lifecycle.state(), BlockState::UnsavedOpen);
        assert_eq!(lifecycle.fire(BlockTrigger::Save).unwrap(), BlockState::SavedClosed);
        assert_eq!(lifecycle.fire(BlockTrigger::Open).unwrap(), BlockState::SavedOpen);
        assert_eq!(lifecycle.fire(BlockTrigger::Close).unwrap(), BlockState::SavedClosed);
    }

    #[test]
    fn test_cancel_depends_on_saved_state() {
        let mut unsaved = BlockLifecycle::unsaved();
        assert_eq!(unsaved.fire(BlockTrigger::Cancel).unwrap(), BlockState::Removed);

        let mut saved = BlockLifecycle::loaded();
        saved.fire(BlockTrigger::Open).unwrap();
        assert_eq!(saved.fire(BlockTrigger::Cancel).unwrap(), BlockState::SavedClosed);
    }

    #[test]
    fn test_sync_keeps_form_open() {
        let mut lifecycle = BlockLifecycle::unsaved();
        assert_eq!(lifecycle.fire(BlockTrigger::Sync).unwrap(), BlockState::SavedOpen);
        assert!(lifecycle.state().is_open());
        assert!(lifecycle.state().is_saved());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut unsaved = BlockLifecycle::unsaved();
        assert!(unsaved.fire(BlockTrigger::Delete).is_err());
        assert!(unsaved.fire(BlockTrigger::Close).is_err());
        assert_eq!(unsaved.state(), BlockState::UnsavedOpen);

        let mut removed = BlockLifecycle::loaded();
        removed.fire(BlockTrigger::Delete).unwrap();
        for trigger in [
            BlockTrigger::Open,
            BlockTrigger::Save,
            BlockTrigger::Cancel,
            BlockTrigger::Delete,
        ] {
            assert!(!removed.can_fire(trigger));
        }
    }
}
