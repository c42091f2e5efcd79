//! Command dispatch. Every operator trigger as a value, routed through a
//! single inspectable table.

use campaign_core::BuilderResult;
use serde::Serialize;
use tracing::debug;

use crate::builder::PhaseBuilder;
use crate::conditions::ConditionGate;
use crate::dragdrop::DropOutcome;
use crate::lifecycle::BlockState;
use crate::renumber::RenumberReport;
use crate::store::{BlockId, RowId};
use crate::types::{ActivityFields, ConditionKind, ConditionOperator, PaletteItem, PhaseFields, PhaseRef};

/// The trigger set the builder responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Load,
    AddPhase,
    Open,
    Close,
    Cancel,
    Save,
    Delete,
    EditPhase,
    EditActivity,
    AddCondition,
    RemoveCondition,
    SetConditionReference,
    SetConditionPredicate,
    SetConditionOperator,
    MovePhase,
    MoveActivity,
    DropFromPalette,
    DropOnEmptyZone,
}

impl Trigger {
    pub const ALL: [Trigger; 18] = [
        Trigger::Load,
        Trigger::AddPhase,
        Trigger::Open,
        Trigger::Close,
        Trigger::Cancel,
        Trigger::Save,
        Trigger::Delete,
        Trigger::EditPhase,
        Trigger::EditActivity,
        Trigger::AddCondition,
        Trigger::RemoveCondition,
        Trigger::SetConditionReference,
        Trigger::SetConditionPredicate,
        Trigger::SetConditionOperator,
        Trigger::MovePhase,
        Trigger::MoveActivity,
        Trigger::DropFromPalette,
        Trigger::DropOnEmptyZone,
    ];
}

#[derive(Debug, Clone)]
pub enum Command {
    Load,
    AddPhase,
    Open(BlockId),
    Close(BlockId),
    Cancel(BlockId),
    Save(BlockId),
    Delete(BlockId),
    EditPhase { block: BlockId, fields: PhaseFields },
    EditActivity { block: BlockId, fields: ActivityFields },
    AddCondition(BlockId),
    RemoveCondition { block: BlockId, row: RowId },
    SetPhaseConditionReference { block: BlockId, row: RowId, target: Option<PhaseRef> },
    SetActivityConditionReference { block: BlockId, row: RowId, target: Option<i64> },
    SetConditionPredicate { block: BlockId, row: RowId, predicate: Option<ConditionKind> },
    SetConditionOperator { block: BlockId, row: RowId, operator: Option<ConditionOperator> },
    MovePhase { block: BlockId, to_index: usize },
    MoveActivity { block: BlockId, target: BlockId, to_index: usize },
    DropFromPalette { phase: BlockId, index: usize, item: PaletteItem },
    DropOnEmptyZone { phase: BlockId, item: PaletteItem },
}

impl Command {
    pub fn trigger(&self) -> Trigger {
        match self {
            Command::Load => Trigger::Load,
            Command::AddPhase => Trigger::AddPhase,
            Command::Open(_) => Trigger::Open,
            Command::Close(_) => Trigger::Close,
            Command::Cancel(_) => Trigger::Cancel,
            Command::Save(_) => Trigger::Save,
            Command::Delete(_) => Trigger::Delete,
            Command::EditPhase { .. } => Trigger::EditPhase,
            Command::EditActivity { .. } => Trigger::EditActivity,
            Command::AddCondition(_) => Trigger::AddCondition,
            Command::RemoveCondition { .. } => Trigger::RemoveCondition,
            Command::SetPhaseConditionReference { .. } | Command::SetActivityConditionReference { .. } => {
                Trigger::SetConditionReference
            }
            Command::SetConditionPredicate { .. } => Trigger::SetConditionPredicate,
            Command::SetConditionOperator { .. } => Trigger::SetConditionOperator,
            Command::MovePhase { .. } => Trigger::MovePhase,
            Command::MoveActivity { .. } => Trigger::MoveActivity,
            Command::DropFromPalette { .. } => Trigger::DropFromPalette,
            Command::DropOnEmptyZone { .. } => Trigger::DropOnEmptyZone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Loaded(usize),
    Added(BlockId),
    State(BlockState),
    Saved(i64),
    /// `None` when the operator declined the confirmation.
    Deleted(Option<RenumberReport>),
    Edited,
    RowAdded(RowId),
    Gate(ConditionGate),
    Renumbered(RenumberReport),
    Dropped(DropOutcome),
}

impl PhaseBuilder {
    /// Registered triggers, in dispatch-table order.
    pub fn triggers(&self) -> &'static [Trigger] {
        &Trigger::ALL
    }

    pub async fn dispatch(&mut self, command: Command) -> BuilderResult<CommandOutcome> {
        debug!(trigger = ?command.trigger(), "Dispatching command");
        let outcome = match command {
            Command::Load => CommandOutcome::Loaded(self.load().await?),
            Command::AddPhase => CommandOutcome::Added(self.add_phase()),
            Command::Open(block) => CommandOutcome::State(self.open(block)?),
            Command::Close(block) => CommandOutcome::State(self.close(block)?),
            Command::Cancel(block) => CommandOutcome::State(self.cancel(block).await?),
            Command::Save(block) => CommandOutcome::Saved(self.save(block).await?),
            Command::Delete(block) => CommandOutcome::Deleted(self.delete(block).await?),
            Command::EditPhase { block, fields } => {
                self.edit_phase(block, fields)?;
                CommandOutcome::Edited
            }
            Command::EditActivity { block, fields } => {
                self.edit_activity(block, fields)?;
                CommandOutcome::Edited
            }
            Command::AddCondition(block) => CommandOutcome::RowAdded(self.add_condition(block)?),
            Command::RemoveCondition { block, row } => {
                self.remove_condition(block, row).await?;
                CommandOutcome::Edited
            }
            Command::SetPhaseConditionReference { block, row, target } => {
                CommandOutcome::Gate(self.set_phase_condition_target(block, row, target)?)
            }
            Command::SetActivityConditionReference { block, row, target } => {
                CommandOutcome::Gate(self.set_activity_condition_target(block, row, target)?)
            }
            Command::SetConditionPredicate { block, row, predicate } => {
                self.set_condition_predicate(block, row, predicate)?;
                CommandOutcome::Edited
            }
            Command::SetConditionOperator { block, row, operator } => {
                self.set_condition_operator(block, row, operator)?;
                CommandOutcome::Edited
            }
            Command::MovePhase { block, to_index } => {
                CommandOutcome::Renumbered(self.move_phase(block, to_index).await?)
            }
            Command::MoveActivity {
                block,
                target,
                to_index,
            } => CommandOutcome::Dropped(self.move_activity(block, target, to_index).await?),
            Command::DropFromPalette { phase, index, item } => {
                CommandOutcome::Dropped(self.drop_from_palette(phase, index, &item).await?)
            }
            Command::DropOnEmptyZone { phase, item } => {
                CommandOutcome::Dropped(self.drop_on_empty_zone(phase, &item).await?)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryBackend;
    use crate::prompt::AutoConfirm;

    fn builder() -> PhaseBuilder {
        PhaseBuilder::new(
            Arc::new(MemoryBackend::with_demo_data()),
            Arc::new(AutoConfirm::yes()),
        )
    }

    #[test]
    fn test_trigger_table_is_unique() {
        let builder = builder();
        let unique: HashSet<_> = builder.triggers().iter().collect();
        assert_eq!(unique.len(), builder.triggers().len());
    }

    #[tokio::test]
    async fn test_dispatch_add_edit_save() {
        let mut builder = builder();
        assert_eq!(builder.dispatch(Command::Load).await.unwrap(), CommandOutcome::Loaded(2));

        let CommandOutcome::Added(key) = builder.dispatch(Command::AddPhase).await.unwrap() else {
            panic!("expected a new block");
        };
        let fields = PhaseFields {
            name: "Follow-up".into(),
            ..PhaseFields::default()
        };
        builder
            .dispatch(Command::EditPhase { block: key, fields })
            .await
            .unwrap();
        let outcome = builder.dispatch(Command::Save(key)).await.unwrap();
        assert!(matches!(outcome, CommandOutcome::Saved(_)));
        assert_eq!(builder.state_of(key).unwrap(), BlockState::SavedClosed);
    }

    #[tokio::test]
    async fn test_dispatch_condition_reference_returns_gate() {
        let mut builder = builder();
        builder.load().await.unwrap();
        let key = builder.store().phase_keys()[1];
        builder.dispatch(Command::Open(key)).await.unwrap();
        let CommandOutcome::RowAdded(row) = builder.dispatch(Command::AddCondition(key)).await.unwrap() else {
            panic!("expected a new row");
        };

        let command = Command::SetPhaseConditionReference {
            block: key,
            row,
            target: Some(PhaseRef::EventStart),
        };
        assert_eq!(command.trigger(), Trigger::SetConditionReference);
        let CommandOutcome::Gate(gate) = builder.dispatch(command).await.unwrap() else {
            panic!("expected a gate");
        };
        assert!(gate.allows_condition(ConditionKind::DayOf));
        assert!(!gate.allows_operator(ConditionOperator::Is));
    }
}
