//! Condition editor: add/remove lifecycle of condition rows and the
//! sentinel-aware gating of predicate and operator options.

use campaign_core::event_bus::BuilderEventType;
use campaign_core::{BuilderError, BuilderResult};
use tracing::{info, warn};

use crate::builder::PhaseBuilder;
use crate::store::{BlockId, BlockKind, ConditionRow, RowId};
use crate::types::{ActivityCondition, ConditionKind, ConditionOperator, PhaseCondition, PhaseRef};

/// Which predicate and operator options a condition row offers, each with
/// whether it is currently enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGate {
    pub conditions: Vec<(ConditionKind, bool)>,
    pub operators: Vec<(ConditionOperator, bool)>,
}

impl ConditionGate {
    pub fn allows_condition(&self, kind: ConditionKind) -> bool {
        self.conditions.iter().any(|(k, enabled)| *k == kind && *enabled)
    }

    pub fn allows_operator(&self, operator: ConditionOperator) -> bool {
        self.operators.iter().any(|(o, enabled)| *o == operator && *enabled)
    }

    pub fn enabled_conditions(&self) -> Vec<ConditionKind> {
        self.conditions.iter().filter(|(_, e)| *e).map(|(k, _)| *k).collect()
    }

    pub fn enabled_operators(&self) -> Vec<ConditionOperator> {
        self.operators.iter().filter(|(_, e)| *e).map(|(o, _)| *o).collect()
    }
}

/// Options for a phase condition. The temporal subset is enabled exactly
/// when the target is EVENT START or EVENT END; otherwise (a phase, or no
/// target yet) the status subset is.
pub fn phase_condition_gate(target: Option<PhaseRef>) -> ConditionGate {
    let temporal = target.map_or(false, PhaseRef::is_sentinel);
    ConditionGate {
        conditions: ConditionKind::PHASE_STATUS
            .iter()
            .map(|k| (*k, !temporal))
            .chain(ConditionKind::TEMPORAL.iter().map(|k| (*k, temporal)))
            .collect(),
        operators: ConditionOperator::STATUS
            .iter()
            .map(|o| (*o, !temporal))
            .chain(ConditionOperator::TEMPORAL.iter().map(|o| (*o, temporal)))
            .collect(),
    }
}

/// Options for an activity condition: status predicates (including
/// `unlocked`) with `is` / `is not`.
pub fn activity_condition_gate() -> ConditionGate {
    ConditionGate {
        conditions: ConditionKind::ACTIVITY_STATUS.iter().map(|k| (*k, true)).collect(),
        operators: ConditionOperator::STATUS.iter().map(|o| (*o, true)).collect(),
    }
}

fn unknown_row(block: BlockId, row: RowId) -> BuilderError {
    BuilderError::UnknownRow {
        block: block.0,
        row: row.0,
    }
}

fn phase_row(rows: &mut [ConditionRow<PhaseCondition>], block: BlockId, row: RowId) -> BuilderResult<&mut PhaseCondition> {
    rows.iter_mut()
        .find(|r| r.key == row)
        .map(|r| &mut r.value)
        .ok_or_else(|| unknown_row(block, row))
}

fn activity_row(
    rows: &mut [ConditionRow<ActivityCondition>],
    block: BlockId,
    row: RowId,
) -> BuilderResult<&mut ActivityCondition> {
    rows.iter_mut()
        .find(|r| r.key == row)
        .map(|r| &mut r.value)
        .ok_or_else(|| unknown_row(block, row))
}

impl PhaseBuilder {
    /// Appends an empty condition row; the block's logic panel shows from
    /// now on.
    pub fn add_condition(&mut self, key: BlockId) -> BuilderResult<RowId> {
        self.ensure_open(key)?;
        let row = self.store.next_row_id();
        match self.kind_of(key)? {
            BlockKind::Phase => self.store.phase_mut(key)?.conditions.push(ConditionRow {
                key: row,
                value: PhaseCondition::default(),
            }),
            BlockKind::Activity => self.store.activity_mut(key)?.conditions.push(ConditionRow {
                key: row,
                value: ActivityCondition::default(),
            }),
        }
        info!(block = %key, %row, "Added condition row");
        self.emit(BuilderEventType::ConditionAdded, key, None, Some(row.to_string()));
        Ok(row)
    }

    /// Drops a condition row. A row the server already knows is deleted
    /// there too; if that call fails the row is put back where it was.
    pub async fn remove_condition(&mut self, key: BlockId, row: RowId) -> BuilderResult<()> {
        self.ensure_open(key)?;
        match self.kind_of(key)? {
            BlockKind::Phase => {
                let block = self.store.phase_mut(key)?;
                let position = block
                    .conditions
                    .iter()
                    .position(|r| r.key == row)
                    .ok_or_else(|| unknown_row(key, row))?;
                let removed = block.conditions.remove(position);
                let phase_id = block.id;
                if let (Some(condition_id), Some(phase_id)) = (removed.value.id, phase_id) {
                    if let Err(e) = self.client.delete_phase_condition(phase_id, condition_id).await {
                        warn!(block = %key, condition_id, error = %e, "Condition delete failed");
                        let block = self.store.phase_mut(key)?;
                        block.conditions.insert(position.min(block.conditions.len()), removed);
                        block.last_error = Some(e.user_message());
                        return Err(e);
                    }
                }
            }
            BlockKind::Activity => {
                let block = self.store.activity_mut(key)?;
                let position = block
                    .conditions
                    .iter()
                    .position(|r| r.key == row)
                    .ok_or_else(|| unknown_row(key, row))?;
                let removed = block.conditions.remove(position);
                let (activity_id, parent) = (block.id, block.phase);
                let phase_id = self.store.phase(parent)?.id;
                if let (Some(condition_id), Some(activity_id), Some(phase_id)) =
                    (removed.value.id, activity_id, phase_id)
                {
                    if let Err(e) = self
                        .client
                        .delete_activity_condition(phase_id, activity_id, condition_id)
                        .await
                    {
                        warn!(block = %key, condition_id, error = %e, "Condition delete failed");
                        let block = self.store.activity_mut(key)?;
                        block.conditions.insert(position.min(block.conditions.len()), removed);
                        block.last_error = Some(e.user_message());
                        return Err(e);
                    }
                }
            }
        }
        info!(block = %key, %row, "Removed condition row");
        self.emit(BuilderEventType::ConditionRemoved, key, None, Some(row.to_string()));
        Ok(())
    }

    /// Selects the target of a phase condition and re-gates its options.
    /// A predicate or operator that falls outside the newly enabled subset
    /// is cleared.
    pub fn set_phase_condition_target(
        &mut self,
        key: BlockId,
        row: RowId,
        target: Option<PhaseRef>,
    ) -> BuilderResult<ConditionGate> {
        self.ensure_open(key)?;
        let block = self.store.phase_mut(key)?;
        let condition = phase_row(&mut block.conditions, key, row)?;
        condition.conditional_phase_id = target;
        let gate = phase_condition_gate(target);
        if condition.condition.map_or(false, |c| !gate.allows_condition(c)) {
            condition.condition = None;
        }
        if condition.operator.map_or(false, |o| !gate.allows_operator(o)) {
            condition.operator = None;
        }
        Ok(gate)
    }

    /// Selects the activity an activity condition refers to.
    pub fn set_activity_condition_target(
        &mut self,
        key: BlockId,
        row: RowId,
        target: Option<i64>,
    ) -> BuilderResult<ConditionGate> {
        self.ensure_open(key)?;
        let block = self.store.activity_mut(key)?;
        let condition = activity_row(&mut block.conditions, key, row)?;
        condition.conditional_phase_activity_id = target;
        let gate = activity_condition_gate();
        if condition.condition.map_or(false, |c| !gate.allows_condition(c)) {
            condition.condition = None;
        }
        if condition.operator.map_or(false, |o| !gate.allows_operator(o)) {
            condition.operator = None;
        }
        Ok(gate)
    }

    /// Sets the predicate of a row. Consistency with the target is the
    /// backend's call; only the offered options are gated.
    pub fn set_condition_predicate(
        &mut self,
        key: BlockId,
        row: RowId,
        predicate: Option<ConditionKind>,
    ) -> BuilderResult<()> {
        self.ensure_open(key)?;
        match self.kind_of(key)? {
            BlockKind::Phase => {
                let block = self.store.phase_mut(key)?;
                phase_row(&mut block.conditions, key, row)?.condition = predicate;
            }
            BlockKind::Activity => {
                let block = self.store.activity_mut(key)?;
                activity_row(&mut block.conditions, key, row)?.condition = predicate;
            }
        }
        Ok(())
    }

    pub fn set_condition_operator(
        &mut self,
        key: BlockId,
        row: RowId,
        operator: Option<ConditionOperator>,
    ) -> BuilderResult<()> {
        self.ensure_open(key)?;
        match self.kind_of(key)? {
            BlockKind::Phase => {
                let block = self.store.phase_mut(key)?;
                phase_row(&mut block.conditions, key, row)?.operator = operator;
            }
            BlockKind::Activity => {
                let block = self.store.activity_mut(key)?;
                activity_row(&mut block.conditions, key, row)?.operator = operator;
            }
        }
        Ok(())
    }
}
