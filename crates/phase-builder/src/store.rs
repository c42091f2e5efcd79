//! In-memory entity store for one builder session.
//!
//! Phases and activities live in an arena keyed by a stable local
//! [`BlockId`]; list membership and on-screen order are kept as ordered key
//! vectors. Server ids are attributes of a block, never its key.

use std::collections::HashMap;
use std::fmt;

use campaign_core::{BuilderError, BuilderResult};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{BlockLifecycle, BlockState};
use crate::types::{
    ActivityCondition, ActivityFields, ActivityIdentity, PaletteItem, Phase, PhaseActivity,
    PhaseCondition, PhaseFields,
};

/// Local key of a phase or activity block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Local key of a condition row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Phase,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRow<C> {
    pub key: RowId,
    pub value: C,
}

#[derive(Debug, Clone)]
pub struct PhaseBlock {
    pub key: BlockId,
    pub id: Option<i64>,
    pub fields: PhaseFields,
    pub order: u32,
    pub conditions: Vec<ConditionRow<PhaseCondition>>,
    /// Activity keys in on-screen order.
    pub activities: Vec<BlockId>,
    pub lifecycle: BlockLifecycle,
    pub last_error: Option<String>,
}

impl PhaseBlock {
    pub fn state(&self) -> BlockState {
        self.lifecycle.state()
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ActivityBlock {
    pub key: BlockId,
    /// Owning phase block.
    pub phase: BlockId,
    pub id: Option<i64>,
    pub fields: ActivityFields,
    pub activity_type: String,
    pub activity_id: i64,
    pub order: u32,
    pub conditions: Vec<ConditionRow<ActivityCondition>>,
    pub lifecycle: BlockLifecycle,
    pub last_error: Option<String>,
}

impl ActivityBlock {
    pub fn state(&self) -> BlockState {
        self.lifecycle.state()
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(&self.activity_type, self.activity_id)
    }
}

#[derive(Debug, Default)]
pub struct BuilderStore {
    phases: HashMap<BlockId, PhaseBlock>,
    phase_order: Vec<BlockId>,
    activities: HashMap<BlockId, ActivityBlock>,
    next_block: u64,
    next_row: u64,
}

impl BuilderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.phases.clear();
        self.phase_order.clear();
        self.activities.clear();
    }

    fn next_block_id(&mut self) -> BlockId {
        self.next_block += 1;
        BlockId(self.next_block)
    }

    pub fn next_row_id(&mut self) -> RowId {
        self.next_row += 1;
        RowId(self.next_row)
    }

    // ─── Materialization ──────────────────────────────────────────────────

    /// Materializes a phase from server data (closed) at the end of the list,
    /// together with its activities.
    pub fn insert_loaded_phase(&mut self, phase: Phase) -> BlockId {
        let key = self.next_block_id();
        let conditions = phase
            .conditions
            .into_iter()
            .map(|value| ConditionRow {
                key: self.next_row_id(),
                value,
            })
            .collect();
        self.phases.insert(
            key,
            PhaseBlock {
                key,
                id: phase.id,
                fields: phase.fields,
                order: phase.order,
                conditions,
                activities: Vec::new(),
                lifecycle: BlockLifecycle::loaded(),
                last_error: None,
            },
        );
        self.phase_order.push(key);

        let mut activities = phase.activities;
        activities.sort_by_key(|a| a.order);
        for activity in activities {
            let index = self.activity_count(key);
            self.insert_loaded_activity(key, index, activity);
        }
        key
    }

    fn insert_loaded_activity(&mut self, phase: BlockId, index: usize, activity: PhaseActivity) -> BlockId {
        let key = self.next_block_id();
        let conditions = activity
            .conditions
            .into_iter()
            .map(|value| ConditionRow {
                key: self.next_row_id(),
                value,
            })
            .collect();
        self.activities.insert(
            key,
            ActivityBlock {
                key,
                phase,
                id: activity.id,
                fields: activity.fields,
                activity_type: activity.activity_type,
                activity_id: activity.activity_id,
                order: activity.order,
                conditions,
                lifecycle: BlockLifecycle::loaded(),
                last_error: None,
            },
        );
        if let Some(parent) = self.phases.get_mut(&phase) {
            parent.activities.insert(index, key);
        }
        key
    }

    /// Appends a fresh, unsaved phase carrying a placeholder `order`.
    pub fn insert_new_phase(&mut self, placeholder_order: u32) -> BlockId {
        let key = self.next_block_id();
        self.phases.insert(
            key,
            PhaseBlock {
                key,
                id: None,
                fields: PhaseFields::default(),
                order: placeholder_order,
                conditions: Vec::new(),
                activities: Vec::new(),
                lifecycle: BlockLifecycle::unsaved(),
                last_error: None,
            },
        );
        self.phase_order.push(key);
        key
    }

    /// Inserts a fresh, unsaved activity seeded from a palette item at
    /// `index` of the phase's list (clamped to the end).
    pub fn insert_new_activity(&mut self, phase: BlockId, index: usize, item: &PaletteItem) -> BuilderResult<BlockId> {
        if !self.phases.contains_key(&phase) {
            return Err(BuilderError::UnknownBlock(phase.0));
        }
        let key = self.next_block_id();
        self.activities.insert(
            key,
            ActivityBlock {
                key,
                phase,
                id: None,
                fields: ActivityFields {
                    display_name: item.display_name.clone(),
                    ..ActivityFields::default()
                },
                activity_type: item.activity_type.clone(),
                activity_id: item.activity_id,
                order: 1,
                conditions: Vec::new(),
                lifecycle: BlockLifecycle::unsaved(),
                last_error: None,
            },
        );
        let parent = self.phase_mut(phase)?;
        let index = index.min(parent.activities.len());
        parent.activities.insert(index, key);
        Ok(key)
    }

    // ─── Lookup ───────────────────────────────────────────────────────────

    pub fn kind(&self, key: BlockId) -> Option<BlockKind> {
        if self.phases.contains_key(&key) {
            Some(BlockKind::Phase)
        } else if self.activities.contains_key(&key) {
            Some(BlockKind::Activity)
        } else {
            None
        }
    }

    pub fn phase(&self, key: BlockId) -> BuilderResult<&PhaseBlock> {
        self.phases.get(&key).ok_or(BuilderError::UnknownBlock(key.0))
    }

    pub fn phase_mut(&mut self, key: BlockId) -> BuilderResult<&mut PhaseBlock> {
        self.phases.get_mut(&key).ok_or(BuilderError::UnknownBlock(key.0))
    }

    pub fn activity(&self, key: BlockId) -> BuilderResult<&ActivityBlock> {
        self.activities.get(&key).ok_or(BuilderError::UnknownBlock(key.0))
    }

    pub fn activity_mut(&mut self, key: BlockId) -> BuilderResult<&mut ActivityBlock> {
        self.activities
            .get_mut(&key)
            .ok_or(BuilderError::UnknownBlock(key.0))
    }

    /// Phase keys in on-screen order.
    pub fn phase_keys(&self) -> &[BlockId] {
        &self.phase_order
    }

    pub fn phases(&self) -> impl Iterator<Item = &PhaseBlock> {
        self.phase_order.iter().filter_map(move |k| self.phases.get(k))
    }

    /// Activity keys of one phase in on-screen order.
    pub fn activity_keys(&self, phase: BlockId) -> BuilderResult<&[BlockId]> {
        Ok(&self.phase(phase)?.activities)
    }

    pub fn activities_of(&self, phase: BlockId) -> impl Iterator<Item = &ActivityBlock> {
        self.phases
            .get(&phase)
            .into_iter()
            .flat_map(|p| p.activities.iter())
            .filter_map(move |k| self.activities.get(k))
    }

    pub fn activity_count(&self, phase: BlockId) -> usize {
        self.phases.get(&phase).map(|p| p.activities.len()).unwrap_or(0)
    }

    pub fn phase_len(&self) -> usize {
        self.phase_order.len()
    }

    pub fn phase_position(&self, key: BlockId) -> Option<usize> {
        self.phase_order.iter().position(|k| *k == key)
    }

    pub fn activity_position(&self, key: BlockId) -> Option<usize> {
        let activity = self.activities.get(&key)?;
        self.phases
            .get(&activity.phase)?
            .activities
            .iter()
            .position(|k| *k == key)
    }

    pub fn find_phase_by_id(&self, id: i64) -> Option<BlockId> {
        self.phases().find(|p| p.id == Some(id)).map(|p| p.key)
    }

    pub fn find_activity_by_id(&self, phase: BlockId, id: i64) -> Option<BlockId> {
        self.activities_of(phase)
            .find(|a| a.id == Some(id))
            .map(|a| a.key)
    }

    /// First activity in `phase` (other than `except`) with the given identity.
    pub fn find_duplicate(
        &self,
        phase: BlockId,
        identity: &ActivityIdentity,
        except: Option<BlockId>,
    ) -> Option<BlockId> {
        self.activities_of(phase)
            .filter(|a| Some(a.key) != except)
            .find(|a| a.activity_type == identity.activity_type && a.activity_id == identity.activity_id)
            .map(|a| a.key)
    }

    // ─── Structure ────────────────────────────────────────────────────────

    /// Moves a phase to `to_index` (clamped) in the phase list.
    pub fn move_phase(&mut self, key: BlockId, to_index: usize) -> BuilderResult<()> {
        let from = self
            .phase_position(key)
            .ok_or(BuilderError::UnknownBlock(key.0))?;
        let moving = self.phase_order.remove(from);
        let to = to_index.min(self.phase_order.len());
        self.phase_order.insert(to, moving);
        Ok(())
    }

    /// Moves an activity into `target` at `to_index` (clamped). The target
    /// may be the activity's own phase.
    pub fn move_activity(&mut self, key: BlockId, target: BlockId, to_index: usize) -> BuilderResult<()> {
        let source = self.activity(key)?.phase;
        self.phase(target)?;
        self.phase_mut(source)?.activities.retain(|k| *k != key);
        let list = &mut self.phase_mut(target)?.activities;
        let to = to_index.min(list.len());
        list.insert(to, key);
        self.activity_mut(key)?.phase = target;
        Ok(())
    }

    /// Detaches a phase and all of its activities. Returns the removed block
    /// and its position so a failed operation can put it back.
    pub fn remove_phase(&mut self, key: BlockId) -> BuilderResult<(usize, PhaseBlock, Vec<ActivityBlock>)> {
        let position = self
            .phase_position(key)
            .ok_or(BuilderError::UnknownBlock(key.0))?;
        self.phase_order.remove(position);
        let block = self
            .phases
            .remove(&key)
            .ok_or(BuilderError::UnknownBlock(key.0))?;
        let activities = block
            .activities
            .iter()
            .filter_map(|k| self.activities.remove(k))
            .collect();
        Ok((position, block, activities))
    }

    pub fn remove_activity(&mut self, key: BlockId) -> BuilderResult<(usize, ActivityBlock)> {
        let position = self
            .activity_position(key)
            .ok_or(BuilderError::UnknownBlock(key.0))?;
        let block = self
            .activities
            .remove(&key)
            .ok_or(BuilderError::UnknownBlock(key.0))?;
        if let Some(parent) = self.phases.get_mut(&block.phase) {
            parent.activities.remove(position);
        }
        Ok((position, block))
    }

    /// Writes `order = index + 1` onto every phase. Returns the keys of
    /// saved phases whose stored order changed.
    pub fn assign_phase_orders(&mut self) -> Vec<BlockId> {
        let mut changed = Vec::new();
        for (index, key) in self.phase_order.iter().enumerate() {
            if let Some(block) = self.phases.get_mut(key) {
                let order = index as u32 + 1;
                if block.order != order && block.id.is_some() {
                    changed.push(*key);
                }
                block.order = order;
            }
        }
        changed
    }

    /// Writes `order = index + 1` onto every activity of one phase. Returns
    /// the keys of saved activities whose stored order changed.
    pub fn assign_activity_orders(&mut self, phase: BlockId) -> BuilderResult<Vec<BlockId>> {
        let keys = self.phase(phase)?.activities.clone();
        let mut changed = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let block = self.activity_mut(*key)?;
            let order = index as u32 + 1;
            if block.order != order && block.id.is_some() {
                changed.push(*key);
            }
            block.order = order;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(id: i64, name: &str, order: u32) -> Phase {
        Phase {
            id: Some(id),
            fields: PhaseFields {
                name: name.into(),
                ..PhaseFields::default()
            },
            order,
            ..Phase::default()
        }
    }

    #[test]
    fn test_loaded_phase_keeps_activity_order() {
        let mut store = BuilderStore::new();
        let mut phase = loaded(10, "Kickoff", 1);
        phase.activities = vec![
            PhaseActivity {
                id: Some(2),
                activity_type: "survey".into(),
                activity_id: 4,
                order: 2,
                ..PhaseActivity::default()
            },
            PhaseActivity {
                id: Some(1),
                activity_type: "module".into(),
                activity_id: 1,
                order: 1,
                ..PhaseActivity::default()
            },
        ];
        let key = store.insert_loaded_phase(phase);

        let ids: Vec<_> = store.activities_of(key).map(|a| a.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
        assert_eq!(store.phase(key).unwrap().state(), BlockState::SavedClosed);
        assert_eq!(store.find_phase_by_id(10), Some(key));
    }

    #[test]
    fn test_move_phase_and_assign_orders() {
        let mut store = BuilderStore::new();
        let a = store.insert_loaded_phase(loaded(1, "A", 1));
        let b = store.insert_loaded_phase(loaded(2, "B", 2));
        let c = store.insert_loaded_phase(loaded(3, "C", 3));

        store.move_phase(c, 0).unwrap();
        assert_eq!(store.phase_keys(), &[c, a, b]);

        let changed = store.assign_phase_orders();
        assert_eq!(changed.len(), 3);
        assert_eq!(store.phase(c).unwrap().order, 1);
        assert_eq!(store.phase(b).unwrap().order, 3);

        store.move_phase(a, 99).unwrap();
        assert_eq!(store.phase_keys(), &[c, b, a]);
    }

    #[test]
    fn test_duplicate_lookup_ignores_moving_block() {
        let mut store = BuilderStore::new();
        let phase = store.insert_loaded_phase(loaded(1, "A", 1));
        let item = PaletteItem::new("module", 1, "Intro");
        let first = store.insert_new_activity(phase, 0, &item).unwrap();

        assert_eq!(store.find_duplicate(phase, &item.identity(), None), Some(first));
        assert_eq!(store.find_duplicate(phase, &item.identity(), Some(first)), None);
        assert_eq!(
            store.find_duplicate(phase, &ActivityIdentity::new("module", 2), None),
            None
        );
    }

    #[test]
    fn test_remove_phase_drops_its_activities() {
        let mut store = BuilderStore::new();
        let phase = store.insert_loaded_phase(loaded(1, "A", 1));
        let activity = store
            .insert_new_activity(phase, 0, &PaletteItem::new("module", 1, "Intro"))
            .unwrap();

        let (position, block, activities) = store.remove_phase(phase).unwrap();
        assert_eq!(position, 0);
        assert_eq!(block.key, phase);
        assert_eq!(activities.len(), 1);
        assert!(store.activity(activity).is_err());
        assert_eq!(store.phase_len(), 0);
    }

    #[test]
    fn test_move_activity_between_phases() {
        let mut store = BuilderStore::new();
        let a = store.insert_loaded_phase(loaded(1, "A", 1));
        let b = store.insert_loaded_phase(loaded(2, "B", 2));
        let moving = store
            .insert_new_activity(a, 0, &PaletteItem::new("module", 1, "Intro"))
            .unwrap();

        store.move_activity(moving, b, 0).unwrap();
        assert_eq!(store.activity_count(a), 0);
        assert_eq!(store.activity_keys(b).unwrap(), &[moving]);
        assert_eq!(store.activity(moving).unwrap().phase, b);
    }
}
