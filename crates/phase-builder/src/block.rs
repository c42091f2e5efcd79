//! Block controller: open/close/cancel/save/delete for phase and activity
//! blocks, and field-to-payload extraction.

use std::collections::HashSet;

use campaign_core::event_bus::BuilderEventType;
use campaign_core::{BuilderError, BuilderResult};
use tracing::{info, warn};

use crate::builder::PhaseBuilder;
use crate::lifecycle::{BlockState, BlockTrigger};
use crate::persistence::{
    ActivityAttributes, ActivityPayload, PersistenceClient, PhaseAttributes, PhasePayload,
    SavedRecord,
};
use crate::prompt::{CONFIRM_DELETE_ACTIVITY, CONFIRM_DELETE_PHASE};
use crate::renumber::RenumberReport;
use crate::store::{BlockId, BlockKind, ConditionRow, RowId};
use crate::types::{ActivityCondition, ActivityFields, PhaseCondition, PhaseFields, UNTITLED};

/// Shown on a block whose condition rows are saved but still lack ids.
pub const UNCONFIRMED_CONDITIONS: &str =
    "Saved, but the server did not confirm every condition. Reload before removing conditions.";

/// A serialized save, ready to send. Carries the row keys in payload order
/// so returned condition ids land on the rows that produced them.
#[derive(Debug, Clone)]
pub(crate) enum SaveRequest {
    Phase {
        key: BlockId,
        id: Option<i64>,
        payload: PhasePayload,
        rows: Vec<RowId>,
    },
    Activity {
        key: BlockId,
        phase_id: i64,
        id: Option<i64>,
        payload: ActivityPayload,
        rows: Vec<RowId>,
    },
}

impl SaveRequest {
    pub(crate) fn key(&self) -> BlockId {
        match self {
            SaveRequest::Phase { key, .. } | SaveRequest::Activity { key, .. } => *key,
        }
    }

    /// `create` while the block has no id, `update` afterwards.
    pub(crate) async fn send(&self, client: &dyn PersistenceClient) -> BuilderResult<SavedRecord> {
        match self {
            SaveRequest::Phase {
                id: None, payload, ..
            } => client.create_phase(payload).await,
            SaveRequest::Phase {
                id: Some(id),
                payload,
                ..
            } => client.update_phase(*id, payload).await,
            SaveRequest::Activity {
                phase_id,
                id: None,
                payload,
                ..
            } => client.create_activity(*phase_id, payload).await,
            SaveRequest::Activity {
                phase_id,
                id: Some(id),
                payload,
                ..
            } => client.update_activity(*phase_id, *id, payload).await,
        }
    }
}

impl PhaseBuilder {
    pub(crate) fn kind_of(&self, key: BlockId) -> BuilderResult<BlockKind> {
        self.store.kind(key).ok_or(BuilderError::UnknownBlock(key.0))
    }

    pub fn state_of(&self, key: BlockId) -> BuilderResult<BlockState> {
        match self.kind_of(key)? {
            BlockKind::Phase => Ok(self.store.phase(key)?.state()),
            BlockKind::Activity => Ok(self.store.activity(key)?.state()),
        }
    }

    fn fire(&mut self, key: BlockId, trigger: BlockTrigger) -> BuilderResult<BlockState> {
        match self.kind_of(key)? {
            BlockKind::Phase => self.store.phase_mut(key)?.lifecycle.fire(trigger),
            BlockKind::Activity => self.store.activity_mut(key)?.lifecycle.fire(trigger),
        }
    }

    fn check(&self, key: BlockId, trigger: BlockTrigger) -> BuilderResult<BlockState> {
        match self.kind_of(key)? {
            BlockKind::Phase => self.store.phase(key)?.lifecycle.check(trigger),
            BlockKind::Activity => self.store.activity(key)?.lifecycle.check(trigger),
        }
    }

    pub(crate) fn ensure_open(&self, key: BlockId) -> BuilderResult<()> {
        let state = self.state_of(key)?;
        if state.is_open() {
            Ok(())
        } else {
            Err(BuilderError::InvalidTransition {
                from: state.to_string(),
                to: "edit".to_string(),
            })
        }
    }

    fn set_last_error(&mut self, key: BlockId, message: Option<String>) {
        match self.store.kind(key) {
            Some(BlockKind::Phase) => {
                if let Ok(block) = self.store.phase_mut(key) {
                    block.last_error = message;
                }
            }
            Some(BlockKind::Activity) => {
                if let Ok(block) = self.store.activity_mut(key) {
                    block.last_error = message;
                }
            }
            None => {}
        }
    }

    /// Shows the editing form. In-memory edits are kept.
    pub fn open(&mut self, key: BlockId) -> BuilderResult<BlockState> {
        self.fire(key, BlockTrigger::Open)
    }

    /// Hides the editing form without discarding in-memory edits.
    pub fn close(&mut self, key: BlockId) -> BuilderResult<BlockState> {
        self.fire(key, BlockTrigger::Close)
    }

    /// Unsaved blocks are dropped entirely; saved ones go back to the closed
    /// view with whatever was typed still in place.
    pub async fn cancel(&mut self, key: BlockId) -> BuilderResult<BlockState> {
        let next = self.check(key, BlockTrigger::Cancel)?;
        if next != BlockState::Removed {
            return self.fire(key, BlockTrigger::Cancel);
        }

        match self.kind_of(key)? {
            BlockKind::Phase => {
                self.store.remove_phase(key)?;
                let shifted = self.store.assign_phase_orders();
                if !shifted.is_empty() {
                    self.resave_shifted(shifted).await;
                }
            }
            BlockKind::Activity => {
                let phase = self.store.activity(key)?.phase;
                self.store.remove_activity(key)?;
                let shifted = self.store.assign_activity_orders(phase)?;
                if !shifted.is_empty() {
                    self.resave_shifted(shifted).await;
                }
            }
        }
        info!(block = %key, "Cancelled unsaved block");
        self.emit(BuilderEventType::BlockRemoved, key, None, Some("cancelled".into()));
        Ok(BlockState::Removed)
    }

    /// Replaces the editable attributes of a phase from its form.
    pub fn edit_phase(&mut self, key: BlockId, fields: PhaseFields) -> BuilderResult<()> {
        self.ensure_open(key)?;
        self.store.phase_mut(key)?.fields = fields;
        Ok(())
    }

    /// Replaces the editable attributes of an activity from its form.
    pub fn edit_activity(&mut self, key: BlockId, fields: ActivityFields) -> BuilderResult<()> {
        self.ensure_open(key)?;
        self.store.activity_mut(key)?.fields = fields;
        Ok(())
    }

    /// Serializes a block's current values. `order` is the block's position
    /// in its list, so an explicit save never persists a stale placeholder.
    pub(crate) fn prepare_save(&self, key: BlockId) -> BuilderResult<SaveRequest> {
        match self.kind_of(key)? {
            BlockKind::Phase => {
                let block = self.store.phase(key)?;
                let order = self
                    .store
                    .phase_position(key)
                    .map(|i| i as u32 + 1)
                    .unwrap_or(block.order);
                let name = if block.fields.name.trim().is_empty() {
                    UNTITLED.to_string()
                } else {
                    block.fields.name.clone()
                };
                Ok(SaveRequest::Phase {
                    key,
                    id: block.id,
                    payload: PhasePayload {
                        phase: PhaseAttributes {
                            name,
                            description: block.fields.description.clone(),
                            requires_approval: block.fields.requires_approval,
                            order,
                            conditional_action: block.fields.conditional_action,
                            conditional_status: block.fields.conditional_status,
                        },
                        phase_conditions: block.conditions.iter().map(|r| r.value.clone()).collect(),
                    },
                    rows: block.conditions.iter().map(|r| r.key).collect(),
                })
            }
            BlockKind::Activity => {
                let block = self.store.activity(key)?;
                let phase_id = self
                    .store
                    .phase(block.phase)?
                    .id
                    .ok_or(BuilderError::ParentUnsaved(block.phase.0))?;
                let order = self
                    .store
                    .activity_position(key)
                    .map(|i| i as u32 + 1)
                    .unwrap_or(block.order);
                Ok(SaveRequest::Activity {
                    key,
                    phase_id,
                    id: block.id,
                    payload: ActivityPayload {
                        phase_activity: ActivityAttributes {
                            display_name: block.fields.display_name.clone(),
                            due_date: block.fields.due_date,
                            required: block.fields.required,
                            activity_type: block.activity_type.clone(),
                            activity_id: block.activity_id,
                            order,
                            conditional_action: block.fields.conditional_action,
                            conditional_status: block.fields.conditional_status,
                        },
                        phase_activity_conditions: block
                            .conditions
                            .iter()
                            .map(|r| r.value.clone())
                            .collect(),
                    },
                    rows: block.conditions.iter().map(|r| r.key).collect(),
                })
            }
        }
    }

    /// Applies the answer to a save. On success the returned id (and nested
    /// condition ids) are stored and the block moves via `trigger`; on
    /// failure the block is left exactly as it was and carries the server
    /// message.
    pub(crate) fn apply_save(
        &mut self,
        request: &SaveRequest,
        result: BuilderResult<SavedRecord>,
        trigger: BlockTrigger,
    ) -> BuilderResult<i64> {
        let key = request.key();
        if self.store.kind(key).is_none() {
            // Deleted while the save was in flight.
            warn!(block = %key, "Save answered for a block that no longer exists");
            return Err(BuilderError::UnknownBlock(key.0));
        }

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(block = %key, error = %e, "Save failed");
                self.set_last_error(key, Some(e.user_message()));
                self.emit(BuilderEventType::BlockSaveFailed, key, None, Some(e.user_message()));
                return Err(e);
            }
        };

        let state = match request {
            SaveRequest::Phase { payload, rows, .. } => {
                let block = self.store.phase_mut(key)?;
                block.id = Some(record.id);
                block.order = payload.phase.order;
                if record.conditions.len() == rows.len() {
                    for (row, saved) in rows.iter().zip(&record.conditions) {
                        if let Some(r) = block.conditions.iter_mut().find(|r| r.key == *row) {
                            r.value.id = Some(saved.id);
                        }
                    }
                } else if !rows.is_empty() {
                    warn!(
                        block = %key,
                        sent = rows.len(),
                        returned = record.conditions.len(),
                        "Save answer did not list every condition"
                    );
                }
                block.last_error = None;
                block.lifecycle.fire(trigger)?
            }
            SaveRequest::Activity { payload, rows, .. } => {
                let block = self.store.activity_mut(key)?;
                block.id = Some(record.id);
                block.order = payload.phase_activity.order;
                if record.conditions.len() == rows.len() {
                    for (row, saved) in rows.iter().zip(&record.conditions) {
                        if let Some(r) = block.conditions.iter_mut().find(|r| r.key == *row) {
                            r.value.id = Some(saved.id);
                        }
                    }
                } else if !rows.is_empty() {
                    warn!(
                        block = %key,
                        sent = rows.len(),
                        returned = record.conditions.len(),
                        "Save answer did not list every condition"
                    );
                }
                block.last_error = None;
                block.lifecycle.fire(trigger)?
            }
        };

        info!(block = %key, id = record.id, %state, "Saved block");
        self.emit(BuilderEventType::BlockSaved, key, Some(record.id), Some(state.to_string()));
        Ok(record.id)
    }

    /// Persists a block: `create` while it has no id, `update` afterwards.
    /// Success stores the id and closes the form. Saving a phase for the
    /// first time makes its activity list a drop target.
    pub async fn save(&mut self, key: BlockId) -> BuilderResult<i64> {
        self.check(key, BlockTrigger::Save)?;
        let request = match self.prepare_save(key) {
            Ok(request) => request,
            Err(e) => {
                self.set_last_error(key, Some(e.user_message()));
                return Err(e);
            }
        };
        let result = request.send(self.client.as_ref()).await;
        let id = self.apply_save(&request, result, BlockTrigger::Save)?;
        self.confirm_condition_ids(&[key]).await;
        Ok(id)
    }

    fn has_unconfirmed_rows(&self, key: BlockId) -> bool {
        match self.store.kind(key) {
            Some(BlockKind::Phase) => self
                .store
                .phase(key)
                .map_or(false, |b| b.conditions.iter().any(|r| r.value.id.is_none())),
            Some(BlockKind::Activity) => self
                .store
                .activity(key)
                .map_or(false, |b| b.conditions.iter().any(|r| r.value.id.is_none())),
            None => false,
        }
    }

    /// Fills in condition ids a save answer left out. The campaign is read
    /// back once and each id-less row takes the id of an unclaimed stored
    /// condition with the same reference, predicate and operator. Blocks
    /// that still have id-less rows afterwards carry
    /// [`UNCONFIRMED_CONDITIONS`].
    pub(crate) async fn confirm_condition_ids(&mut self, keys: &[BlockId]) {
        let pending: Vec<BlockId> = keys
            .iter()
            .copied()
            .filter(|key| self.has_unconfirmed_rows(*key))
            .collect();
        if pending.is_empty() {
            return;
        }

        let listing = match self.client.list_phases().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, blocks = pending.len(), "Could not read back saved conditions");
                for key in pending {
                    self.set_last_error(key, Some(UNCONFIRMED_CONDITIONS.to_string()));
                }
                return;
            }
        };

        for key in pending {
            let confirmed = match self.store.kind(key) {
                Some(BlockKind::Phase) => match self.store.phase_mut(key) {
                    Ok(block) => {
                        let stored = listing.iter().find(|p| p.id.is_some() && p.id == block.id);
                        stored.map_or(false, |p| claim_condition_ids(&mut block.conditions, &p.conditions))
                    }
                    Err(_) => continue,
                },
                Some(BlockKind::Activity) => {
                    let Ok(parent) = self.store.activity(key).map(|b| b.phase) else {
                        continue;
                    };
                    let phase_id = self.store.phase(parent).ok().and_then(|p| p.id);
                    match self.store.activity_mut(key) {
                        Ok(block) => {
                            let stored = listing
                                .iter()
                                .filter(|p| p.id.is_some() && p.id == phase_id)
                                .flat_map(|p| &p.activities)
                                .find(|a| a.id.is_some() && a.id == block.id);
                            stored.map_or(false, |a| claim_condition_ids(&mut block.conditions, &a.conditions))
                        }
                        Err(_) => continue,
                    }
                }
                None => continue,
            };
            if confirmed {
                info!(block = %key, "Confirmed condition ids from the server");
            } else {
                warn!(block = %key, "Condition ids could not be matched after save");
                self.set_last_error(key, Some(UNCONFIRMED_CONDITIONS.to_string()));
            }
        }
    }

    /// Deletes a saved block after the operator confirms, then renumbers its
    /// siblings. `Ok(None)` means the operator declined and nothing happened.
    pub async fn delete(&mut self, key: BlockId) -> BuilderResult<Option<RenumberReport>> {
        self.check(key, BlockTrigger::Delete)?;
        let kind = self.kind_of(key)?;
        let message = match kind {
            BlockKind::Phase => CONFIRM_DELETE_PHASE,
            BlockKind::Activity => CONFIRM_DELETE_ACTIVITY,
        };
        if !self.prompt.confirm(message) {
            info!(block = %key, "Delete declined");
            return Ok(None);
        }

        match kind {
            BlockKind::Phase => {
                let id = self
                    .store
                    .phase(key)?
                    .id
                    .ok_or(BuilderError::ParentUnsaved(key.0))?;
                if let Err(e) = self.client.delete_phase(id).await {
                    warn!(block = %key, phase_id = id, error = %e, "Delete failed");
                    self.set_last_error(key, Some(e.user_message()));
                    return Err(e);
                }
                self.fire(key, BlockTrigger::Delete)?;
                self.store.remove_phase(key)?;
                info!(block = %key, phase_id = id, "Deleted phase");
                self.emit(BuilderEventType::BlockRemoved, key, Some(id), None);
                Ok(Some(self.renumber_phases().await))
            }
            BlockKind::Activity => {
                let block = self.store.activity(key)?;
                let phase = block.phase;
                let id = block.id.ok_or(BuilderError::ParentUnsaved(key.0))?;
                let phase_id = self
                    .store
                    .phase(phase)?
                    .id
                    .ok_or(BuilderError::ParentUnsaved(phase.0))?;
                if let Err(e) = self.client.delete_activity(phase_id, id).await {
                    warn!(block = %key, activity_id = id, error = %e, "Delete failed");
                    self.set_last_error(key, Some(e.user_message()));
                    return Err(e);
                }
                self.fire(key, BlockTrigger::Delete)?;
                self.store.remove_activity(key)?;
                info!(block = %key, phase_id, activity_id = id, "Deleted activity");
                self.emit(BuilderEventType::BlockRemoved, key, Some(id), None);
                Ok(Some(self.renumber_activities(phase).await?))
            }
        }
    }
}

/// A stored condition row that can be matched back to its server record.
trait StoredCondition: PartialEq {
    fn stored_id(&self) -> Option<i64>;
    fn set_stored_id(&mut self, id: Option<i64>);
}

impl StoredCondition for PhaseCondition {
    fn stored_id(&self) -> Option<i64> {
        self.id
    }

    fn set_stored_id(&mut self, id: Option<i64>) {
        self.id = id;
    }
}

impl StoredCondition for ActivityCondition {
    fn stored_id(&self) -> Option<i64> {
        self.id
    }

    fn set_stored_id(&mut self, id: Option<i64>) {
        self.id = id;
    }
}

/// Gives each id-less row the id of the first stored condition with equal
/// values that no other row holds. Returns whether every row has an id.
fn claim_condition_ids<C: StoredCondition + Clone>(rows: &mut [ConditionRow<C>], stored: &[C]) -> bool {
    let mut claimed: HashSet<i64> = rows.iter().filter_map(|r| r.value.stored_id()).collect();
    let mut confirmed = true;
    for row in rows.iter_mut().filter(|r| r.value.stored_id().is_none()) {
        let found = stored.iter().find_map(|candidate| {
            let id = candidate.stored_id()?;
            let mut bare = candidate.clone();
            bare.set_stored_id(None);
            (!claimed.contains(&id) && bare == row.value).then_some(id)
        });
        match found {
            Some(id) => {
                claimed.insert(id);
                row.value.set_stored_id(Some(id));
            }
            None => confirmed = false,
        }
    }
    confirmed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{MemoryBackend, Method};
    use crate::prompt::AutoConfirm;
    use crate::types::{ConditionKind, ConditionOperator, ConditionalAction, PaletteItem, Phase, PhaseRef};

    /// Answers every save with the record id alone.
    struct IdOnlyBackend(Arc<MemoryBackend>);

    fn id_only(record: SavedRecord) -> SavedRecord {
        SavedRecord {
            id: record.id,
            conditions: Vec::new(),
        }
    }

    #[async_trait::async_trait]
    impl PersistenceClient for IdOnlyBackend {
        async fn list_phases(&self) -> BuilderResult<Vec<Phase>> {
            self.0.list_phases().await
        }

        async fn create_phase(&self, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
            self.0.create_phase(payload).await.map(id_only)
        }

        async fn update_phase(&self, phase_id: i64, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
            self.0.update_phase(phase_id, payload).await.map(id_only)
        }

        async fn delete_phase(&self, phase_id: i64) -> BuilderResult<()> {
            self.0.delete_phase(phase_id).await
        }

        async fn delete_phase_condition(&self, phase_id: i64, condition_id: i64) -> BuilderResult<()> {
            self.0.delete_phase_condition(phase_id, condition_id).await
        }

        async fn create_activity(&self, phase_id: i64, payload: &ActivityPayload) -> BuilderResult<SavedRecord> {
            self.0.create_activity(phase_id, payload).await.map(id_only)
        }

        async fn update_activity(
            &self,
            phase_id: i64,
            activity_id: i64,
            payload: &ActivityPayload,
        ) -> BuilderResult<SavedRecord> {
            self.0.update_activity(phase_id, activity_id, payload).await.map(id_only)
        }

        async fn delete_activity(&self, phase_id: i64, activity_id: i64) -> BuilderResult<()> {
            self.0.delete_activity(phase_id, activity_id).await
        }

        async fn delete_activity_condition(
            &self,
            phase_id: i64,
            activity_id: i64,
            condition_id: i64,
        ) -> BuilderResult<()> {
            self.0.delete_activity_condition(phase_id, activity_id, condition_id).await
        }
    }

    /// Opens the first demo phase and adds a complete EVENT END row to it.
    async fn builder_with_new_row(memory: Arc<MemoryBackend>) -> (PhaseBuilder, BlockId, RowId) {
        let mut builder = PhaseBuilder::new(
            Arc::new(IdOnlyBackend(memory.clone())),
            Arc::new(AutoConfirm::yes()),
        );
        builder.load().await.unwrap();
        let key = builder.store().phase_keys()[0];
        builder.open(key).unwrap();
        let row = builder.add_condition(key).unwrap();
        builder
            .set_phase_condition_target(key, row, Some(PhaseRef::EventEnd))
            .unwrap();
        builder
            .set_condition_predicate(key, row, Some(ConditionKind::ThreeBefore))
            .unwrap();
        builder
            .set_condition_operator(key, row, Some(ConditionOperator::Equals))
            .unwrap();
        memory.clear_calls();
        (builder, key, row)
    }

    async fn loaded_builder(prompt: Arc<AutoConfirm>) -> (PhaseBuilder, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::with_demo_data());
        let mut builder = PhaseBuilder::new(backend.clone(), prompt);
        builder.load().await.unwrap();
        backend.clear_calls();
        (builder, backend)
    }

    #[tokio::test]
    async fn test_first_save_creates_then_updates() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.add_phase();
        builder
            .edit_phase(
                key,
                PhaseFields {
                    name: "Follow-up".into(),
                    conditional_action: ConditionalAction::Unlock,
                    ..PhaseFields::default()
                },
            )
            .unwrap();

        let id = builder.save(key).await.unwrap();
        assert_eq!(builder.state_of(key).unwrap(), BlockState::SavedClosed);
        assert_eq!(builder.store().phase(key).unwrap().id, Some(id));

        builder.open(key).unwrap();
        assert_eq!(builder.save(key).await.unwrap(), id);

        let calls = backend.calls();
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].body.as_ref().unwrap()["phase"]["order"], 3);
        assert_eq!(calls[1].method, Method::Put);
        assert_eq!(calls[1].path, format!("/phases/{}.json", id));
    }

    #[tokio::test]
    async fn test_blank_name_saved_as_untitled() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.add_phase();
        builder
            .edit_phase(
                key,
                PhaseFields {
                    name: "  ".into(),
                    ..PhaseFields::default()
                },
            )
            .unwrap();
        builder.save(key).await.unwrap();
        assert_eq!(backend.calls()[0].body.as_ref().unwrap()["phase"]["name"], UNTITLED);
    }

    #[tokio::test]
    async fn test_failed_save_reverts_and_surfaces_message() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.add_phase();
        backend.fail_next(Method::Post, 422, "name has already been taken");

        let err = builder.save(key).await.unwrap_err();
        assert!(matches!(err, BuilderError::Rejected { status: 422, .. }));

        let block = builder.store().phase(key).unwrap();
        assert_eq!(block.id, None);
        assert_eq!(block.state(), BlockState::UnsavedOpen);
        assert_eq!(block.last_error.as_deref(), Some("name has already been taken"));

        builder.save(key).await.unwrap();
        assert!(builder.store().phase(key).unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_unsaved_removes_block() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.add_phase();
        assert_eq!(builder.cancel(key).await.unwrap(), BlockState::Removed);
        assert!(builder.store().phase(key).is_err());
        assert_eq!(builder.store().phase_len(), 2);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_saved_keeps_edits() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.store().phase_keys()[0];
        builder.open(key).unwrap();
        let mut fields = builder.store().phase(key).unwrap().fields.clone();
        fields.name = "Renamed".into();
        builder.edit_phase(key, fields).unwrap();

        assert_eq!(builder.cancel(key).await.unwrap(), BlockState::SavedClosed);
        assert_eq!(builder.store().phase(key).unwrap().fields.name, "Renamed");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_edit_requires_open_form() {
        let (mut builder, _) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.store().phase_keys()[0];
        let err = builder.edit_phase(key, PhaseFields::default()).unwrap_err();
        assert!(matches!(err, BuilderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_delete_declined_has_no_side_effect() {
        let prompt = Arc::new(AutoConfirm::no());
        let (mut builder, backend) = loaded_builder(prompt.clone()).await;
        let key = builder.store().phase_keys()[0];

        assert!(builder.delete(key).await.unwrap().is_none());
        assert_eq!(builder.store().phase_len(), 2);
        assert!(backend.calls().is_empty());
        assert_eq!(prompt.confirms(), vec![CONFIRM_DELETE_PHASE.to_string()]);
    }

    #[tokio::test]
    async fn test_delete_phase_renumbers_remaining() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let first = builder.store().phase_keys()[0];
        let second = builder.store().phase_keys()[1];

        let report = builder.delete(first).await.unwrap().unwrap();
        assert!(report.is_clean());
        assert_eq!(builder.store().phase_keys(), &[second]);
        assert_eq!(builder.store().phase(second).unwrap().order, 1);

        let calls = backend.calls();
        assert_eq!(calls[0].method, Method::Delete);
        assert_eq!(calls[1].method, Method::Put);
        assert_eq!(calls[1].body.as_ref().unwrap()["phase"]["order"], 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_block() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.store().phase_keys()[0];
        backend.fail_next(Method::Delete, 403, "not allowed");

        assert!(builder.delete(key).await.is_err());
        let block = builder.store().phase(key).unwrap();
        assert_eq!(block.state(), BlockState::SavedClosed);
        assert_eq!(block.last_error.as_deref(), Some("not allowed"));
        assert_eq!(builder.store().phase_len(), 2);
    }

    #[tokio::test]
    async fn test_unsaved_blocks_cannot_be_deleted() {
        let (mut builder, _) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let key = builder.add_phase();
        assert!(matches!(
            builder.delete(key).await,
            Err(BuilderError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_activity_renumbers_its_list() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let phase = builder.store().phase_keys()[0];
        let first = builder.store().activity_keys(phase).unwrap()[0];
        let second = builder.store().activity_keys(phase).unwrap()[1];

        builder.delete(first).await.unwrap().unwrap();
        assert_eq!(builder.store().activity_keys(phase).unwrap(), &[second]);
        assert_eq!(builder.store().activity(second).unwrap().order, 1);
        assert_eq!(backend.calls_with(Method::Put).len(), 1);
    }

    #[tokio::test]
    async fn test_condition_ids_read_back_when_save_answer_omits_them() {
        let memory = Arc::new(MemoryBackend::with_demo_data());
        let (mut builder, key, row) = builder_with_new_row(memory.clone()).await;

        builder.save(key).await.unwrap();
        let block = builder.store().phase(key).unwrap();
        assert!(block.conditions.iter().all(|r| r.value.id.is_some()));
        assert!(block.last_error.is_none());
        assert_eq!(memory.calls_with(Method::Get).len(), 1);

        // The next save sends every row with its id.
        builder.open(key).unwrap();
        builder.save(key).await.unwrap();
        let puts = memory.calls_with(Method::Put);
        let body = puts.last().unwrap().body.as_ref().unwrap();
        let sent = body["phase_conditions"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|c| c.get("id").is_some()));

        builder.open(key).unwrap();
        builder.remove_condition(key, row).await.unwrap();
        assert_eq!(memory.calls_with(Method::Delete).len(), 1);
    }

    #[tokio::test]
    async fn test_unconfirmed_condition_ids_mark_the_block() {
        let memory = Arc::new(MemoryBackend::with_demo_data());
        let (mut builder, key, _) = builder_with_new_row(memory.clone()).await;
        memory.fail_next(Method::Get, 500, "listing unavailable");

        builder.save(key).await.unwrap();
        let block = builder.store().phase(key).unwrap();
        assert_eq!(block.state(), BlockState::SavedClosed);
        assert_eq!(block.last_error.as_deref(), Some(UNCONFIRMED_CONDITIONS));
        assert!(block.conditions.iter().any(|r| r.value.id.is_none()));
    }

    #[tokio::test]
    async fn test_cancel_resaves_only_shifted_saved_phases() {
        let (mut builder, backend) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let draft = builder.add_phase();
        let cancelled = builder.add_phase();
        builder.store.move_phase(cancelled, 0).unwrap();
        builder.store.assign_phase_orders();

        assert_eq!(builder.cancel(cancelled).await.unwrap(), BlockState::Removed);
        assert!(backend.calls_with(Method::Post).is_empty());
        assert_eq!(backend.calls_with(Method::Put).len(), 2);

        let draft = builder.store().phase(draft).unwrap();
        assert_eq!(draft.id, None);
        assert_eq!(draft.state(), BlockState::UnsavedOpen);
        let orders: Vec<u32> = builder.store().phases().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_activity_save_needs_saved_parent() {
        let (mut builder, _) = loaded_builder(Arc::new(AutoConfirm::yes())).await;
        let phase = builder.add_phase();
        let activity = builder
            .store
            .insert_new_activity(phase, 0, &PaletteItem::new("module", 9, "Loose"))
            .unwrap();
        assert!(matches!(
            builder.save(activity).await,
            Err(BuilderError::ParentUnsaved(_))
        ));
    }
}
