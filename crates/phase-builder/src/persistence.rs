//! Persistence seam between the builder and the campaign REST backend.

use async_trait::async_trait;
use campaign_core::BuilderResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{
    ActivityCondition, ConditionalAction, ConditionalStatus, Phase, PhaseCondition,
};

/// `phase` member of a phase save payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAttributes {
    pub name: String,
    pub description: Option<String>,
    pub requires_approval: bool,
    pub order: u32,
    pub conditional_action: ConditionalAction,
    pub conditional_status: ConditionalStatus,
}

/// Body of `POST /phases.json` and `PUT /phases/{id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePayload {
    pub phase: PhaseAttributes,
    pub phase_conditions: Vec<PhaseCondition>,
}

/// `phase_activity` member of an activity save payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAttributes {
    pub display_name: String,
    pub due_date: Option<NaiveDate>,
    pub required: bool,
    pub activity_type: String,
    pub activity_id: i64,
    pub order: u32,
    pub conditional_action: ConditionalAction,
    pub conditional_status: ConditionalStatus,
}

/// Body of the phase activity create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub phase_activity: ActivityAttributes,
    pub phase_activity_conditions: Vec<ActivityCondition>,
}

/// What a successful create/update answers with: the record id and the ids
/// of its nested conditions, in payload order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecord {
    pub id: i64,
    #[serde(default, alias = "phase_conditions", alias = "phase_activity_conditions")]
    pub conditions: Vec<SavedCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCondition {
    pub id: i64,
}

/// REST operations the builder needs. Every call is independent: the
/// builder may have several in flight and applies answers in whatever order
/// they complete.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn list_phases(&self) -> BuilderResult<Vec<Phase>>;

    async fn create_phase(&self, payload: &PhasePayload) -> BuilderResult<SavedRecord>;

    async fn update_phase(&self, phase_id: i64, payload: &PhasePayload) -> BuilderResult<SavedRecord>;

    async fn delete_phase(&self, phase_id: i64) -> BuilderResult<()>;

    async fn delete_phase_condition(&self, phase_id: i64, condition_id: i64) -> BuilderResult<()>;

    async fn create_activity(&self, phase_id: i64, payload: &ActivityPayload) -> BuilderResult<SavedRecord>;

    async fn update_activity(
        &self,
        phase_id: i64,
        activity_id: i64,
        payload: &ActivityPayload,
    ) -> BuilderResult<SavedRecord>;

    async fn delete_activity(&self, phase_id: i64, activity_id: i64) -> BuilderResult<()>;

    async fn delete_activity_condition(
        &self,
        phase_id: i64,
        activity_id: i64,
        condition_id: i64,
    ) -> BuilderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConditionKind, ConditionOperator, PhaseRef};

    #[test]
    fn test_phase_payload_shape() {
        let payload = PhasePayload {
            phase: PhaseAttributes {
                name: "Kickoff".into(),
                description: None,
                requires_approval: true,
                order: 1,
                conditional_action: ConditionalAction::Unlock,
                conditional_status: ConditionalStatus::Any,
            },
            phase_conditions: vec![
                PhaseCondition {
                    id: None,
                    conditional_phase_id: Some(PhaseRef::EventEnd),
                    condition: Some(ConditionKind::ThreeBefore),
                    operator: Some(ConditionOperator::Equals),
                },
                PhaseCondition::default(),
            ],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["phase"]["requires_approval"], true);
        assert_eq!(json["phase"]["conditional_action"], "unlock");
        assert_eq!(json["phase_conditions"][0]["conditional_phase_id"], -2);
        assert_eq!(json["phase_conditions"][0]["condition"], "three_before");
        assert!(json["phase_conditions"][0].get("id").is_none());
        // Blank rows go out as nulls.
        assert!(json["phase_conditions"][1]["condition"].is_null());
    }

    #[test]
    fn test_saved_record_reads_nested_condition_ids() {
        let record: SavedRecord =
            serde_json::from_str(r#"{"id": 7, "name": "x", "phase_conditions": [{"id": 3}]}"#).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.conditions, vec![SavedCondition { id: 3 }]);

        let bare: SavedRecord = serde_json::from_str(r#"{"id": 8}"#).unwrap();
        assert!(bare.conditions.is_empty());
    }
}
