use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Default name given to a phase the operator has not named yet.
pub const UNTITLED: &str = "Untitled";

/// What a block's conditions do to it once they aggregate to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalAction {
    #[default]
    Lock,
    Unlock,
}

impl ConditionalAction {
    pub const ALL: [ConditionalAction; 2] = [ConditionalAction::Lock, ConditionalAction::Unlock];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionalAction::Lock => "lock",
            ConditionalAction::Unlock => "unlock",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConditionalAction::Lock => "Lock",
            ConditionalAction::Unlock => "Unlock",
        }
    }
}

/// Aggregation policy applied to a block's own condition list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalStatus {
    #[default]
    All,
    Any,
    None,
}

impl ConditionalStatus {
    pub const ALL: [ConditionalStatus; 3] = [
        ConditionalStatus::All,
        ConditionalStatus::Any,
        ConditionalStatus::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionalStatus::All => "all",
            ConditionalStatus::Any => "any",
            ConditionalStatus::None => "none",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConditionalStatus::All => "All",
            ConditionalStatus::Any => "Any",
            ConditionalStatus::None => "None",
        }
    }
}

/// Predicate a condition row tests against its target.
///
/// The status predicates apply to phases and activities; `Unlocked` is only
/// offered for activity conditions. The temporal predicates (`DayOf`,
/// `*Before`, `*Past`) are only meaningful against the event start/end
/// sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Complete,
    Locked,
    Unlocked,
    Empty,
    Approved,
    Rejected,
    DayOf,
    OneBefore,
    TwoBefore,
    ThreeBefore,
    FourBefore,
    FiveBefore,
    SixBefore,
    SevenBefore,
    OnePast,
    TwoPast,
    ThreePast,
    FourPast,
    FivePast,
    SixPast,
    SevenPast,
}

impl ConditionKind {
    pub const PHASE_STATUS: [ConditionKind; 5] = [
        ConditionKind::Complete,
        ConditionKind::Locked,
        ConditionKind::Empty,
        ConditionKind::Approved,
        ConditionKind::Rejected,
    ];

    pub const ACTIVITY_STATUS: [ConditionKind; 6] = [
        ConditionKind::Complete,
        ConditionKind::Locked,
        ConditionKind::Unlocked,
        ConditionKind::Empty,
        ConditionKind::Approved,
        ConditionKind::Rejected,
    ];

    pub const TEMPORAL: [ConditionKind; 15] = [
        ConditionKind::DayOf,
        ConditionKind::OneBefore,
        ConditionKind::TwoBefore,
        ConditionKind::ThreeBefore,
        ConditionKind::FourBefore,
        ConditionKind::FiveBefore,
        ConditionKind::SixBefore,
        ConditionKind::SevenBefore,
        ConditionKind::OnePast,
        ConditionKind::TwoPast,
        ConditionKind::ThreePast,
        ConditionKind::FourPast,
        ConditionKind::FivePast,
        ConditionKind::SixPast,
        ConditionKind::SevenPast,
    ];

    pub fn is_temporal(self) -> bool {
        Self::TEMPORAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::Complete => "complete",
            ConditionKind::Locked => "locked",
            ConditionKind::Unlocked => "unlocked",
            ConditionKind::Empty => "empty",
            ConditionKind::Approved => "approved",
            ConditionKind::Rejected => "rejected",
            ConditionKind::DayOf => "day_of",
            ConditionKind::OneBefore => "one_before",
            ConditionKind::TwoBefore => "two_before",
            ConditionKind::ThreeBefore => "three_before",
            ConditionKind::FourBefore => "four_before",
            ConditionKind::FiveBefore => "five_before",
            ConditionKind::SixBefore => "six_before",
            ConditionKind::SevenBefore => "seven_before",
            ConditionKind::OnePast => "one_past",
            ConditionKind::TwoPast => "two_past",
            ConditionKind::ThreePast => "three_past",
            ConditionKind::FourPast => "four_past",
            ConditionKind::FivePast => "five_past",
            ConditionKind::SixPast => "six_past",
            ConditionKind::SevenPast => "seven_past",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConditionKind::Complete => "Complete",
            ConditionKind::Locked => "Locked",
            ConditionKind::Unlocked => "Unlocked",
            ConditionKind::Empty => "Empty",
            ConditionKind::Approved => "Approved",
            ConditionKind::Rejected => "Rejected",
            ConditionKind::DayOf => "Day of",
            ConditionKind::OneBefore => "1 day before",
            ConditionKind::TwoBefore => "2 days before",
            ConditionKind::ThreeBefore => "3 days before",
            ConditionKind::FourBefore => "4 days before",
            ConditionKind::FiveBefore => "5 days before",
            ConditionKind::SixBefore => "6 days before",
            ConditionKind::SevenBefore => "7 days before",
            ConditionKind::OnePast => "1 day past",
            ConditionKind::TwoPast => "2 days past",
            ConditionKind::ThreePast => "3 days past",
            ConditionKind::FourPast => "4 days past",
            ConditionKind::FivePast => "5 days past",
            ConditionKind::SixPast => "6 days past",
            ConditionKind::SevenPast => "7 days past",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Is,
    IsNot,
    LessThan,
    GreaterThan,
    Equals,
}

impl ConditionOperator {
    pub const STATUS: [ConditionOperator; 2] = [ConditionOperator::Is, ConditionOperator::IsNot];

    pub const TEMPORAL: [ConditionOperator; 3] = [
        ConditionOperator::LessThan,
        ConditionOperator::GreaterThan,
        ConditionOperator::Equals,
    ];

    pub fn is_temporal(self) -> bool {
        Self::TEMPORAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionOperator::Is => "is",
            ConditionOperator::IsNot => "is_not",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::Equals => "equals",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConditionOperator::Is => "is",
            ConditionOperator::IsNot => "is not",
            ConditionOperator::LessThan => "less than",
            ConditionOperator::GreaterThan => "greater than",
            ConditionOperator::Equals => "equals",
        }
    }
}

/// Target of a phase condition: another phase, or one of the two event
/// sentinels. On the wire this is a bare integer where `-1` is the event
/// start and `-2` the event end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PhaseRef {
    EventStart,
    EventEnd,
    Phase(i64),
}

impl PhaseRef {
    pub const EVENT_START_ID: i64 = -1;
    pub const EVENT_END_ID: i64 = -2;

    pub fn is_sentinel(self) -> bool {
        matches!(self, PhaseRef::EventStart | PhaseRef::EventEnd)
    }

    pub fn as_i64(self) -> i64 {
        match self {
            PhaseRef::EventStart => Self::EVENT_START_ID,
            PhaseRef::EventEnd => Self::EVENT_END_ID,
            PhaseRef::Phase(id) => id,
        }
    }
}

impl TryFrom<i64> for PhaseRef {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::EVENT_START_ID => Ok(PhaseRef::EventStart),
            Self::EVENT_END_ID => Ok(PhaseRef::EventEnd),
            id if id > 0 => Ok(PhaseRef::Phase(id)),
            other => Err(format!("invalid conditional phase id {}", other)),
        }
    }
}

impl From<PhaseRef> for i64 {
    fn from(value: PhaseRef) -> Self {
        value.as_i64()
    }
}

impl fmt::Display for PhaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseRef::EventStart => write!(f, "EVENT START"),
            PhaseRef::EventEnd => write!(f, "EVENT END"),
            PhaseRef::Phase(id) => write!(f, "phase #{}", id),
        }
    }
}

/// A lock/unlock rule attached to a phase.
///
/// Every field may be blank: an incomplete row is persisted as-is and the
/// backend decides whether it is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub conditional_phase_id: Option<PhaseRef>,
    #[serde(default)]
    pub condition: Option<ConditionKind>,
    #[serde(default)]
    pub operator: Option<ConditionOperator>,
}

/// A lock/unlock rule attached to an activity, referencing another activity
/// of the same phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub conditional_phase_activity_id: Option<i64>,
    #[serde(default)]
    pub condition: Option<ConditionKind>,
    #[serde(default)]
    pub operator: Option<ConditionOperator>,
}

/// Operator-editable attributes of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFields {
    #[serde(default = "default_phase_name", deserialize_with = "null_as_untitled")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires_approval: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditional_action: ConditionalAction,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditional_status: ConditionalStatus,
}

fn default_phase_name() -> String {
    UNTITLED.to_string()
}

/// Nullable columns come back as `null`; read that the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_untitled<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_phase_name))
}

impl Default for PhaseFields {
    fn default() -> Self {
        Self {
            name: default_phase_name(),
            description: None,
            requires_approval: false,
            conditional_action: ConditionalAction::default(),
            conditional_status: ConditionalStatus::default(),
        }
    }
}

/// A campaign phase as the backend lists it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub fields: PhaseFields,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: u32,
    #[serde(default, rename = "phase_conditions", deserialize_with = "null_as_default")]
    pub conditions: Vec<PhaseCondition>,
    #[serde(default, rename = "phase_activities", deserialize_with = "null_as_default")]
    pub activities: Vec<PhaseActivity>,
}

/// Operator-editable attributes of a phase activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFields {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditional_action: ConditionalAction,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditional_status: ConditionalStatus,
}

/// An activity definition bound into a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub fields: ActivityFields,
    pub activity_type: String,
    pub activity_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: u32,
    #[serde(default, rename = "phase_activity_conditions", deserialize_with = "null_as_default")]
    pub conditions: Vec<ActivityCondition>,
}

impl PhaseActivity {
    pub fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(&self.activity_type, self.activity_id)
    }
}

/// The `(activity_type, activity_id)` pair naming which underlying activity
/// definition a phase activity is. Unique within one phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityIdentity {
    pub activity_type: String,
    pub activity_id: i64,
}

impl ActivityIdentity {
    pub fn new(activity_type: impl Into<String>, activity_id: i64) -> Self {
        Self {
            activity_type: activity_type.into(),
            activity_id,
        }
    }
}

impl fmt::Display for ActivityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.activity_type, self.activity_id)
    }
}

/// An entry of the activity palette that can be dragged into a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteItem {
    pub activity_type: String,
    pub activity_id: i64,
    pub display_name: String,
}

impl PaletteItem {
    pub fn new(activity_type: impl Into<String>, activity_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            activity_id,
            display_name: display_name.into(),
        }
    }

    pub fn identity(&self) -> ActivityIdentity {
        ActivityIdentity::new(&self.activity_type, self.activity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ref_wire_values() {
        assert_eq!(serde_json::to_string(&PhaseRef::EventStart).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&PhaseRef::EventEnd).unwrap(), "-2");
        assert_eq!(serde_json::to_string(&PhaseRef::Phase(12)).unwrap(), "12");

        let parsed: PhaseRef = serde_json::from_str("-2").unwrap();
        assert_eq!(parsed, PhaseRef::EventEnd);
        assert!(parsed.is_sentinel());
        assert!(serde_json::from_str::<PhaseRef>("-7").is_err());
        assert!(serde_json::from_str::<PhaseRef>("0").is_err());
    }

    #[test]
    fn test_condition_kind_subsets() {
        assert!(ConditionKind::ThreeBefore.is_temporal());
        assert!(ConditionKind::DayOf.is_temporal());
        assert!(!ConditionKind::Approved.is_temporal());
        assert!(!ConditionKind::PHASE_STATUS.contains(&ConditionKind::Unlocked));
        assert!(ConditionKind::ACTIVITY_STATUS.contains(&ConditionKind::Unlocked));
        assert_eq!(
            serde_json::to_string(&ConditionKind::SevenPast).unwrap(),
            "\"seven_past\""
        );
        assert_eq!(ConditionKind::SevenPast.as_str(), "seven_past");
    }

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(serde_json::to_string(&ConditionOperator::IsNot).unwrap(), "\"is_not\"");
        assert!(ConditionOperator::Equals.is_temporal());
        assert!(!ConditionOperator::Is.is_temporal());
    }

    #[test]
    fn test_phase_deserializes_with_defaults() {
        let json = r#"{
            "id": 10,
            "name": "Kickoff",
            "description": null,
            "requires_approval": true,
            "order": 1,
            "conditional_action": "unlock",
            "conditional_status": "any",
            "phase_conditions": [
                {"id": 3, "conditional_phase_id": -1, "condition": "day_of", "operator": "equals"}
            ],
            "phase_activities": [
                {"id": 5, "display_name": "Intro", "due_date": "2026-03-01", "required": true,
                 "activity_type": "module", "activity_id": 1, "order": 1}
            ]
        }"#;
        let phase: Phase = serde_json::from_str(json).unwrap();
        assert_eq!(phase.id, Some(10));
        assert_eq!(phase.fields.name, "Kickoff");
        assert_eq!(phase.fields.conditional_status, ConditionalStatus::Any);
        assert_eq!(
            phase.conditions[0].conditional_phase_id,
            Some(PhaseRef::EventStart)
        );
        assert_eq!(phase.activities[0].identity(), ActivityIdentity::new("module", 1));
        assert_eq!(
            phase.activities[0].fields.due_date,
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert!(phase.activities[0].conditions.is_empty());
    }

    #[test]
    fn test_null_columns_read_as_defaults() {
        let json = r#"{
            "id": 1,
            "name": null,
            "description": null,
            "requires_approval": null,
            "order": null,
            "conditional_action": null,
            "conditional_status": null,
            "phase_conditions": null,
            "phase_activities": [
                {"id": 2, "display_name": null, "due_date": null, "required": null,
                 "activity_type": "module", "activity_id": 4, "order": 1,
                 "conditional_action": null, "conditional_status": null,
                 "phase_activity_conditions": null}
            ]
        }"#;
        let phase: Phase = serde_json::from_str(json).unwrap();
        assert_eq!(phase.fields, PhaseFields::default());
        assert_eq!(phase.order, 0);
        assert!(phase.conditions.is_empty());

        let activity = &phase.activities[0];
        assert_eq!(activity.fields, ActivityFields::default());
        assert_eq!(activity.fields.conditional_action, ConditionalAction::Lock);
        assert_eq!(activity.fields.conditional_status, ConditionalStatus::All);
        assert!(activity.conditions.is_empty());
    }

    #[test]
    fn test_blank_phase_is_untitled() {
        let phase: Phase = serde_json::from_str("{}").unwrap();
        assert_eq!(phase.fields.name, UNTITLED);
        assert_eq!(phase.fields.conditional_action, ConditionalAction::Lock);
        assert_eq!(phase.fields.conditional_status, ConditionalStatus::All);
    }
}
