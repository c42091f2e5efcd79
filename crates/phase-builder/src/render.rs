//! Template renderer: a pure projection of the store into typed view
//! models. Nothing here mutates builder state.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::Serialize;

use crate::conditions::{activity_condition_gate, phase_condition_gate, ConditionGate};
use crate::lifecycle::BlockState;
use crate::store::{ActivityBlock, BlockId, BuilderStore, PhaseBlock, RowId};
use crate::types::{
    ActivityCondition, ConditionKind, ConditionOperator, ConditionalAction, ConditionalStatus,
    PhaseCondition, PhaseRef,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub enabled: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectView {
    pub name: &'static str,
    pub options: Vec<OptionView>,
}

impl SelectView {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            options: Vec::new(),
        }
    }

    fn push(&mut self, value: impl Into<String>, label: impl Into<String>, enabled: bool, selected: bool) {
        self.options.push(OptionView {
            value: value.into(),
            label: label.into(),
            enabled,
            selected,
        });
    }

    pub fn selected(&self) -> Option<&OptionView> {
        self.options.iter().find(|o| o.selected)
    }

    pub fn enabled_values(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter(|o| o.enabled)
            .map(|o| o.value.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionRowView {
    pub key: RowId,
    pub id: Option<i64>,
    pub reference: SelectView,
    pub condition: SelectView,
    pub operator: SelectView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityView {
    pub key: BlockId,
    pub id: Option<i64>,
    pub display_name: String,
    pub due_date: Option<NaiveDate>,
    pub required: bool,
    pub activity_type: String,
    pub activity_id: i64,
    pub order: u32,
    pub state: BlockState,
    pub open: bool,
    pub conditional_action: SelectView,
    pub conditional_status: SelectView,
    /// The logic panel shows iff there is at least one condition row.
    pub logic_visible: bool,
    pub conditions: Vec<ConditionRowView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseView {
    pub key: BlockId,
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub requires_approval: bool,
    pub order: u32,
    pub state: BlockState,
    pub open: bool,
    pub conditional_action: SelectView,
    pub conditional_status: SelectView,
    pub logic_visible: bool,
    pub conditions: Vec<ConditionRowView>,
    /// Hidden until the phase is saved.
    pub activities_visible: bool,
    /// Empty-state drop zone, shown for a saved phase with no activities.
    pub drop_zone_visible: bool,
    pub activities: Vec<ActivityView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuilderView {
    pub phases: Vec<PhaseView>,
}

impl BuilderView {
    pub fn phase(&self, key: BlockId) -> Option<&PhaseView> {
        self.phases.iter().find(|p| p.key == key)
    }
}

fn action_select(current: ConditionalAction) -> SelectView {
    let mut select = SelectView::new("conditional_action");
    for action in ConditionalAction::ALL {
        select.push(action.as_str(), action.label(), true, action == current);
    }
    select
}

fn status_select(current: ConditionalStatus) -> SelectView {
    let mut select = SelectView::new("conditional_status");
    for status in ConditionalStatus::ALL {
        select.push(status.as_str(), status.label(), true, status == current);
    }
    select
}

fn gated_selects(
    gate: &ConditionGate,
    condition: Option<ConditionKind>,
    operator: Option<ConditionOperator>,
) -> (SelectView, SelectView) {
    let mut conditions = SelectView::new("condition");
    conditions.push("", "", true, condition.is_none());
    for (kind, enabled) in &gate.conditions {
        conditions.push(kind.as_str(), kind.label(), *enabled, Some(*kind) == condition);
    }
    let mut operators = SelectView::new("operator");
    operators.push("", "", true, operator.is_none());
    for (op, enabled) in &gate.operators {
        operators.push(op.as_str(), op.label(), *enabled, Some(*op) == operator);
    }
    (conditions, operators)
}

/// Reference options for a phase condition: both sentinels, then every
/// other saved phase.
fn phase_reference_select(store: &BuilderStore, owner: BlockId, current: Option<PhaseRef>) -> SelectView {
    let mut select = SelectView::new("conditional_phase_id");
    select.push("", "", true, current.is_none());
    for sentinel in [PhaseRef::EventStart, PhaseRef::EventEnd] {
        select.push(
            sentinel.as_i64().to_string(),
            sentinel.to_string(),
            true,
            current == Some(sentinel),
        );
    }
    let mut listed = false;
    for phase in store.phases().filter(|p| p.key != owner) {
        if let Some(id) = phase.id {
            let selected = current == Some(PhaseRef::Phase(id));
            listed |= selected;
            select.push(id.to_string(), phase.fields.name.clone(), true, selected);
        }
    }
    // Keep a reference to a phase that is no longer listed visible.
    if let Some(PhaseRef::Phase(id)) = current {
        if !listed {
            select.push(id.to_string(), PhaseRef::Phase(id).to_string(), true, true);
        }
    }
    select
}

fn activity_reference_select(store: &BuilderStore, owner: &ActivityBlock, current: Option<i64>) -> SelectView {
    let mut select = SelectView::new("conditional_phase_activity_id");
    select.push("", "", true, current.is_none());
    let mut listed = false;
    for sibling in store.activities_of(owner.phase).filter(|a| a.key != owner.key) {
        if let Some(id) = sibling.id {
            let selected = current == Some(id);
            listed |= selected;
            select.push(id.to_string(), sibling.fields.display_name.clone(), true, selected);
        }
    }
    if let Some(id) = current {
        if !listed {
            select.push(id.to_string(), format!("activity #{}", id), true, true);
        }
    }
    select
}

fn phase_condition_row(store: &BuilderStore, owner: BlockId, key: RowId, value: &PhaseCondition) -> ConditionRowView {
    let gate = phase_condition_gate(value.conditional_phase_id);
    let (condition, operator) = gated_selects(&gate, value.condition, value.operator);
    ConditionRowView {
        key,
        id: value.id,
        reference: phase_reference_select(store, owner, value.conditional_phase_id),
        condition,
        operator,
    }
}

fn activity_condition_row(
    store: &BuilderStore,
    owner: &ActivityBlock,
    key: RowId,
    value: &ActivityCondition,
) -> ConditionRowView {
    let (condition, operator) = gated_selects(&activity_condition_gate(), value.condition, value.operator);
    ConditionRowView {
        key,
        id: value.id,
        reference: activity_reference_select(store, owner, value.conditional_phase_activity_id),
        condition,
        operator,
    }
}

pub fn render_activity(store: &BuilderStore, block: &ActivityBlock) -> ActivityView {
    let conditions: Vec<_> = block
        .conditions
        .iter()
        .map(|row| activity_condition_row(store, block, row.key, &row.value))
        .collect();
    ActivityView {
        key: block.key,
        id: block.id,
        display_name: block.fields.display_name.clone(),
        due_date: block.fields.due_date,
        required: block.fields.required,
        activity_type: block.activity_type.clone(),
        activity_id: block.activity_id,
        order: block.order,
        state: block.state(),
        open: block.state().is_open(),
        conditional_action: action_select(block.fields.conditional_action),
        conditional_status: status_select(block.fields.conditional_status),
        logic_visible: !conditions.is_empty(),
        conditions,
        error: block.last_error.clone(),
    }
}

pub fn render_phase(store: &BuilderStore, block: &PhaseBlock) -> PhaseView {
    let conditions: Vec<_> = block
        .conditions
        .iter()
        .map(|row| phase_condition_row(store, block.key, row.key, &row.value))
        .collect();
    let activities: Vec<_> = store
        .activities_of(block.key)
        .map(|a| render_activity(store, a))
        .collect();
    PhaseView {
        key: block.key,
        id: block.id,
        name: block.fields.name.clone(),
        description: block.fields.description.clone(),
        requires_approval: block.fields.requires_approval,
        order: block.order,
        state: block.state(),
        open: block.state().is_open(),
        conditional_action: action_select(block.fields.conditional_action),
        conditional_status: status_select(block.fields.conditional_status),
        logic_visible: !conditions.is_empty(),
        conditions,
        activities_visible: block.is_saved(),
        drop_zone_visible: block.is_saved() && activities.is_empty(),
        activities,
        error: block.last_error.clone(),
    }
}

pub fn render_builder(store: &BuilderStore) -> BuilderView {
    BuilderView {
        phases: store.phases().map(|p| render_phase(store, p)).collect(),
    }
}

fn selected_label(select: &SelectView) -> &str {
    match select.selected() {
        Some(option) if !option.value.is_empty() => option.label.as_str(),
        _ => "-",
    }
}

fn write_rules(out: &mut String, indent: &str, action: &SelectView, status: &SelectView, rows: &[ConditionRowView]) {
    if rows.is_empty() {
        return;
    }
    let _ = writeln!(
        out,
        "{}{} when {} of:",
        indent,
        selected_label(action),
        selected_label(status)
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{}  - {} {} {}",
            indent,
            selected_label(&row.reference),
            selected_label(&row.operator),
            selected_label(&row.condition)
        );
    }
}

fn id_label(id: Option<i64>) -> String {
    id.map_or_else(|| "unsaved".to_string(), |id| format!("#{}", id))
}

/// Plain-text outline of the builder, one line per block.
pub fn outline(view: &BuilderView) -> String {
    let mut out = String::new();
    if view.phases.is_empty() {
        out.push_str("(no phases)\n");
        return out;
    }
    for phase in &view.phases {
        let _ = writeln!(
            out,
            "{}. {} [{}, {}]{}",
            phase.order,
            phase.name,
            id_label(phase.id),
            phase.state,
            if phase.requires_approval { " (approval)" } else { "" }
        );
        if let Some(error) = &phase.error {
            let _ = writeln!(out, "   ! {}", error);
        }
        write_rules(
            &mut out,
            "   ",
            &phase.conditional_action,
            &phase.conditional_status,
            &phase.conditions,
        );
        for activity in &phase.activities {
            let _ = writeln!(
                out,
                "   {}. {} ({}:{}) [{}, {}]",
                activity.order,
                activity.display_name,
                activity.activity_type,
                activity.activity_id,
                id_label(activity.id),
                activity.state
            );
            if let Some(error) = &activity.error {
                let _ = writeln!(out, "      ! {}", error);
            }
            write_rules(
                &mut out,
                "      ",
                &activity.conditional_action,
                &activity.conditional_status,
                &activity.conditions,
            );
        }
        if phase.drop_zone_visible {
            out.push_str("   (drop activities here)\n");
        }
    }
    out
}
