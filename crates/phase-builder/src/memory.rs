//! In-memory phase backend backed by DashMap.
//!
//! Speaks the same contract as the REST API: assigns ids, stores nested
//! conditions, answers deletes of missing records with a harmless no-op and
//! rejects duplicate activities within a phase. Every call is recorded so
//! callers can inspect exactly what the builder sent. Failures and per-call
//! latency can be injected to exercise error and out-of-order paths.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use campaign_core::{BuilderError, BuilderResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::persistence::{
    ActivityPayload, PersistenceClient, PhasePayload, SavedCondition, SavedRecord,
};
use crate::routes;
use crate::types::{
    ActivityCondition, ActivityFields, ConditionKind, ConditionOperator, ConditionalAction,
    ConditionalStatus, Phase, PhaseActivity, PhaseCondition, PhaseFields, PhaseRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One call as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    method: Method,
    path: Option<String>,
    status: u16,
    message: String,
}

pub struct MemoryBackend {
    phases: DashMap<i64, Phase>,
    next_id: AtomicI64,
    calls: Mutex<Vec<RecordedCall>>,
    completions: Mutex<Vec<RecordedCall>>,
    failures: Mutex<Vec<InjectedFailure>>,
    latencies: Mutex<VecDeque<Duration>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            phases: DashMap::new(),
            next_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            latencies: Mutex::new(VecDeque::new()),
        }
    }

    /// Backend pre-populated with a small demo campaign.
    pub fn with_demo_data() -> Self {
        let backend = Self::new();
        backend.seed_demo_data();
        info!(phases = backend.phases.len(), "Memory backend seeded with demo campaign");
        backend
    }

    /// Stores a phase as if the server already had it. Records without ids
    /// (the phase, its conditions, its activities) get fresh ones.
    pub fn insert_phase(&self, mut phase: Phase) -> i64 {
        let id = match phase.id {
            Some(id) => {
                self.bump_past(id);
                id
            }
            None => self.allocate(),
        };
        phase.id = Some(id);
        for condition in &mut phase.conditions {
            condition.id = Some(self.assign(condition.id));
        }
        for activity in &mut phase.activities {
            activity.id = Some(self.assign(activity.id));
            for condition in &mut activity.conditions {
                condition.id = Some(self.assign(condition.id));
            }
        }
        self.phases.insert(id, phase);
        id
    }

    pub fn phase(&self, id: i64) -> Option<Phase> {
        self.phases.get(&id).map(|r| r.value().clone())
    }

    /// Stored phases sorted by `order`, then id.
    pub fn snapshot(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = self.phases.iter().map(|r| r.value().clone()).collect();
        phases.sort_by_key(|p| (p.order, p.id));
        for phase in &mut phases {
            phase.activities.sort_by_key(|a| (a.order, a.id));
        }
        phases
    }

    /// Calls in the order they were issued.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls in the order their answers were produced.
    pub fn completions(&self) -> Vec<RecordedCall> {
        self.completions.lock().clone()
    }

    pub fn calls_with(&self, method: Method) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
        self.completions.lock().clear();
    }

    /// The next call with `method` fails with `status` and `message`.
    pub fn fail_next(&self, method: Method, status: u16, message: impl Into<String>) {
        self.failures.lock().push(InjectedFailure {
            method,
            path: None,
            status,
            message: message.into(),
        });
    }

    /// The next call with `method` on exactly `path` fails.
    pub fn fail_path(&self, method: Method, path: impl Into<String>, status: u16, message: impl Into<String>) {
        self.failures.lock().push(InjectedFailure {
            method,
            path: Some(path.into()),
            status,
            message: message.into(),
        });
    }

    /// Delays the next calls (one entry per call, in issue order).
    pub fn delay_next(&self, delays: impl IntoIterator<Item = Duration>) {
        self.latencies.lock().extend(delays);
    }

    fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn bump_past(&self, id: i64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    fn assign(&self, existing: Option<i64>) -> i64 {
        match existing {
            Some(id) => {
                self.bump_past(id);
                id
            }
            None => self.allocate(),
        }
    }

    /// Records the call, waits out any injected latency and returns the
    /// injected failure if one matches.
    async fn enter<B: serde::Serialize>(&self, method: Method, path: String, body: Option<&B>) -> BuilderResult<RecordedCall> {
        let call = RecordedCall {
            method,
            path,
            body: body.map(serde_json::to_value).transpose()?,
        };
        self.calls.lock().push(call.clone());

        let delay = self.latencies.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completions.lock().push(call.clone());

        let failure = {
            let mut failures = self.failures.lock();
            let position = failures.iter().position(|f| {
                f.method == method && f.path.as_deref().map_or(true, |p| p == call.path)
            });
            position.map(|i| failures.remove(i))
        };
        match failure {
            Some(f) if f.status == 404 => Err(BuilderError::NotFound(call.path.clone())),
            Some(f) => Err(BuilderError::Rejected {
                status: f.status,
                message: f.message,
            }),
            None => Ok(call),
        }
    }

    fn not_found(path: &str) -> BuilderError {
        BuilderError::NotFound(path.to_string())
    }

    fn store_phase_conditions(&self, conditions: &[PhaseCondition]) -> Vec<PhaseCondition> {
        conditions
            .iter()
            .map(|c| PhaseCondition {
                id: Some(self.assign(c.id)),
                ..c.clone()
            })
            .collect()
    }

    fn store_activity_conditions(&self, conditions: &[ActivityCondition]) -> Vec<ActivityCondition> {
        conditions
            .iter()
            .map(|c| ActivityCondition {
                id: Some(self.assign(c.id)),
                ..c.clone()
            })
            .collect()
    }

    fn activity_from_payload(&self, id: i64, payload: &ActivityPayload) -> PhaseActivity {
        let attrs = &payload.phase_activity;
        PhaseActivity {
            id: Some(id),
            fields: ActivityFields {
                display_name: attrs.display_name.clone(),
                due_date: attrs.due_date,
                required: attrs.required,
                conditional_action: attrs.conditional_action,
                conditional_status: attrs.conditional_status,
            },
            activity_type: attrs.activity_type.clone(),
            activity_id: attrs.activity_id,
            order: attrs.order,
            conditions: self.store_activity_conditions(&payload.phase_activity_conditions),
        }
    }

    fn duplicate_in(phase: &Phase, payload: &ActivityPayload, except: Option<i64>) -> bool {
        phase.activities.iter().any(|a| {
            a.id != except
                && a.activity_type == payload.phase_activity.activity_type
                && a.activity_id == payload.phase_activity.activity_id
        })
    }

    fn seed_demo_data(&self) {
        let kickoff = self.insert_phase(Phase {
            id: None,
            fields: PhaseFields {
                name: "Kickoff".into(),
                description: Some("Orientation and paperwork".into()),
                requires_approval: false,
                conditional_action: ConditionalAction::Unlock,
                conditional_status: ConditionalStatus::All,
            },
            order: 1,
            conditions: vec![PhaseCondition {
                id: None,
                conditional_phase_id: Some(PhaseRef::EventStart),
                condition: Some(ConditionKind::SevenBefore),
                operator: Some(ConditionOperator::GreaterThan),
            }],
            activities: vec![
                PhaseActivity {
                    id: None,
                    fields: ActivityFields {
                        display_name: "Welcome module".into(),
                        required: true,
                        ..ActivityFields::default()
                    },
                    activity_type: "module".into(),
                    activity_id: 1,
                    order: 1,
                    conditions: Vec::new(),
                },
                PhaseActivity {
                    id: None,
                    fields: ActivityFields {
                        display_name: "Intake survey".into(),
                        ..ActivityFields::default()
                    },
                    activity_type: "survey".into(),
                    activity_id: 3,
                    order: 2,
                    conditions: Vec::new(),
                },
            ],
        });
        self.insert_phase(Phase {
            id: None,
            fields: PhaseFields {
                name: "Wrap-up".into(),
                description: None,
                requires_approval: true,
                conditional_action: ConditionalAction::Lock,
                conditional_status: ConditionalStatus::Any,
            },
            order: 2,
            conditions: vec![PhaseCondition {
                id: None,
                conditional_phase_id: Some(PhaseRef::Phase(kickoff)),
                condition: Some(ConditionKind::Complete),
                operator: Some(ConditionOperator::IsNot),
            }],
            activities: Vec::new(),
        });
    }
}

#[async_trait]
impl PersistenceClient for MemoryBackend {
    async fn list_phases(&self) -> BuilderResult<Vec<Phase>> {
        self.enter::<()>(Method::Get, routes::phases(), None).await?;
        Ok(self.snapshot())
    }

    async fn create_phase(&self, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
        self.enter(Method::Post, routes::phases(), Some(payload)).await?;
        let id = self.allocate();
        let conditions = self.store_phase_conditions(&payload.phase_conditions);
        let attrs = &payload.phase;
        let phase = Phase {
            id: Some(id),
            fields: PhaseFields {
                name: attrs.name.clone(),
                description: attrs.description.clone(),
                requires_approval: attrs.requires_approval,
                conditional_action: attrs.conditional_action,
                conditional_status: attrs.conditional_status,
            },
            order: attrs.order,
            conditions,
            activities: Vec::new(),
        };
        let saved = saved_phase(&phase, id);
        self.phases.insert(id, phase);
        Ok(saved)
    }

    async fn update_phase(&self, phase_id: i64, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
        let path = routes::phase(phase_id);
        self.enter(Method::Put, path.clone(), Some(payload)).await?;
        let conditions = self.store_phase_conditions(&payload.phase_conditions);
        let mut entry = self.phases.get_mut(&phase_id).ok_or_else(|| Self::not_found(&path))?;
        let phase = entry.value_mut();
        let attrs = &payload.phase;
        phase.fields = PhaseFields {
            name: attrs.name.clone(),
            description: attrs.description.clone(),
            requires_approval: attrs.requires_approval,
            conditional_action: attrs.conditional_action,
            conditional_status: attrs.conditional_status,
        };
        phase.order = attrs.order;
        phase.conditions = conditions;
        Ok(saved_phase(phase, phase_id))
    }

    async fn delete_phase(&self, phase_id: i64) -> BuilderResult<()> {
        self.enter::<()>(Method::Delete, routes::phase(phase_id), None).await?;
        self.phases.remove(&phase_id);
        Ok(())
    }

    async fn delete_phase_condition(&self, phase_id: i64, condition_id: i64) -> BuilderResult<()> {
        self.enter::<()>(
            Method::Delete,
            routes::phase_condition(phase_id, condition_id),
            None,
        )
        .await?;
        if let Some(mut phase) = self.phases.get_mut(&phase_id) {
            phase.conditions.retain(|c| c.id != Some(condition_id));
        }
        Ok(())
    }

    async fn create_activity(&self, phase_id: i64, payload: &ActivityPayload) -> BuilderResult<SavedRecord> {
        let path = routes::phase_activities(phase_id);
        self.enter(Method::Post, path.clone(), Some(payload)).await?;
        let mut phase = self.phases.get_mut(&phase_id).ok_or_else(|| Self::not_found(&path))?;
        if Self::duplicate_in(&phase, payload, None) {
            return Err(BuilderError::Rejected {
                status: 422,
                message: "Activity has already been taken".into(),
            });
        }
        let id = self.allocate();
        let activity = self.activity_from_payload(id, payload);
        let saved = saved_activity(&activity, id);
        phase.activities.push(activity);
        Ok(saved)
    }

    async fn update_activity(
        &self,
        phase_id: i64,
        activity_id: i64,
        payload: &ActivityPayload,
    ) -> BuilderResult<SavedRecord> {
        let path = routes::phase_activity(phase_id, activity_id);
        self.enter(Method::Put, path.clone(), Some(payload)).await?;
        {
            let target = self.phases.get(&phase_id).ok_or_else(|| Self::not_found(&path))?;
            if Self::duplicate_in(&target, payload, Some(activity_id)) {
                return Err(BuilderError::Rejected {
                    status: 422,
                    message: "Activity has already been taken".into(),
                });
            }
        }

        // An activity dragged into another phase is re-parented on update.
        let mut found = false;
        for mut phase in self.phases.iter_mut() {
            if *phase.key() == phase_id {
                continue;
            }
            let before = phase.activities.len();
            phase.activities.retain(|a| a.id != Some(activity_id));
            found |= phase.activities.len() != before;
        }

        let activity = self.activity_from_payload(activity_id, payload);
        let saved = saved_activity(&activity, activity_id);
        let mut phase = self.phases.get_mut(&phase_id).ok_or_else(|| Self::not_found(&path))?;
        match phase.activities.iter_mut().find(|a| a.id == Some(activity_id)) {
            Some(existing) => *existing = activity,
            None if found => phase.activities.push(activity),
            None => return Err(Self::not_found(&path)),
        }
        Ok(saved)
    }

    async fn delete_activity(&self, phase_id: i64, activity_id: i64) -> BuilderResult<()> {
        self.enter::<()>(
            Method::Delete,
            routes::phase_activity(phase_id, activity_id),
            None,
        )
        .await?;
        if let Some(mut phase) = self.phases.get_mut(&phase_id) {
            phase.activities.retain(|a| a.id != Some(activity_id));
        }
        Ok(())
    }

    async fn delete_activity_condition(
        &self,
        phase_id: i64,
        activity_id: i64,
        condition_id: i64,
    ) -> BuilderResult<()> {
        self.enter::<()>(
            Method::Delete,
            routes::phase_activity_condition(phase_id, activity_id, condition_id),
            None,
        )
        .await?;
        if let Some(mut phase) = self.phases.get_mut(&phase_id) {
            if let Some(activity) = phase.activities.iter_mut().find(|a| a.id == Some(activity_id)) {
                activity.conditions.retain(|c| c.id != Some(condition_id));
            }
        }
        Ok(())
    }
}

fn saved_phase(phase: &Phase, id: i64) -> SavedRecord {
    SavedRecord {
        id,
        conditions: phase
            .conditions
            .iter()
            .filter_map(|c| c.id)
            .map(|id| SavedCondition { id })
            .collect(),
    }
}

fn saved_activity(activity: &PhaseActivity, id: i64) -> SavedRecord {
    SavedRecord {
        id,
        conditions: activity
            .conditions
            .iter()
            .filter_map(|c| c.id)
            .map(|id| SavedCondition { id })
            .collect(),
    }
}
