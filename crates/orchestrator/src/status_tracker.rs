//! Live per-step status records and their event stream
//!
//! Every transition mutates the record under the lock, then publishes an
//! [`AgentStatusEvent`] on the bus after the lock is released. Retrying and
//! terminal failures are also written to the error log when a store is
//! configured; a failed write is logged and never interrupts execution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use db::{CreateErrorRecord, ErrorRecordRepository, ErrorResolution};
use events::{AgentStatusEvent, Event, EventBus, EventEnvelope, Transition};
use forge_core::{AgentStatus, AgentStatusRecord, ErrorClassification, PlanStep};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::state_machine::StepStateMachine;

struct Tracked {
    record: AgentStatusRecord,
    critical: bool,
}

#[derive(Default)]
struct TrackerInner {
    records: HashMap<Uuid, Tracked>,
    by_step: HashMap<(Uuid, String), Uuid>,
}

/// Optional fields carried by one published transition.
#[derive(Default)]
struct Detail {
    delay_ms: Option<u64>,
    recovered: bool,
}

#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<RwLock<TrackerInner>>,
    bus: EventBus,
    error_store: Option<ErrorRecordRepository>,
}

impl StatusTracker {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TrackerInner::default())),
            bus,
            error_store: None,
        }
    }

    pub fn with_error_store(mut self, store: ErrorRecordRepository) -> Self {
        self.error_store = Some(store);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Dispatch a step: create its record (or reuse a reset one) and move it
    /// to `in_progress`.
    pub fn start(&self, session_id: Uuid, step: &PlanStep, max_retries: u32) -> Result<Uuid> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let key = (session_id, step.id.clone());
            let existing = inner.by_step.get(&key).copied();
            let status_id = match existing {
                Some(id) => id,
                None => {
                    let mut record =
                        AgentStatusRecord::new(session_id, &step.id, step.agent_type, &step.action);
                    record.max_retries = max_retries;
                    let status_id = record.status_id;
                    inner.by_step.insert(key, status_id);
                    inner.records.insert(
                        status_id,
                        Tracked {
                            record,
                            critical: step.critical,
                        },
                    );
                    status_id
                }
            };

            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::InProgress)?;
            tracked.record.start_time = Utc::now();
            tracked.record.end_time = None;
            tracked.record.current_operation = Some(step.action.clone());
            build_event(tracked, Transition::Started, Detail::default())
        };

        let status_id = event.status_id;
        self.publish(event);
        Ok(status_id)
    }

    /// Progress reported by the agent while an attempt is running. Ignored
    /// unless the step is `in_progress`.
    pub fn progress(
        &self,
        status_id: Uuid,
        percentage: u8,
        operation: Option<String>,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            if tracked.record.status != AgentStatus::InProgress {
                return Ok(());
            }
            tracked.record.set_progress(percentage);
            if operation.is_some() {
                tracked.record.current_operation = operation;
            }
            tracked.record.updated_at = Utc::now();
            build_event(tracked, Transition::Progress, Detail::default())
        };

        self.publish(event);
        Ok(())
    }

    /// A failed attempt will be retried after `delay_ms`.
    pub async fn retrying(
        &self,
        status_id: Uuid,
        error: &str,
        classification: &ErrorClassification,
        retry_count: u32,
        max_retries: u32,
        delay_ms: u64,
    ) -> Result<()> {
        let (event, record) = {
            let mut inner = self.inner.write().unwrap();
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::Retrying)?;
            tracked.record.retry_count = retry_count;
            tracked.record.max_retries = max_retries;
            tracked.record.error_message = Some(error.to_string());
            tracked.record.classification = Some(classification.clone());
            let detail = Detail {
                delay_ms: Some(delay_ms),
                ..Default::default()
            };
            let event = build_event(tracked, Transition::Retrying, detail);
            (event, error_record(tracked, ErrorResolution::Retrying))
        };

        self.publish(event);
        self.persist(record).await;
        Ok(())
    }

    /// The backoff elapsed, the next attempt begins.
    pub fn resume(&self, status_id: Uuid) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::InProgress)?;
            build_event(tracked, Transition::Started, Detail::default())
        };

        self.publish(event);
        Ok(())
    }

    pub fn complete(&self, status_id: Uuid, summary: Option<String>) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::Completed)?;
            tracked.record.progress_percentage = 100;
            tracked.record.result_summary = summary;
            tracked.record.current_operation = None;
            tracked.record.end_time = Some(Utc::now());
            let detail = Detail {
                recovered: tracked.record.retry_count > 0,
                ..Default::default()
            };
            build_event(tracked, Transition::Completed, detail)
        };

        self.publish(event);
        Ok(())
    }

    /// Terminal failure for the automatic loop.
    pub async fn fail(
        &self,
        status_id: Uuid,
        error: &str,
        classification: &ErrorClassification,
    ) -> Result<()> {
        let (event, record) = {
            let mut inner = self.inner.write().unwrap();
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::Failed)?;
            tracked.record.error_message = Some(error.to_string());
            tracked.record.classification = Some(classification.clone());
            tracked.record.current_operation = None;
            tracked.record.end_time = Some(Utc::now());
            let event = build_event(tracked, Transition::Failed, Detail::default());
            (event, error_record(tracked, ErrorResolution::Unresolved))
        };

        self.publish(event);
        self.persist(record).await;
        Ok(())
    }

    /// Record a step that will never be dispatched in this run.
    pub fn skip(&self, session_id: Uuid, step: &PlanStep) -> Result<Uuid> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let key = (session_id, step.id.clone());
            let existing = inner.by_step.get(&key).copied();
            let status_id = match existing {
                Some(id) => id,
                None => {
                    let record =
                        AgentStatusRecord::new(session_id, &step.id, step.agent_type, &step.action);
                    let status_id = record.status_id;
                    inner.by_step.insert(key, status_id);
                    inner.records.insert(
                        status_id,
                        Tracked {
                            record,
                            critical: step.critical,
                        },
                    );
                    status_id
                }
            };
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::Skipped)?;
            tracked.record.end_time = Some(Utc::now());
            build_event(tracked, Transition::Skipped, Detail::default())
        };

        let status_id = event.status_id;
        self.publish(event);
        Ok(status_id)
    }

    /// Manual re-submission: a failed step goes back to `pending` with a
    /// fresh retry budget.
    pub fn reset(&self, session_id: Uuid, step_id: &str) -> Result<Uuid> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let status_id = *inner
                .by_step
                .get(&(session_id, step_id.to_string()))
                .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
            let tracked = inner
                .records
                .get_mut(&status_id)
                .ok_or(OrchestratorError::StatusNotFound(status_id))?;
            apply(tracked, AgentStatus::Pending)?;
            tracked.record.retry_count = 0;
            tracked.record.progress_percentage = 0;
            tracked.record.error_message = None;
            tracked.record.classification = None;
            tracked.record.end_time = None;
            build_event(tracked, Transition::Reset, Detail::default())
        };

        let status_id = event.status_id;
        self.publish(event);
        Ok(status_id)
    }

    pub fn get(&self, status_id: Uuid) -> Option<AgentStatusRecord> {
        let inner = self.inner.read().unwrap();
        inner.records.get(&status_id).map(|t| t.record.clone())
    }

    pub fn find(&self, session_id: Uuid, step_id: &str) -> Option<AgentStatusRecord> {
        let inner = self.inner.read().unwrap();
        inner
            .by_step
            .get(&(session_id, step_id.to_string()))
            .and_then(|id| inner.records.get(id))
            .map(|t| t.record.clone())
    }

    /// Records of one session, oldest dispatch first.
    pub fn records(&self, session_id: Uuid) -> Vec<AgentStatusRecord> {
        let inner = self.inner.read().unwrap();
        let mut records: Vec<AgentStatusRecord> = inner
            .records
            .values()
            .filter(|t| t.record.session_id == session_id)
            .map(|t| t.record.clone())
            .collect();
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.step_id.cmp(&b.step_id)));
        records
    }

    pub fn remove_session(&self, session_id: Uuid) -> usize {
        let mut inner = self.inner.write().unwrap();
        let before = inner.records.len();
        inner.records.retain(|_, t| t.record.session_id != session_id);
        inner.by_step.retain(|(session, _), _| *session != session_id);
        before - inner.records.len()
    }

    fn publish(&self, event: AgentStatusEvent) {
        debug!(
            session_id = %event.session_id,
            step_id = %event.step_id,
            transition = event.transition.as_str(),
            "Step transition"
        );
        self.bus
            .publish(EventEnvelope::new(Event::AgentStatus(event)));
    }

    async fn persist(&self, record: CreateErrorRecord) {
        let Some(ref store) = self.error_store else {
            return;
        };
        if let Err(e) = store.create(&record).await {
            warn!(
                session_id = %record.session_id,
                step_id = %record.step_id,
                "Failed to persist error record: {:?}",
                e
            );
        }
    }
}

fn apply(tracked: &mut Tracked, to: AgentStatus) -> Result<()> {
    StepStateMachine::validate_transition(&tracked.record.status, &to)?;
    tracked.record.status = to;
    tracked.record.updated_at = Utc::now();
    Ok(())
}

fn build_event(tracked: &Tracked, transition: Transition, detail: Detail) -> AgentStatusEvent {
    let record = &tracked.record;
    AgentStatusEvent {
        session_id: record.session_id,
        status_id: record.status_id,
        step_id: record.step_id.clone(),
        agent_type: record.agent_type,
        transition,
        status: record.status,
        progress: Some(record.progress_percentage),
        current_operation: record.current_operation.clone(),
        error: record.error_message.clone(),
        classification: record.classification.clone(),
        retry_count: record.retry_count,
        max_retries: record.max_retries,
        retrying: transition == Transition::Retrying,
        delay_ms: detail.delay_ms,
        critical: tracked.critical,
        recovered: detail.recovered,
        timestamp: record.updated_at,
    }
}

fn error_record(tracked: &Tracked, resolution: ErrorResolution) -> CreateErrorRecord {
    let record = &tracked.record;
    let classification = record
        .classification
        .clone()
        .unwrap_or_else(ErrorClassification::classifier_failure);
    CreateErrorRecord::new(
        record.session_id,
        &record.step_id,
        record.agent_type,
        record.error_message.clone().unwrap_or_default(),
        classification,
    )
    .with_context(json!({
        "action": record.task_description,
        "critical": tracked.critical,
        "max_retries": record.max_retries,
    }))
    .with_retry_count(record.retry_count)
    .with_resolution(resolution)
}
