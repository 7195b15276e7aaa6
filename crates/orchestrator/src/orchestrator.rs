//! Composition root: request intake, plan runs and their lifecycle
//!
//! A request is decomposed and its plan validated before anything is
//! published. An accepted plan runs as one scheduling loop that dispatches
//! ready steps onto a task set and reacts to each finished step. Cancellation
//! stops dispatch and detaches in-flight steps; their results are discarded.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use db::{BuildSession, BuildSessionRepository, BuildSessionStatus, ErrorRecordRepository};
use events::{Event, EventBus, EventEnvelope};
use forge_core::{
    AgentStatusRecord, BuildRequest, PlanResult, PlanStatus, PlanStep, StepOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentRegistry, AgentStatusSnapshot};
use crate::classifier::{ErrorClassifier, FailureClassifier};
use crate::config::OrchestratorConfig;
use crate::decomposer::RequirementDecomposer;
use crate::error::{OrchestratorError, Result};
use crate::executor::AgentExecutor;
use crate::generation::{BoundedGenerator, GenerationService};
use crate::graph::DependencyGraph;
use crate::scheduler::TaskScheduler;
use crate::status_tracker::StatusTracker;

/// Returned once a request's plan has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Submission {
    pub request_id: Uuid,
    pub session_id: Uuid,
    pub steps: Vec<PlanStep>,
    /// The deterministic fallback plan replaced a failed decomposition.
    pub fallback: bool,
}

struct ActivePlan {
    request: Arc<BuildRequest>,
    cancel: watch::Sender<bool>,
}

struct FinishedRun {
    request: Arc<BuildRequest>,
    steps: Arc<Vec<PlanStep>>,
    result: PlanResult,
}

/// Finished runs, oldest evicted first.
struct ResultHistory {
    capacity: usize,
    order: VecDeque<Uuid>,
    runs: HashMap<Uuid, FinishedRun>,
}

impl ResultHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            runs: HashMap::new(),
        }
    }

    /// Store a run and return the requests evicted to make room.
    fn insert(&mut self, run: FinishedRun) -> Vec<Arc<BuildRequest>> {
        let request_id = run.request.request_id;
        if self.runs.insert(request_id, run).is_none() {
            self.order.push_back(request_id);
        }

        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(run) = self.runs.remove(&oldest) {
                    evicted.push(run.request);
                }
            }
        }
        evicted
    }
}

/// A validated plan ready to run.
struct Accepted {
    request: Arc<BuildRequest>,
    steps: Arc<Vec<PlanStep>>,
    graph: DependencyGraph,
    fallback: bool,
    cancel: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    decomposer: Arc<RequirementDecomposer>,
    registry: Arc<AgentRegistry>,
    classifier: Arc<dyn FailureClassifier>,
    tracker: StatusTracker,
    executor: AgentExecutor,
    bus: EventBus,
    active: Arc<RwLock<HashMap<Uuid, ActivePlan>>>,
    history: Arc<RwLock<ResultHistory>>,
    error_store: Option<ErrorRecordRepository>,
    session_store: Option<BuildSessionRepository>,
}

impl Orchestrator {
    /// `generator` is used for decomposition, bounded by the configured
    /// generation timeout. Agents bring their own generation handle.
    pub fn new(
        config: OrchestratorConfig,
        generator: Arc<dyn GenerationService>,
        agents: AgentRegistry,
        bus: EventBus,
    ) -> Self {
        let bounded: Arc<dyn GenerationService> = Arc::new(BoundedGenerator::new(
            generator,
            config.generation.timeout_ms,
        ));
        let decomposer = Arc::new(RequirementDecomposer::new(bounded, &config.generation));
        let registry = Arc::new(agents);
        let classifier: Arc<dyn FailureClassifier> = Arc::new(ErrorClassifier::new());
        let tracker = StatusTracker::new(bus.clone());
        let executor = AgentExecutor::new(
            registry.clone(),
            classifier.clone(),
            tracker.clone(),
            config.retry.clone(),
        );
        let history = ResultHistory::new(config.result_history);

        Self {
            config,
            decomposer,
            registry,
            classifier,
            tracker,
            executor,
            bus,
            active: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(history)),
            error_store: None,
            session_store: None,
        }
    }

    /// The five built-in agents, all backed by `generator` under the
    /// configured timeout.
    pub fn with_builtin_agents(
        config: OrchestratorConfig,
        generator: Arc<dyn GenerationService>,
        bus: EventBus,
    ) -> Self {
        let bounded: Arc<dyn GenerationService> = Arc::new(BoundedGenerator::new(
            generator.clone(),
            config.generation.timeout_ms,
        ));
        let agents = AgentRegistry::builtin(bounded);
        Self::new(config, generator, agents, bus)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self.rebuild_executor();
        self
    }

    pub fn with_error_store(mut self, store: ErrorRecordRepository) -> Self {
        self.tracker = self.tracker.with_error_store(store.clone());
        self.error_store = Some(store);
        self.rebuild_executor();
        self
    }

    pub fn with_session_store(mut self, store: BuildSessionRepository) -> Self {
        self.session_store = Some(store);
        self
    }

    fn rebuild_executor(&mut self) {
        self.executor = AgentExecutor::new(
            self.registry.clone(),
            self.classifier.clone(),
            self.tracker.clone(),
            self.config.retry.clone(),
        );
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Decompose and validate, then run the plan in the background.
    pub async fn submit_request(&self, request: BuildRequest) -> Result<Submission> {
        let accepted = self.accept(request).await?;
        let submission = Submission {
            request_id: accepted.request.request_id,
            session_id: accepted.request.session_id(),
            steps: accepted.steps.as_ref().clone(),
            fallback: accepted.fallback,
        };

        let this = self.clone();
        tokio::spawn(async move {
            this.run(accepted).await;
        });
        Ok(submission)
    }

    /// Decompose, validate and run the plan to completion.
    pub async fn process_request(&self, request: BuildRequest) -> Result<PlanResult> {
        let accepted = self.accept(request).await?;
        Ok(self.run(accepted).await)
    }

    async fn accept(&self, request: BuildRequest) -> Result<Accepted> {
        let request_id = request.request_id;
        if self.is_active(request_id) {
            return Err(OrchestratorError::RequestAlreadyActive(request_id));
        }

        info!(
            request_id = %request_id,
            request_type = %request.request_type,
            "Processing build request"
        );
        let decomposition = self.decomposer.decompose(&request).await;
        let graph = match DependencyGraph::build(&decomposition.steps) {
            Ok(graph) => graph,
            Err(e) => {
                error!(request_id = %request_id, "Plan rejected: {}", e);
                let session_id = request.session_id();
                self.bus.publish(EventEnvelope::new(Event::Error {
                    session_id: Some(session_id),
                    message: e.to_string(),
                    context: Some("plan_rejected".to_string()),
                }));
                self.bus.close_session(session_id);
                return Err(e);
            }
        };

        let request = Arc::new(request);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut active = self.active.write().unwrap();
            if active.contains_key(&request_id) {
                return Err(OrchestratorError::RequestAlreadyActive(request_id));
            }
            active.insert(
                request_id,
                ActivePlan {
                    request: request.clone(),
                    cancel: cancel_tx,
                },
            );
        }

        let session_id = request.session_id();
        let steps = Arc::new(decomposition.steps);
        self.bus.open_session(session_id);
        self.bus.publish(EventEnvelope::new(Event::PlanAccepted {
            session_id,
            request_id,
            request_type: request.request_type,
            total_steps: steps.len(),
            fallback: decomposition.fallback,
        }));

        if let Some(store) = &self.session_store {
            let session = BuildSession::from_request(&request, steps.len(), decomposition.fallback);
            if let Err(e) = store.create(&session).await {
                warn!(session_id = %session_id, "Failed to persist build session: {:?}", e);
            }
        }

        Ok(Accepted {
            request,
            steps,
            graph,
            fallback: decomposition.fallback,
            cancel: cancel_rx,
        })
    }

    async fn run(&self, accepted: Accepted) -> PlanResult {
        let Accepted {
            request,
            steps,
            graph,
            mut cancel,
            ..
        } = accepted;
        let request_id = request.request_id;
        let session_id = request.session_id();

        let mut scheduler = TaskScheduler::new(&steps, graph, self.config.concurrency.clone());
        let mut outcomes: BTreeMap<String, StepOutcome> = BTreeMap::new();
        let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }

            for step in scheduler.next_ready() {
                let inputs = dependency_inputs(&step, &outcomes);
                let executor = self.executor.clone();
                let request = request.clone();
                in_flight.spawn(async move { executor.execute(request, &step, inputs).await });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        if outcome.is_completed() {
                            scheduler.record_completed(&outcome.step_id);
                        } else if scheduler.record_failed(&outcome.step_id) {
                            warn!(
                                request_id = %request_id,
                                step_id = %outcome.step_id,
                                "Critical step failed, no further steps will be dispatched"
                            );
                        }
                        outcomes.insert(outcome.step_id.clone(), outcome);
                    }
                    Some(Err(e)) => {
                        error!(request_id = %request_id, "Step task ended abnormally: {}", e);
                        self.bus.publish(EventEnvelope::new(Event::Error {
                            session_id: Some(session_id),
                            message: e.to_string(),
                            context: Some("step_task".to_string()),
                        }));
                    }
                    None => break,
                },
                _ = cancel.changed() => {
                    cancelled = true;
                    break;
                }
            }
        }

        let cancelled = self.conclude(request_id, cancelled);
        if cancelled {
            info!(
                request_id = %request_id,
                in_flight = in_flight.len(),
                "Plan cancelled, detaching in-flight steps"
            );
            in_flight.detach_all();
        }

        for step in scheduler.undispatched() {
            if let Err(e) = self.tracker.skip(session_id, &step) {
                warn!(step_id = %step.id, "Could not mark step skipped: {}", e);
            }
        }

        let (status, error) = plan_status(&steps, &outcomes, cancelled, scheduler.halted_by());
        let result = PlanResult::consolidate(request_id, status, &steps, outcomes, error);
        self.finish(request.clone(), steps, result.clone()).await;
        result
    }

    /// Deregister a plan whose loop has exited. Returns whether the run ends
    /// cancelled: a cancel that deregistered the plan first wins, even after
    /// the last step finished.
    fn conclude(&self, request_id: Uuid, cancelled: bool) -> bool {
        let deregistered = self.active.write().unwrap().remove(&request_id).is_some();
        cancelled || !deregistered
    }

    async fn finish(&self, request: Arc<BuildRequest>, steps: Arc<Vec<PlanStep>>, result: PlanResult) {
        let request_id = request.request_id;
        let session_id = request.session_id();
        info!(
            request_id = %request_id,
            status = %result.status,
            completed_steps = result.completed_steps,
            total_steps = result.total_steps,
            "Plan finished"
        );

        self.bus.publish(EventEnvelope::new(Event::PlanFinished {
            session_id,
            request_id,
            status: result.status,
            completed_steps: result.completed_steps,
            total_steps: result.total_steps,
        }));
        self.record_session_end(&result).await;

        let evicted = {
            let mut history = self.history.write().unwrap();
            history.insert(FinishedRun {
                request,
                steps,
                result,
            })
        };
        for old in evicted {
            self.tracker.remove_session(old.session_id());
            self.bus.close_session(old.session_id());
        }
        self.bus.close_session(session_id);
    }

    async fn record_session_end(&self, result: &PlanResult) {
        let Some(store) = &self.session_store else {
            return;
        };
        let status = match result.status {
            PlanStatus::Completed => BuildSessionStatus::Success,
            PlanStatus::Failed => BuildSessionStatus::Failed,
            PlanStatus::Cancelled => BuildSessionStatus::Cancelled,
        };
        if let Err(e) = store
            .finish(
                result.request_id,
                status,
                result.completed_steps,
                result.error.as_deref(),
            )
            .await
        {
            warn!(request_id = %result.request_id, "Failed to update build session: {:?}", e);
        }
    }

    fn is_active(&self, request_id: Uuid) -> bool {
        self.active.read().unwrap().contains_key(&request_id)
    }

    pub fn get_active_requests(&self) -> Vec<BuildRequest> {
        let active = self.active.read().unwrap();
        let mut requests: Vec<BuildRequest> =
            active.values().map(|p| p.request.as_ref().clone()).collect();
        requests.sort_by_key(|r| r.submitted_at);
        requests
    }

    /// Stop dispatching for an active plan. Steps already running are left
    /// to finish and their results are discarded.
    pub fn cancel_request(&self, request_id: Uuid) -> bool {
        let plan = self.active.write().unwrap().remove(&request_id);
        let Some(plan) = plan else {
            return false;
        };

        // the run loop may already be finishing; a closed receiver is fine
        let _ = plan.cancel.send(true);
        info!(request_id = %request_id, "Request cancelled");
        self.bus.publish(EventEnvelope::new(Event::PlanCancelled {
            session_id: plan.request.session_id(),
            request_id,
        }));
        true
    }

    pub fn get_agent_status(&self) -> AgentStatusSnapshot {
        let active_requests = self.active.read().unwrap().len();
        self.registry
            .snapshot(&self.config.concurrency, active_requests)
    }

    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe_session(session_id)
    }

    pub fn get_result(&self, request_id: Uuid) -> Option<PlanResult> {
        let history = self.history.read().unwrap();
        history.runs.get(&request_id).map(|run| run.result.clone())
    }

    pub fn status_records(&self, session_id: Uuid) -> Vec<AgentStatusRecord> {
        self.tracker.records(session_id)
    }

    /// Re-run one failed step of a finished plan with a fresh retry budget.
    /// Its dependencies must have completed in that run.
    pub async fn retry_step(&self, request_id: Uuid, step_id: &str) -> Result<StepOutcome> {
        if self.is_active(request_id) {
            return Err(OrchestratorError::RequestAlreadyActive(request_id));
        }

        let (request, step, inputs) = {
            let history = self.history.read().unwrap();
            let run = history
                .runs
                .get(&request_id)
                .ok_or(OrchestratorError::RequestNotFound(request_id))?;
            let step = run
                .steps
                .iter()
                .find(|s| s.id == step_id)
                .cloned()
                .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
            let outcome = run
                .result
                .outcome(step_id)
                .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
            if !outcome.is_failed() {
                return Err(OrchestratorError::not_retryable(
                    step_id,
                    format!("status is {}", outcome.status),
                ));
            }
            if let Some(dep) = step
                .dependencies
                .iter()
                .find(|d| !run.result.outcome(d).is_some_and(|o| o.is_completed()))
            {
                return Err(OrchestratorError::not_retryable(
                    step_id,
                    format!("dependency {} has not completed", dep),
                ));
            }
            let completed: BTreeMap<String, StepOutcome> = run
                .result
                .steps
                .iter()
                .map(|o| (o.step_id.clone(), o.clone()))
                .collect();
            (run.request.clone(), step.clone(), dependency_inputs(&step, &completed))
        };

        let session_id = request.session_id();
        self.tracker.reset(session_id, step_id)?;
        info!(request_id = %request_id, step_id = %step_id, "Retrying step manually");

        self.bus.open_session(session_id);
        let outcome = self.executor.execute(request, &step, inputs).await;
        self.bus.close_session(session_id);

        if outcome.is_completed() {
            if let Some(store) = &self.error_store {
                if let Err(e) = store.resolve_step(session_id, step_id).await {
                    warn!(step_id = %step_id, "Failed to resolve error records: {:?}", e);
                }
            }
        }

        let updated = {
            let mut history = self.history.write().unwrap();
            history.runs.get_mut(&request_id).map(|run| {
                let cancelled = run.result.status == PlanStatus::Cancelled;
                let mut outcomes: BTreeMap<String, StepOutcome> = run
                    .result
                    .steps
                    .drain(..)
                    .map(|o| (o.step_id.clone(), o))
                    .collect();
                outcomes.insert(step_id.to_string(), outcome.clone());
                let (status, error) = plan_status(&run.steps, &outcomes, cancelled, None);
                run.result =
                    PlanResult::consolidate(request_id, status, &run.steps, outcomes, error);
                run.result.clone()
            })
        };
        if let Some(result) = updated {
            self.record_session_end(&result).await;
        }

        Ok(outcome)
    }
}

fn dependency_inputs(
    step: &PlanStep,
    outcomes: &BTreeMap<String, StepOutcome>,
) -> BTreeMap<String, Value> {
    step.dependencies
        .iter()
        .filter_map(|dep| {
            let output = outcomes.get(dep)?.output.clone()?;
            Some((dep.clone(), output))
        })
        .collect()
}

/// A plan completes only when every critical step completed.
fn plan_status(
    steps: &[PlanStep],
    outcomes: &BTreeMap<String, StepOutcome>,
    cancelled: bool,
    halted_by: Option<&str>,
) -> (PlanStatus, Option<String>) {
    if cancelled {
        return (PlanStatus::Cancelled, Some("Request cancelled".to_string()));
    }

    if let Some(step_id) = halted_by {
        let reason = outcomes
            .get(step_id)
            .and_then(|o| o.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        return (
            PlanStatus::Failed,
            Some(format!("Critical step {} failed: {}", step_id, reason)),
        );
    }

    let incomplete = steps.iter().find(|s| {
        s.critical && !outcomes.get(&s.id).is_some_and(|o| o.is_completed())
    });
    match incomplete {
        Some(step) => {
            let reason = outcomes
                .get(&step.id)
                .and_then(|o| o.error.clone())
                .map(|e| format!("Critical step {} failed: {}", step.id, e))
                .unwrap_or_else(|| format!("Critical step {} was not completed", step.id));
            (PlanStatus::Failed, Some(reason))
        }
        None => (PlanStatus::Completed, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerateOptions, GenerationError};
    use async_trait::async_trait;
    use forge_core::{AgentStatus, AgentType, RequestType};

    struct Unused;

    #[async_trait]
    impl GenerationService for Unused {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> std::result::Result<String, GenerationError> {
            Ok("[]".to_string())
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(Unused),
            AgentRegistry::new(),
            EventBus::new(),
        )
    }

    fn register(orch: &Orchestrator) -> (Uuid, watch::Receiver<bool>) {
        let request = Arc::new(BuildRequest::new("u", "p", RequestType::DeployApp, "d"));
        let (cancel, cancel_rx) = watch::channel(false);
        orch.active.write().unwrap().insert(
            request.request_id,
            ActivePlan {
                request: request.clone(),
                cancel,
            },
        );
        (request.request_id, cancel_rx)
    }

    fn outcome(id: &str, status: AgentStatus) -> StepOutcome {
        let mut outcome = StepOutcome::skipped(&PlanStep::new(id, AgentType::Ui, "x"));
        outcome.status = status;
        if status == AgentStatus::Failed {
            outcome.error = Some("boom".to_string());
        }
        outcome
    }

    #[test]
    fn test_plan_status_requires_critical_steps() {
        let steps = vec![
            PlanStep::new("a", AgentType::Ui, "x").critical(),
            PlanStep::new("b", AgentType::Ui, "y"),
        ];
        let mut outcomes = BTreeMap::new();
        outcomes.insert("a".to_string(), outcome("a", AgentStatus::Completed));
        outcomes.insert("b".to_string(), outcome("b", AgentStatus::Failed));

        let (status, error) = plan_status(&steps, &outcomes, false, None);
        assert_eq!(status, PlanStatus::Completed);
        assert!(error.is_none());

        outcomes.insert("a".to_string(), outcome("a", AgentStatus::Failed));
        let (status, error) = plan_status(&steps, &outcomes, false, Some("a"));
        assert_eq!(status, PlanStatus::Failed);
        assert_eq!(error.as_deref(), Some("Critical step a failed: boom"));

        let (status, _) = plan_status(&steps, &outcomes, true, Some("a"));
        assert_eq!(status, PlanStatus::Cancelled);
    }

    #[test]
    fn test_critical_step_never_run_fails_plan() {
        let steps = vec![
            PlanStep::new("a", AgentType::Ui, "x"),
            PlanStep::new("b", AgentType::Ui, "y").depends_on("a").critical(),
        ];
        let mut outcomes = BTreeMap::new();
        outcomes.insert("a".to_string(), outcome("a", AgentStatus::Failed));

        let (status, error) = plan_status(&steps, &outcomes, false, None);
        assert_eq!(status, PlanStatus::Failed);
        assert_eq!(error.as_deref(), Some("Critical step b was not completed"));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = ResultHistory::new(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let request = Arc::new(BuildRequest::new("u", "p", RequestType::DeployApp, "d"));
            ids.push(request.request_id);
            let steps = Arc::new(vec![PlanStep::new("a", AgentType::Deployment, "deploy")]);
            let result = PlanResult::consolidate(
                request.request_id,
                PlanStatus::Completed,
                &steps,
                BTreeMap::new(),
                None,
            );
            let evicted = history.insert(FinishedRun {
                request,
                steps,
                result,
            });
            if ids.len() == 3 {
                assert_eq!(evicted.len(), 1);
                assert_eq!(evicted[0].request_id, ids[0]);
            } else {
                assert!(evicted.is_empty());
            }
        }
        assert!(!history.runs.contains_key(&ids[0]));
        assert!(history.runs.contains_key(&ids[2]));
    }

    #[test]
    fn test_cancel_after_loop_exit_marks_run_cancelled() {
        let orch = orchestrator();
        let (request_id, cancel_rx) = register(&orch);

        assert!(orch.cancel_request(request_id));
        assert!(*cancel_rx.borrow());
        assert!(orch.conclude(request_id, false));
    }

    #[test]
    fn test_concluded_plan_cannot_be_cancelled() {
        let orch = orchestrator();
        let mut events = orch.bus().subscribe();
        let (request_id, _cancel_rx) = register(&orch);

        assert!(!orch.conclude(request_id, false));
        assert!(orch.get_active_requests().is_empty());
        assert!(!orch.cancel_request(request_id));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_dependency_inputs_only_carry_outputs() {
        let step = PlanStep::new("c", AgentType::Ui, "x")
            .depends_on("a")
            .depends_on("b");
        let mut outcomes = BTreeMap::new();
        let mut a = outcome("a", AgentStatus::Completed);
        a.output = Some(serde_json::json!({"ok": true}));
        outcomes.insert("a".to_string(), a);
        outcomes.insert("b".to_string(), outcome("b", AgentStatus::Failed));

        let inputs = dependency_inputs(&step, &outcomes);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs["a"]["ok"], true);
    }
}
