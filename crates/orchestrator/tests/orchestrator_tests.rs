use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::{Event, EventBus, EventEnvelope, Transition};
use forge_core::{
    AgentStatus, AgentType, BuildRequest, ErrorCategory, ErrorClassification, ErrorSeverity,
    PlanStatus, RequestType, SuggestedAction,
};
use orchestrator::{
    Agent, AgentContext, AgentFailure, AgentOutput, AgentRegistry, ClassifierError,
    DeploymentAgent, FailureClassifier, GenerateOptions, GenerationError, GenerationService,
    Orchestrator, OrchestratorConfig, OrchestratorError,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;

struct ScriptedGenerator(String);

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, _: &str, _: &GenerateOptions) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
enum Behavior {
    Succeed,
    Fail(AgentFailure),
    FailTimes(u32, AgentFailure),
    /// Fail with each listed failure in turn, then succeed.
    FailWith(Vec<AgentFailure>),
    Delay(u64),
}

type Log = Arc<Mutex<Vec<String>>>;

struct ScriptedAgent {
    agent_type: AgentType,
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    log: Log,
}

impl ScriptedAgent {
    fn new(agent_type: AgentType, log: &Log) -> Self {
        Self {
            agent_type,
            behaviors: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            log: log.clone(),
        }
    }

    fn on(mut self, step_id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(step_id.to_string(), behavior);
        self
    }

    fn calls(&self, step_id: &str) -> u32 {
        self.calls.lock().unwrap().get(step_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn execute(
        &self,
        step: &forge_core::PlanStep,
        _: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(step.id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.log.lock().unwrap().push(format!("start:{}", step.id));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .get(&step.id)
            .cloned()
            .unwrap_or(Behavior::Succeed);
        let result = match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(failure) => Err(failure),
            Behavior::FailTimes(n, failure) if call <= n => Err(failure),
            Behavior::FailTimes(..) => Ok(()),
            Behavior::FailWith(failures) => match failures.get(call as usize - 1) {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            },
            Behavior::Delay(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result?;
        self.log.lock().unwrap().push(format!("end:{}", step.id));
        Ok(AgentOutput::new(json!({ "step": step.id })))
    }
}

fn orchestrator(plan: Value, agents: &[Arc<ScriptedAgent>], bus: &EventBus) -> Orchestrator {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        registry.register(agent.clone());
    }
    Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(ScriptedGenerator(plan.to_string())),
        registry,
        bus.clone(),
    )
}

fn request(request_type: RequestType) -> BuildRequest {
    BuildRequest::new("user-1", "shop", request_type, "An online shop")
}

fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}

fn retry_delays(events: &[Event], step_id: &str) -> Vec<u64> {
    events
        .iter()
        .filter_map(Event::as_status)
        .filter(|e| e.step_id == step_id && e.transition == Transition::Retrying)
        .filter_map(|e| e.delay_ms)
        .collect()
}

fn position(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|l| l == entry)
        .unwrap_or_else(|| panic!("{} not in log {:?}", entry, log))
}

#[tokio::test(start_paused = true)]
async fn network_failure_exhausts_retries_and_fails_plan() {
    let log = Log::default();
    let backend = Arc::new(ScriptedAgent::new(AgentType::Backend, &log).on(
        "a",
        Behavior::Fail(AgentFailure::new("connect ECONNREFUSED 10.0.0.7:5432")),
    ));
    let plan = json!([{"id": "a", "agentType": "backend", "action": "create_api", "critical": true}]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[backend.clone()], &bus);
    let request = request(RequestType::CreateApp);
    let mut rx = bus.subscribe_session(request.session_id());

    let result = orch.process_request(request).await.unwrap();

    assert_eq!(result.status, PlanStatus::Failed);
    let a = result.outcome("a").unwrap();
    assert_eq!(a.status, AgentStatus::Failed);
    assert_eq!(a.attempts, 4);
    assert_eq!(backend.calls("a"), 4);
    assert_eq!(a.classification.as_ref().unwrap().category, ErrorCategory::Network);

    let events = drain(&mut rx);
    assert_eq!(retry_delays(&events, "a"), vec![2000, 4000, 8000]);
    let last_status = events.iter().filter_map(Event::as_status).last().unwrap();
    assert_eq!(last_status.transition, Transition::Failed);
    assert_eq!(last_status.retry_count, 3);
    assert!(last_status.critical);
    assert!(matches!(
        events.last(),
        Some(Event::PlanFinished { status: PlanStatus::Failed, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn critical_validation_failure_skips_dependents_but_keeps_independent_output() {
    let log = Log::default();
    let backend = Arc::new(
        ScriptedAgent::new(AgentType::Backend, &log)
            .on("a", Behavior::Fail(AgentFailure::validation("name is required"))),
    );
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log));
    let database = Arc::new(ScriptedAgent::new(AgentType::Database, &log));
    let plan = json!([
        {"id": "a", "agentType": "backend", "action": "create_api", "critical": true},
        {"id": "b", "agentType": "ui", "action": "create_interface", "dependencies": ["a"]},
        {"id": "c", "agentType": "database", "action": "design_schema"}
    ]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[backend.clone(), ui.clone(), database], &bus);
    let request = request(RequestType::CreateApp);
    let session_id = request.session_id();

    let result = orch.process_request(request).await.unwrap();

    assert_eq!(result.status, PlanStatus::Failed);
    assert_eq!(result.outcome("a").unwrap().attempts, 1);
    assert_eq!(result.outcome("b").unwrap().status, AgentStatus::Skipped);
    assert_eq!(ui.calls("b"), 0);
    assert!(result.outcome("c").unwrap().is_completed());
    assert_eq!(result.outputs[&AgentType::Database], json!({"step": "c"}));
    assert_eq!(result.completed_steps, 1);
    assert!(result.error.unwrap().contains("Critical step a failed"));

    let records = orch.status_records(session_id);
    let b = records.iter().find(|r| r.step_id == "b").unwrap();
    assert_eq!(b.status, AgentStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn cyclic_plan_is_rejected_before_any_dispatch() {
    let log = Log::default();
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log));
    let plan = json!([
        {"id": "a", "agentType": "ui", "action": "x", "dependencies": ["b"]},
        {"id": "b", "agentType": "ui", "action": "y", "dependencies": ["a"]}
    ]);
    let bus = EventBus::new();
    let mut firehose = bus.subscribe();
    let orch = orchestrator(plan, &[ui], &bus);
    let request = request(RequestType::ModifyApp);
    let request_id = request.request_id;

    let mut rx = orch.subscribe(request.session_id());

    let err = orch.process_request(request).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::CyclicDependency { .. }));
    let events = drain(&mut firehose);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Error {
            session_id,
            message,
            context,
        } => {
            assert_eq!(*session_id, Some(request_id));
            assert!(message.starts_with("Cyclic dependency detected"));
            assert_eq!(context.as_deref(), Some("plan_rejected"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(rx.try_recv().unwrap().event, Event::Error { .. }));
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Closed)
    ));
    assert_eq!(bus.session_count(), 0);
    assert!(log.lock().unwrap().is_empty());
    assert!(orch.get_active_requests().is_empty());
    assert!(orch.get_result(request_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_step_gets_two_retries() {
    let log = Log::default();
    let integration = Arc::new(ScriptedAgent::new(AgentType::Integration, &log).on(
        "a",
        Behavior::Fail(AgentFailure::new("Too Many Requests").with_status(429)),
    ));
    let plan = json!([{"id": "a", "agentType": "integration", "action": "setup_integration"}]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[integration.clone()], &bus);
    let request = request(RequestType::IntegrateService);
    let mut rx = orch.subscribe(request.session_id());

    let result = orch.process_request(request).await.unwrap();

    let a = result.outcome("a").unwrap();
    assert_eq!(a.status, AgentStatus::Failed);
    assert_eq!(a.attempts, 3);
    let classification = a.classification.as_ref().unwrap();
    assert_eq!(classification.category, ErrorCategory::RateLimit);
    assert!(classification.is_retryable);
    assert_eq!(classification.retry_delay_ms, Some(10_000));
    assert_eq!(classification.max_retries, Some(2));

    let events = drain(&mut rx);
    assert_eq!(retry_delays(&events, "a"), vec![10_000, 10_000]);
    assert!(events
        .iter()
        .filter_map(Event::as_status)
        .all(|e| e.retry_count <= 2));
    // non-critical step: the plan itself still completes
    assert_eq!(result.status, PlanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn retry_delays_never_shrink_when_the_failure_changes() {
    let log = Log::default();
    let backend = Arc::new(ScriptedAgent::new(AgentType::Backend, &log).on(
        "a",
        Behavior::FailWith(vec![
            AgentFailure::new("Too Many Requests").with_status(429),
            AgentFailure::new("connect ECONNRESET 10.0.0.1:443"),
            AgentFailure::new("socket hang up"),
        ]),
    ));
    let plan = json!([{"id": "a", "agentType": "backend", "action": "create_api", "critical": true}]);
    let bus = EventBus::new();
    let mut firehose = bus.subscribe();
    let orch = orchestrator(plan, &[backend.clone()], &bus);

    let result = orch.process_request(request(RequestType::CreateApp)).await.unwrap();

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(backend.calls("a"), 4);
    let delays = retry_delays(&drain(&mut firehose), "a");
    assert_eq!(delays, vec![10000, 10000, 10000]);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn critical_failure_stops_later_dispatch_but_drains_in_flight() {
    let log = Log::default();
    let database = Arc::new(ScriptedAgent::new(AgentType::Database, &log).on("x", Behavior::Delay(1000)));
    let backend = Arc::new(
        ScriptedAgent::new(AgentType::Backend, &log)
            .on("a", Behavior::Fail(AgentFailure::validation("invalid schema"))),
    );
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log));
    let plan = json!([
        {"id": "x", "agentType": "database", "action": "design_schema"},
        {"id": "a", "agentType": "backend", "action": "create_api", "critical": true},
        {"id": "y", "agentType": "ui", "action": "create_interface", "dependencies": ["x"]}
    ]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[database, backend, ui.clone()], &bus);

    let result = orch.process_request(request(RequestType::CreateApp)).await.unwrap();

    assert_eq!(result.status, PlanStatus::Failed);
    assert!(result.outcome("x").unwrap().is_completed());
    assert_eq!(result.outcome("y").unwrap().status, AgentStatus::Skipped);
    assert_eq!(ui.calls("y"), 0);
}

#[tokio::test(start_paused = true)]
async fn steps_start_only_after_dependencies_complete() {
    let log = Log::default();
    let database = Arc::new(ScriptedAgent::new(AgentType::Database, &log).on("a", Behavior::Delay(300)));
    let backend = Arc::new(ScriptedAgent::new(AgentType::Backend, &log).on("b", Behavior::Delay(500)));
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log).on("c", Behavior::Delay(100)));
    let deployment = Arc::new(ScriptedAgent::new(AgentType::Deployment, &log));
    let plan = json!([
        {"id": "a", "agentType": "database", "action": "design_schema"},
        {"id": "b", "agentType": "backend", "action": "create_api", "dependencies": ["a"]},
        {"id": "c", "agentType": "ui", "action": "create_interface", "dependencies": [1]},
        {"id": "d", "agentType": "deployment", "action": "deploy", "dependencies": ["b", "c"]}
    ]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[database, backend, ui, deployment], &bus);

    let result = orch.process_request(request(RequestType::CreateApp)).await.unwrap();

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(result.completed_steps, 4);
    let log = log.lock().unwrap();
    assert!(position(&log, "end:a") < position(&log, "start:b"));
    assert!(position(&log, "end:a") < position(&log, "start:c"));
    assert!(position(&log, "end:b") < position(&log, "start:d"));
    assert!(position(&log, "end:c") < position(&log, "start:d"));
    // b and c ran side by side
    assert!(position(&log, "start:c") < position(&log, "end:b"));
}

#[tokio::test(start_paused = true)]
async fn concurrency_ceiling_limits_parallel_steps() {
    let log = Log::default();
    let mut agent = ScriptedAgent::new(AgentType::Database, &log);
    let mut plan = Vec::new();
    for i in 1..=5 {
        let id = format!("db-{}", i);
        agent = agent.on(&id, Behavior::Delay(1000));
        plan.push(json!({"id": id, "agentType": "database", "action": "design_schema"}));
    }
    let database = Arc::new(agent);
    let bus = EventBus::new();
    let orch = orchestrator(Value::Array(plan), &[database.clone()], &bus);

    let result = orch.process_request(request(RequestType::CreateApp)).await.unwrap();

    assert_eq!(result.completed_steps, 5);
    assert_eq!(database.peak.load(Ordering::SeqCst), 2);
    assert_eq!(orch.get_agent_status().agents[&AgentType::Database].active_jobs, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_dispatch_and_discards_in_flight_results() {
    let log = Log::default();
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log).on("a", Behavior::Delay(5000)));
    let plan = json!([
        {"id": "a", "agentType": "ui", "action": "create_interface"},
        {"id": "b", "agentType": "ui", "action": "polish", "dependencies": ["a"]}
    ]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[ui.clone()], &bus);
    let request = request(RequestType::ModifyApp);
    let request_id = request.request_id;
    let session_id = request.session_id();
    let mut rx = orch.subscribe(session_id);

    let submission = orch.submit_request(request).await.unwrap();
    assert_eq!(submission.session_id, session_id);
    assert_eq!(submission.steps.len(), 2);
    assert_eq!(orch.get_active_requests().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ui.calls("a"), 1);
    assert!(orch.cancel_request(request_id));
    assert!(!orch.cancel_request(request_id));

    let mut seen_cancelled = false;
    let finished_status = loop {
        match rx.recv().await.unwrap().event {
            Event::PlanCancelled { .. } => seen_cancelled = true,
            Event::PlanFinished { status, .. } => break status,
            _ => {}
        }
    };
    assert!(seen_cancelled);
    assert_eq!(finished_status, PlanStatus::Cancelled);
    assert!(orch.get_active_requests().is_empty());

    // the detached step still runs to completion, its result is not used
    tokio::time::sleep(Duration::from_millis(6000)).await;
    assert!(log.lock().unwrap().contains(&"end:a".to_string()));
    assert_eq!(ui.calls("b"), 0);

    let result = orch.get_result(request_id).unwrap();
    assert_eq!(result.status, PlanStatus::Cancelled);
    assert_eq!(result.completed_steps, 0);
    let records = orch.status_records(session_id);
    let b = records.iter().find(|r| r.step_id == "b").unwrap();
    assert_eq!(b.status, AgentStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn failed_step_can_be_retried_manually() {
    let log = Log::default();
    let backend = Arc::new(ScriptedAgent::new(AgentType::Backend, &log).on(
        "a",
        Behavior::FailTimes(1, AgentFailure::validation("schema is invalid")),
    ));
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log));
    let plan = json!([
        {"id": "a", "agentType": "backend", "action": "create_api"},
        {"id": "b", "agentType": "ui", "action": "create_interface", "dependencies": ["a"]}
    ]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[backend.clone(), ui], &bus);
    let request = request(RequestType::ModifyApp);
    let request_id = request.request_id;
    let session_id = request.session_id();

    let result = orch.process_request(request).await.unwrap();
    assert!(result.outcome("a").unwrap().is_failed());
    assert_eq!(result.outcome("b").unwrap().status, AgentStatus::Skipped);

    let mut rx = orch.subscribe(session_id);
    let outcome = orch.retry_step(request_id, "a").await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(backend.calls("a"), 2);

    let transitions: Vec<Transition> = drain(&mut rx)
        .iter()
        .filter_map(Event::as_status)
        .map(|e| e.transition)
        .collect();
    assert_eq!(
        transitions,
        vec![Transition::Reset, Transition::Started, Transition::Completed]
    );
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Closed)
    ));
    assert_eq!(bus.session_count(), 0);

    let updated = orch.get_result(request_id).unwrap();
    assert!(updated.outcome("a").unwrap().is_completed());
    assert_eq!(updated.completed_steps, 1);
    assert_eq!(updated.outputs[&AgentType::Backend], json!({"step": "a"}));

    let record = orch
        .status_records(session_id)
        .into_iter()
        .find(|r| r.step_id == "a")
        .unwrap();
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.retry_count, 0);

    assert!(matches!(
        orch.retry_step(request_id, "a").await,
        Err(OrchestratorError::StepNotRetryable { .. })
    ));
    assert!(matches!(
        orch.retry_step(request_id, "b").await,
        Err(OrchestratorError::StepNotRetryable { .. })
    ));
    assert!(matches!(
        orch.retry_step(request_id, "zzz").await,
        Err(OrchestratorError::StepNotFound(_))
    ));
    assert!(matches!(
        orch.retry_step(uuid::Uuid::new_v4(), "a").await,
        Err(OrchestratorError::RequestNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn malformed_decomposition_falls_back_to_default_plan() {
    let bus = EventBus::new();
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(ScriptedGenerator("Sorry, I can't produce a plan.".to_string())),
        AgentRegistry::new().with_agent(Arc::new(DeploymentAgent)),
        bus.clone(),
    );
    let mut firehose = bus.subscribe();

    let result = orch
        .process_request(request(RequestType::DeployApp))
        .await
        .unwrap();

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(result.total_steps, 1);
    assert_eq!(
        result.outputs[&AgentType::Deployment]["url"],
        "https://app-shop.example.com"
    );
    assert_eq!(result.artifacts.len(), 1);

    let events = drain(&mut firehose);
    assert!(matches!(
        events.first(),
        Some(Event::PlanAccepted { fallback: true, total_steps: 1, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn agent_status_snapshot_reports_registered_agents() {
    let log = Log::default();
    let ui = Arc::new(ScriptedAgent::new(AgentType::Ui, &log));
    let bus = EventBus::new();
    let orch = orchestrator(json!([]), &[ui], &bus);

    let snapshot = orch.get_agent_status();
    assert_eq!(snapshot.total_agents, 1);
    assert_eq!(snapshot.active_requests, 0);
    assert!(snapshot.agents[&AgentType::Ui].available);
    assert_eq!(snapshot.agents[&AgentType::Ui].max_concurrent, 3);
    assert!(!snapshot.agents[&AgentType::Backend].available);
}

/// Network policy with millisecond delays, so retries against a real
/// sqlite store finish quickly without pausing the clock.
struct FastNetwork;

impl FailureClassifier for FastNetwork {
    fn classify(&self, _: &AgentFailure) -> Result<ErrorClassification, ClassifierError> {
        Ok(ErrorClassification {
            severity: ErrorSeverity::Minor,
            category: ErrorCategory::Network,
            is_retryable: true,
            suggested_action: SuggestedAction::Retry,
            retry_delay_ms: Some(1),
            max_retries: Some(3),
            message: "network".to_string(),
        })
    }
}

#[tokio::test]
async fn failures_and_sessions_are_persisted() {
    let pool = db::create_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let errors = db::ErrorRecordRepository::new(pool.clone());
    let sessions = db::BuildSessionRepository::new(pool);

    let log = Log::default();
    let backend = Arc::new(ScriptedAgent::new(AgentType::Backend, &log).on(
        "a",
        Behavior::Fail(AgentFailure::new("socket hang up")),
    ));
    let plan = json!([{"id": "a", "agentType": "backend", "action": "create_api", "critical": true}]);
    let bus = EventBus::new();
    let orch = orchestrator(plan, &[backend], &bus)
        .with_classifier(Arc::new(FastNetwork))
        .with_error_store(errors.clone())
        .with_session_store(sessions.clone());
    let request = request(RequestType::CreateApp);
    let session_id = request.session_id();

    orch.process_request(request).await.unwrap();

    let rows = errors.find_by_session_id(session_id).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows.iter()
            .filter(|r| r.resolution == db::ErrorResolution::Retrying)
            .count(),
        3
    );
    assert_eq!(rows[3].resolution, db::ErrorResolution::Unresolved);

    let session = sessions.find_by_id(session_id).await.unwrap().unwrap();
    assert_eq!(session.status, db::BuildSessionStatus::Failed);
    assert_eq!(session.total_steps, 1);
    assert!(session.error.is_some());
}
