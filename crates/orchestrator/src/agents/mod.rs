//! Agent implementations and the registry that selects them by type.

mod deployment;
mod generative;
mod integration;

pub use deployment::DeploymentAgent;
pub use generative::GenerativeAgent;
pub use integration::IntegrationAgent;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forge_core::{AgentType, Artifact, BuildRequest, PlanStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::ConcurrencyConfig;
use crate::failure::AgentFailure;
use crate::generation::GenerationService;
use crate::status_tracker::StatusTracker;

/// A capability that performs one kind of plan step.
///
/// Failures are returned as values; the executor classifies them and decides
/// whether the step is retried.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;

    async fn execute(
        &self,
        step: &PlanStep,
        ctx: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub output: Value,
    pub artifacts: Vec<Artifact>,
    pub summary: Option<String>,
}

impl AgentOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
            summary: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Clone)]
struct ProgressSink {
    tracker: StatusTracker,
    status_id: Uuid,
}

/// Everything an agent sees of the run it belongs to.
#[derive(Clone)]
pub struct AgentContext {
    pub request: Arc<BuildRequest>,
    pub session_id: Uuid,
    /// 1-based attempt number within the current retry cycle.
    pub attempt: u32,
    /// Outputs of the step's completed dependencies, keyed by step id.
    pub inputs: BTreeMap<String, Value>,
    progress: Option<ProgressSink>,
}

impl AgentContext {
    pub fn new(request: Arc<BuildRequest>) -> Self {
        let session_id = request.session_id();
        Self {
            request,
            session_id,
            attempt: 1,
            inputs: BTreeMap::new(),
            progress: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_inputs(mut self, inputs: BTreeMap<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub(crate) fn with_progress(mut self, tracker: StatusTracker, status_id: Uuid) -> Self {
        self.progress = Some(ProgressSink { tracker, status_id });
        self
    }

    pub fn report_progress(&self, percentage: u8, operation: impl Into<String>) {
        let Some(sink) = &self.progress else {
            return;
        };
        if let Err(e) = sink
            .tracker
            .progress(sink.status_id, percentage, Some(operation.into()))
        {
            debug!(status_id = %sink.status_id, "Progress not recorded: {}", e);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Activity {
    active_jobs: usize,
    last_activity: Option<DateTime<Utc>>,
}

/// Availability of one agent type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AgentAvailability {
    pub available: bool,
    pub active_jobs: usize,
    pub max_concurrent: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AgentStatusSnapshot {
    pub total_agents: usize,
    pub active_requests: usize,
    pub agents: BTreeMap<AgentType, AgentAvailability>,
}

/// Maps agent types to implementations and counts their running jobs.
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
    activity: Arc<RwLock<HashMap<AgentType, Activity>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            activity: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// All five built-in agents sharing one generation service.
    pub fn builtin(generator: Arc<dyn GenerationService>) -> Self {
        Self::new()
            .with_agent(Arc::new(GenerativeAgent::new(
                AgentType::Ui,
                generator.clone(),
            )))
            .with_agent(Arc::new(GenerativeAgent::new(
                AgentType::Backend,
                generator.clone(),
            )))
            .with_agent(Arc::new(GenerativeAgent::new(
                AgentType::Database,
                generator,
            )))
            .with_agent(Arc::new(IntegrationAgent))
            .with_agent(Arc::new(DeploymentAgent))
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.register(agent);
        self
    }

    /// Register an agent, replacing any previous one of the same type.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
        self.agents.insert(agent.agent_type(), agent)
    }

    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Count a job against the agent type until the guard is dropped.
    pub fn begin_job(&self, agent_type: AgentType) -> JobGuard {
        {
            let mut activity = self.activity.write().unwrap();
            let entry = activity.entry(agent_type).or_default();
            entry.active_jobs += 1;
            entry.last_activity = Some(Utc::now());
        }
        JobGuard {
            activity: self.activity.clone(),
            agent_type,
        }
    }

    pub fn active_jobs(&self, agent_type: AgentType) -> usize {
        let activity = self.activity.read().unwrap();
        activity.get(&agent_type).map(|a| a.active_jobs).unwrap_or(0)
    }

    pub fn snapshot(
        &self,
        concurrency: &ConcurrencyConfig,
        active_requests: usize,
    ) -> AgentStatusSnapshot {
        let activity = self.activity.read().unwrap();
        let agents = AgentType::ALL
            .iter()
            .map(|&agent_type| {
                let current = activity.get(&agent_type).cloned().unwrap_or_default();
                let max_concurrent = concurrency.limit(agent_type);
                let availability = AgentAvailability {
                    available: self.agents.contains_key(&agent_type)
                        && current.active_jobs < max_concurrent,
                    active_jobs: current.active_jobs,
                    max_concurrent,
                    last_activity: current.last_activity,
                };
                (agent_type, availability)
            })
            .collect();

        AgentStatusSnapshot {
            total_agents: self.agents.len(),
            active_requests,
            agents,
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.agents.keys().collect();
        types.sort();
        f.debug_struct("AgentRegistry")
            .field("agents", &types)
            .finish()
    }
}

/// Releases one job slot on drop.
pub struct JobGuard {
    activity: Arc<RwLock<HashMap<AgentType, Activity>>>,
    agent_type: AgentType,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Ok(mut activity) = self.activity.write() {
            let entry = activity.entry(self.agent_type).or_default();
            entry.active_jobs = entry.active_jobs.saturating_sub(1);
            entry.last_activity = Some(Utc::now());
        }
    }
}

/// Pull the first JSON object out of generated text. Anything that is not an
/// object is wrapped as `{"content": text}`.
pub(crate) fn parse_object(text: &str) -> Value {
    let trimmed = text.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "content": text }),
    }
}
