use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AgentStatus, AgentType, ErrorClassification};

/// One unit of work in an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlanStep {
    pub id: String,
    pub agent_type: AgentType,
    pub action: String,
    #[serde(default)]
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub critical: bool,
    /// Estimated duration in seconds, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u64>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, agent_type: AgentType, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type,
            action: action.into(),
            parameters: serde_json::Value::Object(Default::default()),
            dependencies: Vec::new(),
            critical: false,
            estimated_duration: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Step ids are assigned positionally as `step-1`, `step-2`, ...
    pub fn positional_id(index: usize) -> String {
        format!("step-{}", index + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Artifact {
    pub artifact_type: String,
    pub name: String,
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub content: serde_json::Value,
}

impl Artifact {
    pub fn new(
        artifact_type: impl Into<String>,
        name: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            name: name.into(),
            content,
        }
    }
}

/// Terminal record of one step's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StepOutcome {
    pub step_id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorClassification>,
    pub attempts: u32,
    /// Completed after at least one failed attempt.
    #[serde(default)]
    pub recovered: bool,
}

impl StepOutcome {
    pub fn skipped(step: &PlanStep) -> Self {
        Self {
            step_id: step.id.clone(),
            agent_type: step.agent_type,
            status: AgentStatus::Skipped,
            output: None,
            artifacts: Vec::new(),
            error: None,
            classification: None,
            attempts: 0,
            recovered: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == AgentStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consolidated result of a whole plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlanResult {
    pub request_id: Uuid,
    pub status: PlanStatus,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Output of the last completed step per agent type.
    #[cfg_attr(feature = "typescript", ts(type = "Record<string, unknown>"))]
    pub outputs: BTreeMap<AgentType, serde_json::Value>,
    pub artifacts: Vec<Artifact>,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl PlanResult {
    /// Consolidate outcomes in plan order. Steps without an outcome are
    /// reported as skipped.
    pub fn consolidate(
        request_id: Uuid,
        status: PlanStatus,
        plan: &[PlanStep],
        mut outcomes: BTreeMap<String, StepOutcome>,
        error: Option<String>,
    ) -> Self {
        let steps: Vec<StepOutcome> = plan
            .iter()
            .map(|step| {
                outcomes
                    .remove(&step.id)
                    .unwrap_or_else(|| StepOutcome::skipped(step))
            })
            .collect();

        let mut outputs = BTreeMap::new();
        let mut artifacts = Vec::new();
        for outcome in steps.iter().filter(|o| o.is_completed()) {
            if let Some(output) = &outcome.output {
                outputs.insert(outcome.agent_type, output.clone());
            }
            artifacts.extend(outcome.artifacts.iter().cloned());
        }

        Self {
            request_id,
            status,
            completed_steps: steps.iter().filter(|o| o.is_completed()).count(),
            total_steps: plan.len(),
            outputs,
            artifacts,
            steps,
            error,
            finished_at: Utc::now(),
        }
    }

    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|o| o.step_id == step_id)
    }

    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|o| o.status == AgentStatus::Skipped)
    }
}
