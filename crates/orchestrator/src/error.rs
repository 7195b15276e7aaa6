use forge_core::AgentType;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Cyclic dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Plan has no steps")]
    EmptyPlan,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No agent registered for type: {0}")]
    AgentNotFound(AgentType),

    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Request already active: {0}")]
    RequestAlreadyActive(Uuid),

    #[error("Status record not found: {0}")]
    StatusNotFound(Uuid),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Step {step} cannot be retried: {reason}")]
    StepNotRetryable { step: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    pub fn unknown_dependency(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            step: step.into(),
            dependency: dependency.into(),
        }
    }

    pub fn not_retryable(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepNotRetryable {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure was raised while validating the plan, before any
    /// step could run.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. }
                | Self::UnknownDependency { .. }
                | Self::DuplicateStep(_)
                | Self::EmptyPlan
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
