pub mod agents;
pub mod classifier;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod executor;
pub mod failure;
pub mod generation;
pub mod graph;
pub mod orchestrator;
pub mod prompts;
pub mod scheduler;
pub mod state_machine;
pub mod status_tracker;

pub use agents::{
    Agent, AgentAvailability, AgentContext, AgentOutput, AgentRegistry, AgentStatusSnapshot,
    DeploymentAgent, GenerativeAgent, IntegrationAgent,
};
pub use classifier::{ClassifierError, ErrorClassifier, FailureClassifier};
pub use config::{ConcurrencyConfig, GenerationConfig, OrchestratorConfig, RetryConfig};
pub use decomposer::{fallback_plan, parse_plan, Decomposition, PlanParseError, RequirementDecomposer};
pub use error::{OrchestratorError, Result};
pub use executor::AgentExecutor;
pub use failure::AgentFailure;
pub use generation::{
    BoundedGenerator, GenerateOptions, GenerationError, GenerationService, OpenRouterClient,
};
pub use graph::DependencyGraph;
pub use orchestrator::{Orchestrator, Submission};
pub use scheduler::TaskScheduler;
pub use state_machine::StepStateMachine;
pub use status_tracker::StatusTracker;
