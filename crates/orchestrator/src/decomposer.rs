//! Request decomposition
//!
//! One generation attempt turns a request into a step list. Any failure, be
//! it the generation call or the parse of its output, falls back to a fixed
//! plan chosen by request type. Cycles are not checked here; the graph
//! builder rejects them.

use std::collections::HashSet;
use std::sync::Arc;

use forge_core::{AgentType, BuildRequest, PlanStep, RequestType};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::generation::{GenerateOptions, GenerationError, GenerationService};
use crate::prompts::PlanPrompts;

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("no JSON array found in response")]
    NoJson,

    #[error("invalid plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan is empty")]
    Empty,

    #[error("step {index} has unknown agent type '{agent_type}'")]
    UnknownAgent { index: usize, agent_type: String },

    #[error("step {index} has no action")]
    MissingAction { index: usize },

    #[error("duplicate step id '{0}'")]
    DuplicateId(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },
}

/// The plan a request will run, and whether it came from the fallback.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub steps: Vec<PlanStep>,
    pub fallback: bool,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepDescriptor {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "agentType", alias = "agent_type")]
    agent_type: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    dependencies: Vec<DependencyRef>,
    #[serde(default, rename = "estimatedDuration", alias = "estimated_duration")]
    estimated_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencyRef {
    /// 1-based position in the array.
    Position(u64),
    Id(String),
}

pub struct RequirementDecomposer {
    generator: Arc<dyn GenerationService>,
    temperature: f32,
    max_tokens: u32,
}

impl RequirementDecomposer {
    pub fn new(generator: Arc<dyn GenerationService>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            temperature: config.decomposition_temperature,
            max_tokens: config.decomposition_max_tokens,
        }
    }

    pub async fn decompose(&self, request: &BuildRequest) -> Decomposition {
        let prompt = PlanPrompts::decomposition(request);
        let options = GenerateOptions::new()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let parsed = match self.generator.generate(&prompt, &options).await {
            Ok(text) => parse_plan(&text),
            Err(e) => Err(PlanParseError::from(e)),
        };

        match parsed {
            Ok(steps) => {
                info!(
                    request_id = %request.request_id,
                    steps = steps.len(),
                    "Created execution plan"
                );
                Decomposition {
                    steps,
                    fallback: false,
                    fallback_reason: None,
                }
            }
            Err(reason) => {
                warn!(
                    request_id = %request.request_id,
                    request_type = %request.request_type,
                    "Decomposition failed, using fallback plan: {}",
                    reason
                );
                Decomposition {
                    steps: fallback_plan(request.request_type),
                    fallback: true,
                    fallback_reason: Some(reason.to_string()),
                }
            }
        }
    }
}

/// Extract and validate the step array from generated text.
pub fn parse_plan(text: &str) -> Result<Vec<PlanStep>, PlanParseError> {
    let array_pattern = Regex::new(r"\[[\s\S]*\]").expect("Invalid plan regex pattern");
    let json = array_pattern
        .find(text)
        .map(|m| m.as_str())
        .ok_or(PlanParseError::NoJson)?;

    let descriptors: Vec<StepDescriptor> = serde_json::from_str(json)?;
    if descriptors.is_empty() {
        return Err(PlanParseError::Empty);
    }

    let mut ids = Vec::with_capacity(descriptors.len());
    let mut seen = HashSet::new();
    for (index, descriptor) in descriptors.iter().enumerate() {
        let id = descriptor
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| PlanStep::positional_id(index));
        if !seen.insert(id.clone()) {
            return Err(PlanParseError::DuplicateId(id));
        }
        ids.push(id);
    }

    let mut steps = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.into_iter().enumerate() {
        let agent_type = AgentType::parse(&descriptor.agent_type).ok_or_else(|| {
            PlanParseError::UnknownAgent {
                index,
                agent_type: descriptor.agent_type.clone(),
            }
        })?;
        if descriptor.action.trim().is_empty() {
            return Err(PlanParseError::MissingAction { index });
        }

        let id = ids[index].clone();
        let mut dependencies = Vec::with_capacity(descriptor.dependencies.len());
        for dep in &descriptor.dependencies {
            let resolved = match dep {
                DependencyRef::Position(n) => usize::try_from(*n)
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| ids.get(i).cloned()),
                DependencyRef::Id(s) => seen.contains(s).then(|| s.clone()),
            };
            match resolved {
                Some(dep_id) => dependencies.push(dep_id),
                None => {
                    let dependency = match dep {
                        DependencyRef::Position(n) => n.to_string(),
                        DependencyRef::Id(s) => s.clone(),
                    };
                    return Err(PlanParseError::UnknownDependency {
                        step: id,
                        dependency,
                    });
                }
            }
        }

        let parameters = match descriptor.parameters {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        steps.push(PlanStep {
            id,
            agent_type,
            action: descriptor.action,
            parameters,
            dependencies,
            critical: descriptor.critical,
            estimated_duration: descriptor.estimated_duration,
        });
    }

    Ok(steps)
}

/// Deterministic plan used whenever decomposition fails.
pub fn fallback_plan(request_type: RequestType) -> Vec<PlanStep> {
    match request_type {
        RequestType::CreateApp => vec![
            PlanStep::new("step-1", AgentType::Database, "design_schema").critical(),
            PlanStep::new("step-2", AgentType::Backend, "create_api")
                .depends_on("step-1")
                .critical(),
            PlanStep::new("step-3", AgentType::Ui, "create_interface")
                .depends_on("step-2")
                .critical(),
        ],
        RequestType::ModifyApp => vec![
            PlanStep::new("step-1", AgentType::Ui, "modify_interface"),
            PlanStep::new("step-2", AgentType::Backend, "update_api"),
        ],
        RequestType::DeployApp => {
            vec![PlanStep::new("step-1", AgentType::Deployment, "deploy_application").critical()]
        }
        RequestType::IntegrateService => vec![
            PlanStep::new("step-1", AgentType::Integration, "setup_integration").critical(),
            PlanStep::new("step-2", AgentType::Backend, "update_api").depends_on("step-1"),
        ],
    }
}
