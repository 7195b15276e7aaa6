use std::sync::Arc;

use async_trait::async_trait;
use forge_core::{AgentType, Artifact, PlanStep};
use tracing::debug;

use super::{parse_object, Agent, AgentContext, AgentOutput};
use crate::failure::AgentFailure;
use crate::generation::{GenerateOptions, GenerationService};
use crate::prompts::PlanPrompts;

/// Agent that delegates its step to the generation service and returns the
/// structured answer. Used for the ui, backend and database capabilities.
pub struct GenerativeAgent {
    agent_type: AgentType,
    generator: Arc<dyn GenerationService>,
    temperature: f32,
    max_tokens: u32,
}

impl GenerativeAgent {
    pub fn new(agent_type: AgentType, generator: Arc<dyn GenerationService>) -> Self {
        let (temperature, max_tokens) = match agent_type {
            AgentType::Ui => (0.7, 2000),
            AgentType::Backend => (0.5, 3000),
            AgentType::Database => (0.3, 2000),
            AgentType::Integration | AgentType::Deployment => (0.4, 2000),
        };
        Self {
            agent_type,
            generator,
            temperature,
            max_tokens,
        }
    }

    pub fn with_settings(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn artifact_type(&self) -> &'static str {
        match self.agent_type {
            AgentType::Ui => "component",
            AgentType::Backend => "api",
            AgentType::Database => "schema",
            AgentType::Integration => "integration",
            AgentType::Deployment => "deployment",
        }
    }

    fn prompt(step: &PlanStep, ctx: &AgentContext) -> String {
        let mut prompt = PlanPrompts::agent_task(step, &ctx.request);
        if !ctx.inputs.is_empty() {
            prompt.push_str("\n\n## Results of earlier steps\n");
            for (step_id, output) in &ctx.inputs {
                prompt.push_str(&format!("- {}: {}\n", step_id, output));
            }
        }
        prompt
    }
}

#[async_trait]
impl Agent for GenerativeAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn execute(
        &self,
        step: &PlanStep,
        ctx: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure> {
        if step.action.trim().is_empty() {
            return Err(AgentFailure::validation(format!(
                "Step {} has no action",
                step.id
            )));
        }

        ctx.report_progress(10, format!("Preparing {}", step.action));
        let options = GenerateOptions::new()
            .with_system_prompt(PlanPrompts::agent_system(self.agent_type))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        ctx.report_progress(30, "Generating");
        let text = self
            .generator
            .generate(&Self::prompt(step, ctx), &options)
            .await?;

        ctx.report_progress(80, "Parsing output");
        let output = parse_object(&text);
        debug!(
            step_id = %step.id,
            agent_type = %self.agent_type,
            attempt = ctx.attempt,
            "Generated step output"
        );

        Ok(AgentOutput::new(output.clone())
            .with_artifact(Artifact::new(self.artifact_type(), &step.action, output))
            .with_summary(format!("{} completed {}", self.agent_type.display_name(), step.action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use forge_core::{BuildRequest, RequestType};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        reply: Option<Result<String, GenerationError>>,
        seen: Mutex<Vec<(String, GenerateOptions)>>,
    }

    #[async_trait]
    impl GenerationService for Recording {
        async fn generate(
            &self,
            prompt: &str,
            options: &GenerateOptions,
        ) -> Result<String, GenerationError> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.clone()));
            self.reply.clone().unwrap_or(Err(GenerationError::Empty))
        }
    }

    fn context() -> AgentContext {
        AgentContext::new(Arc::new(BuildRequest::new(
            "u",
            "shop",
            RequestType::CreateApp,
            "Store",
        )))
    }

    #[tokio::test]
    async fn test_database_agent_parses_json() {
        let generator = Arc::new(Recording {
            reply: Some(Ok("```json\n{\"tables\": [\"orders\"]}\n```".to_string())),
            ..Default::default()
        });
        let agent = GenerativeAgent::new(AgentType::Database, generator.clone());
        let step = PlanStep::new("step-1", AgentType::Database, "design_schema");

        let out = agent.execute(&step, &context()).await.unwrap();
        assert_eq!(out.output, json!({"tables": ["orders"]}));
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.artifacts[0].artifact_type, "schema");
        assert_eq!(out.artifacts[0].name, "design_schema");

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].1.temperature, Some(0.3));
        assert_eq!(seen[0].1.max_tokens, Some(2000));
        assert!(seen[0].1.system_prompt.as_deref().unwrap().contains("database"));
    }

    #[tokio::test]
    async fn test_dependency_outputs_reach_prompt() {
        let generator = Arc::new(Recording {
            reply: Some(Ok("no json here".to_string())),
            ..Default::default()
        });
        let agent = GenerativeAgent::new(AgentType::Backend, generator.clone());
        let step = PlanStep::new("step-2", AgentType::Backend, "create_api").depends_on("step-1");
        let ctx = context().with_inputs([("step-1".to_string(), json!({"tables": ["orders"]}))].into());

        let out = agent.execute(&step, &ctx).await.unwrap();
        assert_eq!(out.output, json!({"content": "no json here"}));

        let seen = generator.seen.lock().unwrap();
        assert!(seen[0].0.contains("Results of earlier steps"));
        assert!(seen[0].0.contains("orders"));
        assert_eq!(seen[0].1.max_tokens, Some(3000));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_status() {
        let generator = Arc::new(Recording {
            reply: Some(Err(GenerationError::request("Too many requests", Some(429)))),
            ..Default::default()
        });
        let agent = GenerativeAgent::new(AgentType::Ui, generator);
        let step = PlanStep::new("step-1", AgentType::Ui, "create_interface");

        let failure = agent.execute(&step, &context()).await.unwrap_err();
        assert_eq!(failure.status_code, Some(429));
    }

    #[tokio::test]
    async fn test_missing_action_is_validation_failure() {
        let agent = GenerativeAgent::new(AgentType::Ui, Arc::new(Recording::default()));
        let step = PlanStep::new("step-1", AgentType::Ui, " ");

        let failure = agent.execute(&step, &context()).await.unwrap_err();
        assert_eq!(failure.kind.as_deref(), Some("ValidationError"));
    }
}
