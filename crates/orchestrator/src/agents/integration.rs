use async_trait::async_trait;
use chrono::Utc;
use forge_core::{AgentType, Artifact, PlanStep};
use serde_json::{json, Value};

use super::{Agent, AgentContext, AgentOutput};
use crate::failure::AgentFailure;

const DEFAULT_SERVICE: &str = "external_service";

/// Produces a configured-integration descriptor for an external service.
pub struct IntegrationAgent;

impl IntegrationAgent {
    fn service(step: &PlanStep, ctx: &AgentContext) -> Result<String, AgentFailure> {
        let from_context = ctx
            .request
            .context
            .as_ref()
            .and_then(|c| c.get("service"));
        match step.parameters.get("service").or(from_context) {
            None | Some(Value::Null) => Ok(DEFAULT_SERVICE.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(other) => Err(AgentFailure::validation(format!(
                "Invalid service name for step {}: {}",
                step.id, other
            ))),
        }
    }
}

#[async_trait]
impl Agent for IntegrationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Integration
    }

    async fn execute(
        &self,
        step: &PlanStep,
        ctx: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure> {
        let service = Self::service(step, ctx)?;
        ctx.report_progress(50, format!("Configuring {}", service));

        let config = step
            .parameters
            .get("config")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let output = json!({
            "type": "integration",
            "service": service,
            "config": config,
            "status": "configured",
            "metadata": {
                "generated_by": AgentType::Integration.display_name(),
                "timestamp": Utc::now().to_rfc3339(),
            },
        });

        Ok(AgentOutput::new(output.clone())
            .with_artifact(Artifact::new(
                "integration",
                format!("{}_integration", service),
                output,
            ))
            .with_summary(format!("Configured integration with {}", service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{BuildRequest, RequestType};
    use std::sync::Arc;

    fn context(request: BuildRequest) -> AgentContext {
        AgentContext::new(Arc::new(request))
    }

    #[tokio::test]
    async fn test_configures_named_service() {
        let step = PlanStep::new("step-1", AgentType::Integration, "setup_integration")
            .with_parameters(json!({"service": "stripe", "config": {"mode": "test"}}));
        let ctx = context(BuildRequest::new("u", "p", RequestType::IntegrateService, "pay"));

        let out = IntegrationAgent.execute(&step, &ctx).await.unwrap();
        assert_eq!(out.output["type"], "integration");
        assert_eq!(out.output["service"], "stripe");
        assert_eq!(out.output["config"]["mode"], "test");
        assert_eq!(out.output["status"], "configured");
        assert_eq!(out.artifacts[0].name, "stripe_integration");
    }

    #[tokio::test]
    async fn test_service_from_request_context() {
        let step = PlanStep::new("step-1", AgentType::Integration, "setup_integration");
        let ctx = context(
            BuildRequest::new("u", "p", RequestType::IntegrateService, "mail")
                .with_context(json!({"service": "sendgrid"})),
        );

        let out = IntegrationAgent.execute(&step, &ctx).await.unwrap();
        assert_eq!(out.output["service"], "sendgrid");
    }

    #[tokio::test]
    async fn test_default_service_and_invalid_name() {
        let ctx = context(BuildRequest::new("u", "p", RequestType::IntegrateService, "x"));

        let step = PlanStep::new("step-1", AgentType::Integration, "setup_integration");
        let out = IntegrationAgent.execute(&step, &ctx).await.unwrap();
        assert_eq!(out.output["service"], DEFAULT_SERVICE);

        let step = step.with_parameters(json!({"service": 42}));
        let failure = IntegrationAgent.execute(&step, &ctx).await.unwrap_err();
        assert_eq!(failure.kind.as_deref(), Some("ValidationError"));
    }
}
