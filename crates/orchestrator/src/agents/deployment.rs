use async_trait::async_trait;
use chrono::Utc;
use forge_core::{AgentType, Artifact, PlanStep};
use serde_json::json;

use super::{Agent, AgentContext, AgentOutput};
use crate::failure::AgentFailure;

const DEFAULT_ENVIRONMENT: &str = "development";

/// Produces a deployment descriptor for the request's project.
pub struct DeploymentAgent;

impl DeploymentAgent {
    pub fn url(project_id: &str) -> String {
        format!("https://app-{}.example.com", project_id)
    }
}

#[async_trait]
impl Agent for DeploymentAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Deployment
    }

    async fn execute(
        &self,
        step: &PlanStep,
        ctx: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure> {
        if ctx.request.project_id.trim().is_empty() {
            return Err(AgentFailure::validation(
                "Deployment requires a project id",
            ));
        }

        let environment = step
            .parameters
            .get("environment")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string();
        ctx.report_progress(50, format!("Deploying to {}", environment));

        let url = Self::url(&ctx.request.project_id);
        let output = json!({
            "type": "deployment",
            "environment": environment,
            "status": "deployed",
            "url": url,
            "metadata": {
                "generated_by": AgentType::Deployment.display_name(),
                "timestamp": Utc::now().to_rfc3339(),
            },
        });

        Ok(AgentOutput::new(output.clone())
            .with_artifact(Artifact::new(
                "deployment",
                format!("deployment-{}", environment),
                output,
            ))
            .with_summary(format!("Deployed to {} at {}", environment, url)))
    }
}
