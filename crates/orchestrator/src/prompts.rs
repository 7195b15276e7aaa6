use forge_core::{AgentType, BuildRequest, PlanStep};

pub struct PlanPrompts;

impl PlanPrompts {
    pub fn decomposition(request: &BuildRequest) -> String {
        let agents = AgentType::ALL
            .iter()
            .map(|t| format!("- {}: {}", t.as_str(), t.description()))
            .collect::<Vec<_>>()
            .join("\n");

        let context = request
            .context
            .as_ref()
            .map(|c| format!("\n## Prior Analysis\n{}\n", c))
            .unwrap_or_default();

        format!(
            r#"Analyze this app building request and create an execution plan.

## Request
**Type:** {request_type}
**Description:** {description}
**Requirements:** {requirements}
**Constraints:** {constraints}
{context}
## Available Agents
{agents}

## Required Output
Respond with a JSON array only, one object per step:
[
  {{
    "id": "step-1",
    "agentType": "agent_name",
    "action": "specific_action",
    "parameters": {{ "key": "value" }},
    "critical": true,
    "dependencies": ["step ids this step needs"]
  }}
]

Consider dependencies between steps and mark critical the steps whose failure must stop the whole build."#,
            request_type = request.request_type,
            description = request.description,
            requirements = join_or_none(&request.requirements),
            constraints = join_or_none(&request.constraints),
            context = context,
            agents = agents,
        )
    }

    pub fn agent_system(agent_type: AgentType) -> &'static str {
        match agent_type {
            AgentType::Ui => {
                "You are a UI/UX specialist. Create modern, responsive and accessible interfaces. \
                 Respond with a JSON object containing components, styles and documentation."
            }
            AgentType::Backend => {
                "You are a backend engineer. Design APIs, business logic and server-side code. \
                 Respond with a JSON object containing endpoints, models and documentation."
            }
            AgentType::Database => {
                "You are a database architect. Design normalized schemas and data models. \
                 Respond with a JSON object containing tables, relations and migrations."
            }
            AgentType::Integration => {
                "You are an integration engineer. Connect external services and APIs."
            }
            AgentType::Deployment => {
                "You are a deployment engineer. Handle app deployment and infrastructure."
            }
        }
    }

    pub fn agent_task(step: &PlanStep, request: &BuildRequest) -> String {
        format!(
            r#"Perform the action `{action}` for this application.

## Application
**Project:** {project}
**Description:** {description}
**Requirements:** {requirements}

## Parameters
{parameters}

Return the result as a JSON object."#,
            action = step.action,
            project = request.project_id,
            description = request.description,
            requirements = join_or_none(&request.requirements),
            parameters = step.parameters,
        )
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None specified".to_string()
    } else {
        items.join(", ")
    }
}
