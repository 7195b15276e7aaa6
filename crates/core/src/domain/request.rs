use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    CreateApp,
    ModifyApp,
    DeployApp,
    IntegrateService,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateApp => "create_app",
            Self::ModifyApp => "modify_app",
            Self::DeployApp => "deploy_app",
            Self::IntegrateService => "integrate_service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create_app" => Some(Self::CreateApp),
            "modify_app" => Some(Self::ModifyApp),
            "deploy_app" => Some(Self::DeployApp),
            "integrate_service" => Some(Self::IntegrateService),
            _ => None,
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownRequestType(s.to_string()))
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A high-level build request submitted by a user.
///
/// Immutable once submitted. The orchestrator owns it for the lifetime of
/// one plan run and uses `request_id` as the session identifier for events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BuildRequest {
    pub request_id: Uuid,
    pub user_id: String,
    pub project_id: String,
    pub request_type: RequestType,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Prior structured analysis of the request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub context: Option<serde_json::Value>,
    pub submitted_at: DateTime<Utc>,
}

impl BuildRequest {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        request_type: RequestType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: user_id.into(),
            project_id: project_id.into(),
            request_type,
            description: description.into(),
            requirements: Vec::new(),
            constraints: Vec::new(),
            context: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// The session under which this request's events are grouped.
    pub fn session_id(&self) -> Uuid {
        self.request_id
    }
}
