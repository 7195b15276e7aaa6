use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ErrorClassification;
use crate::error::CoreError;

/// Capability name an agent is registered under.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Ui,
    Backend,
    Database,
    Integration,
    Deployment,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Ui,
        AgentType::Backend,
        AgentType::Database,
        AgentType::Integration,
        AgentType::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Backend => "backend",
            Self::Database => "database",
            Self::Integration => "integration",
            Self::Deployment => "deployment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ui" => Some(Self::Ui),
            "backend" => Some(Self::Backend),
            "database" => Some(Self::Database),
            "integration" => Some(Self::Integration),
            "deployment" => Some(Self::Deployment),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ui => "UIAgent",
            Self::Backend => "BackendAgent",
            Self::Database => "DatabaseAgent",
            Self::Integration => "IntegrationAgent",
            Self::Deployment => "DeploymentAgent",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ui => "Creates user interfaces, components, layouts",
            Self::Backend => "Handles APIs, business logic, server-side code",
            Self::Database => "Designs schemas, manages data models",
            Self::Integration => "Connects external services and APIs",
            Self::Deployment => "Handles app deployment and infrastructure",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownAgentType(s.to_string()))
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of one dispatched step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    #[default]
    Pending,
    InProgress,
    Retrying,
    Completed,
    Failed,
    /// Never dispatched because a dependency failed or the plan stopped.
    Skipped,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "retrying" => Some(Self::Retrying),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// In flight from the scheduler's point of view.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Retrying)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of one step's execution within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AgentStatusRecord {
    pub status_id: Uuid,
    pub session_id: Uuid,
    pub step_id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub task_description: String,
    pub progress_percentage: u8,
    pub current_operation: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub classification: Option<ErrorClassification>,
    pub result_summary: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AgentStatusRecord {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(
        session_id: Uuid,
        step_id: impl Into<String>,
        agent_type: AgentType,
        task_description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            status_id: Uuid::new_v4(),
            session_id,
            step_id: step_id.into(),
            agent_type,
            status: AgentStatus::Pending,
            task_description: task_description.into(),
            progress_percentage: 0,
            current_operation: None,
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            error_message: None,
            classification: None,
            result_summary: None,
            start_time: now,
            end_time: None,
            updated_at: now,
        }
    }

    pub fn set_progress(&mut self, percentage: u8) {
        self.progress_percentage = percentage.min(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!(AgentType::parse("ui"), Some(AgentType::Ui));
        assert_eq!(AgentType::parse(" Database "), Some(AgentType::Database));
        assert_eq!(AgentType::parse("frontend"), None);
        assert!("frontend".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_serialization() {
        let json = serde_json::to_string(&AgentType::Deployment).unwrap();
        assert_eq!(json, "\"deployment\"");
        assert_eq!(AgentType::Ui.display_name(), "UIAgent");
    }

    #[test]
    fn test_status_terminality() {
        assert!(AgentStatus::Completed.is_terminal());
        assert!(AgentStatus::Failed.is_terminal());
        assert!(!AgentStatus::Retrying.is_terminal());
        assert!(AgentStatus::Retrying.is_active());
        assert!(!AgentStatus::Pending.is_active());
    }

    #[test]
    fn test_record_creation() {
        let session_id = Uuid::new_v4();
        let mut record =
            AgentStatusRecord::new(session_id, "step-1", AgentType::Database, "design_schema");

        assert_eq!(record.status, AgentStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.max_retries, 3);

        record.set_progress(150);
        assert_eq!(record.progress_percentage, 100);
    }
}
