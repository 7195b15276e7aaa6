use chrono::{DateTime, Utc};
use forge_core::{AgentType, ErrorClassification};
use uuid::Uuid;

use super::{datetime_to_timestamp, timestamp_to_datetime};

/// What happened after a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorResolution {
    /// Absorbed by the retry loop.
    Retrying,
    #[default]
    Unresolved,
    UserInterventionRequired,
    Resolved,
}

impl ErrorResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrying => "retrying",
            Self::Unresolved => "unresolved",
            Self::UserInterventionRequired => "user_intervention_required",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "retrying" => Some(Self::Retrying),
            "unresolved" => Some(Self::Unresolved),
            "user_intervention_required" => Some(Self::UserInterventionRequired),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ErrorRecordRow {
    pub id: String,
    pub session_id: String,
    pub step_id: String,
    pub agent_type: String,
    pub message: String,
    pub severity: String,
    pub category: String,
    pub classification: String,
    pub context: String,
    pub retry_count: i64,
    pub resolution: String,
    pub created_at: i64,
}

/// A persisted step failure with the classification that was computed for it
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub step_id: String,
    pub agent_type: Option<AgentType>,
    pub message: String,
    pub classification: Option<ErrorClassification>,
    pub context: serde_json::Value,
    pub retry_count: u32,
    pub resolution: ErrorResolution,
    pub created_at: DateTime<Utc>,
}

impl ErrorRecordRow {
    pub fn into_domain(self) -> ErrorRecord {
        ErrorRecord {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            session_id: Uuid::parse_str(&self.session_id).unwrap_or_default(),
            step_id: self.step_id,
            agent_type: AgentType::parse(&self.agent_type),
            message: self.message,
            classification: serde_json::from_str(&self.classification).ok(),
            context: serde_json::from_str(&self.context).unwrap_or(serde_json::Value::Null),
            retry_count: u32::try_from(self.retry_count).unwrap_or_default(),
            resolution: ErrorResolution::parse(&self.resolution).unwrap_or_default(),
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

/// Input for recording a failure
#[derive(Debug, Clone)]
pub struct CreateErrorRecord {
    pub session_id: Uuid,
    pub step_id: String,
    pub agent_type: AgentType,
    pub message: String,
    pub classification: ErrorClassification,
    pub context: serde_json::Value,
    pub retry_count: u32,
    pub resolution: ErrorResolution,
}

impl CreateErrorRecord {
    pub fn new(
        session_id: Uuid,
        step_id: impl Into<String>,
        agent_type: AgentType,
        message: impl Into<String>,
        classification: ErrorClassification,
    ) -> Self {
        Self {
            session_id,
            step_id: step_id.into(),
            agent_type,
            message: message.into(),
            classification,
            context: serde_json::Value::Null,
            retry_count: 0,
            resolution: ErrorResolution::Unresolved,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_resolution(mut self, resolution: ErrorResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub(crate) fn created_at() -> i64 {
        datetime_to_timestamp(Utc::now())
    }
}
