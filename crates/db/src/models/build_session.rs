use chrono::{DateTime, Utc};
use forge_core::{BuildRequest, RequestType};
use uuid::Uuid;

use super::{datetime_to_timestamp, timestamp_to_datetime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildSessionStatus {
    #[default]
    Running,
    Success,
    Failed,
    Cancelled,
}

impl BuildSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BuildSessionRow {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub request_type: String,
    pub description: String,
    pub status: String,
    pub total_steps: i64,
    pub completed_steps: i64,
    pub fallback: bool,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
}

/// Audit row for one build request's lifecycle
#[derive(Debug, Clone)]
pub struct BuildSession {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: String,
    pub request_type: Option<RequestType>,
    pub description: String,
    pub status: BuildSessionStatus,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub fallback: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildSession {
    pub fn from_request(request: &BuildRequest, total_steps: usize, fallback: bool) -> Self {
        let now = Utc::now();
        Self {
            id: request.session_id(),
            user_id: request.user_id.clone(),
            project_id: request.project_id.clone(),
            request_type: Some(request.request_type),
            description: request.description.clone(),
            status: BuildSessionStatus::Running,
            total_steps,
            completed_steps: 0,
            fallback,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}

impl BuildSessionRow {
    pub fn into_domain(self) -> BuildSession {
        BuildSession {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            user_id: self.user_id,
            project_id: self.project_id,
            request_type: RequestType::parse(&self.request_type),
            description: self.description,
            status: BuildSessionStatus::parse(&self.status).unwrap_or_default(),
            total_steps: usize::try_from(self.total_steps).unwrap_or_default(),
            completed_steps: usize::try_from(self.completed_steps).unwrap_or_default(),
            fallback: self.fallback,
            error: self.error,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
            finished_at: self.finished_at.map(timestamp_to_datetime),
        }
    }
}

impl From<&BuildSession> for BuildSessionRow {
    fn from(session: &BuildSession) -> Self {
        Self {
            id: session.id.to_string(),
            user_id: session.user_id.clone(),
            project_id: session.project_id.clone(),
            request_type: session
                .request_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            description: session.description.clone(),
            status: session.status.as_str().to_string(),
            total_steps: session.total_steps as i64,
            completed_steps: session.completed_steps as i64,
            fallback: session.fallback,
            error: session.error.clone(),
            created_at: datetime_to_timestamp(session.created_at),
            updated_at: datetime_to_timestamp(session.updated_at),
            finished_at: session.finished_at.map(datetime_to_timestamp),
        }
    }
}
