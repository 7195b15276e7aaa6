//! Event types for the build orchestration event system

use chrono::{DateTime, Utc};
use forge_core::{AgentStatus, AgentType, ErrorClassification, PlanStatus, RequestType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.event.session_id()
    }
}

/// Which step transition an [`AgentStatusEvent`] reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Started,
    Progress,
    Retrying,
    Completed,
    Failed,
    Skipped,
    /// Manual re-submission put the step back to pending.
    Reset,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Reset => "reset",
        }
    }
}

/// Status change of one step, as seen by session subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AgentStatusEvent {
    pub session_id: Uuid,
    pub status_id: Uuid,
    pub step_id: String,
    pub agent_type: AgentType,
    pub transition: Transition,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorClassification>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retrying: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    pub critical: bool,
    #[serde(default)]
    pub recovered: bool,
    pub timestamp: DateTime<Utc>,
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A step changed status
    #[serde(rename = "agent.status")]
    AgentStatus(AgentStatusEvent),

    /// A request was decomposed and validated, execution is about to start
    #[serde(rename = "plan.accepted")]
    PlanAccepted {
        session_id: Uuid,
        request_id: Uuid,
        request_type: RequestType,
        total_steps: usize,
        fallback: bool,
    },

    /// The scheduling loop terminated
    #[serde(rename = "plan.finished")]
    PlanFinished {
        session_id: Uuid,
        request_id: Uuid,
        status: PlanStatus,
        completed_steps: usize,
        total_steps: usize,
    },

    /// The plan was cancelled by an external actor
    #[serde(rename = "plan.cancelled")]
    PlanCancelled { session_id: Uuid, request_id: Uuid },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        session_id: Option<Uuid>,
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Get the session ID associated with this event, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Event::AgentStatus(status) => Some(status.session_id),
            Event::PlanAccepted { session_id, .. } => Some(*session_id),
            Event::PlanFinished { session_id, .. } => Some(*session_id),
            Event::PlanCancelled { session_id, .. } => Some(*session_id),
            Event::Error { session_id, .. } => *session_id,
        }
    }

    pub fn as_status(&self) -> Option<&AgentStatusEvent> {
        match self {
            Event::AgentStatus(status) => Some(status),
            _ => None,
        }
    }
}
