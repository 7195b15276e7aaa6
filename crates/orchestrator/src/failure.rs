use serde::{Deserialize, Serialize};

/// A failed agent attempt, as seen by the classifier.
///
/// Agents return failures as values. `status_code` carries the HTTP status of
/// an upstream call when there was one; `kind` is a coarse error name such as
/// `ValidationError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl AgentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            kind: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind("ValidationError")
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self::new(format!("Generation request timed out after {}ms", after_ms))
            .with_kind("TimeoutError")
    }
}

impl std::fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for AgentFailure {}
