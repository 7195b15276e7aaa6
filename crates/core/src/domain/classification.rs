use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Absorbed by automatic retries.
    Minor,
    /// Needs user confirmation or a longer wait.
    Moderate,
    /// Stop immediately.
    Critical,
    /// Unrecoverable.
    Fatal,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Critical => "critical",
            Self::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    RateLimit,
    Validation,
    Dependency,
    Internal,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Validation => "validation",
            Self::Dependency => "dependency",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Retry,
    Skip,
    Abort,
    Manual,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Abort => "abort",
            Self::Manual => "manual",
        }
    }

    /// Guidance lines a UI can render for this action.
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            Self::Retry => &["The system is retrying automatically", "Please wait..."],
            Self::Skip => &["Skip the current task", "Continue with the remaining tasks"],
            Self::Abort => &[
                "Stop the build",
                "Inspect the error details",
                "Contact support",
            ],
            Self::Manual => &[
                "Check the input parameters",
                "Resubmit after correcting them",
                "Or contact support",
            ],
        }
    }
}

/// Judgment about one failure. Recomputed from the causing error every time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ErrorClassification {
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub is_retryable: bool,
    pub suggested_action: SuggestedAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// User-facing explanation.
    pub message: String,
}

impl ErrorClassification {
    /// Classification used when the classifier itself cannot produce one.
    pub fn classifier_failure() -> Self {
        Self {
            severity: ErrorSeverity::Critical,
            category: ErrorCategory::Unknown,
            is_retryable: false,
            suggested_action: SuggestedAction::Abort,
            retry_delay_ms: None,
            max_retries: None,
            message: "Error classification failed, manual handling required".to_string(),
        }
    }

    pub fn max_retries_or(&self, default: u32) -> u32 {
        self.max_retries.unwrap_or(default)
    }

    pub fn base_delay_or(&self, default: u64) -> u64 {
        self.retry_delay_ms.unwrap_or(default)
    }

    pub fn should_retry(&self, retry_count: u32, default_max: u32) -> bool {
        self.is_retryable && retry_count < self.max_retries_or(default_max)
    }
}
