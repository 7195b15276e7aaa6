//! Failure classification
//!
//! Maps a failed attempt to an [`ErrorClassification`]. Categories are tried
//! in a fixed order and the first match wins: network, timeout, rate limit,
//! validation, dependency, internal. Anything else is `unknown`, which is
//! conservative: moderate severity, not retryable, manual handling.

use forge_core::{ErrorCategory, ErrorClassification, ErrorSeverity, SuggestedAction};
use regex::RegexSet;
use thiserror::Error;

use crate::failure::AgentFailure;

#[derive(Debug, Error)]
#[error("classifier failed: {0}")]
pub struct ClassifierError(pub String);

/// Seam for failure classification. Implementations must be pure: the same
/// failure always yields the same classification.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, failure: &AgentFailure) -> Result<ErrorClassification, ClassifierError>;
}

#[derive(Debug, Clone, Copy)]
struct Policy {
    severity: ErrorSeverity,
    is_retryable: bool,
    suggested_action: SuggestedAction,
    retry_delay_ms: Option<u64>,
    max_retries: Option<u32>,
    message: &'static str,
}

struct CategoryRule {
    category: ErrorCategory,
    patterns: RegexSet,
    status_codes: &'static [u16],
    kind: Option<&'static str>,
    policy: Policy,
}

impl CategoryRule {
    fn matches(&self, failure: &AgentFailure) -> bool {
        if self.patterns.is_match(&failure.message) {
            return true;
        }
        if let Some(code) = failure.status_code {
            if self.status_codes.contains(&code) {
                return true;
            }
        }
        matches!((self.kind, failure.kind.as_deref()), (Some(a), Some(b)) if a == b)
    }
}

const UNKNOWN: Policy = Policy {
    severity: ErrorSeverity::Moderate,
    is_retryable: false,
    suggested_action: SuggestedAction::Manual,
    retry_delay_ms: None,
    max_retries: None,
    message: "An unexpected error occurred, manual handling required",
};

/// Default pattern-based classifier.
pub struct ErrorClassifier {
    rules: Vec<CategoryRule>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        let rules = vec![
            CategoryRule {
                category: ErrorCategory::Network,
                patterns: patterns(&[
                    r"(?i)network",
                    r"ECONNREFUSED",
                    r"ECONNRESET",
                    r"ETIMEDOUT",
                    r"EHOSTUNREACH",
                    r"ENETUNREACH",
                    r"(?i)socket hang up",
                ]),
                status_codes: &[],
                kind: None,
                policy: Policy {
                    severity: ErrorSeverity::Minor,
                    is_retryable: true,
                    suggested_action: SuggestedAction::Retry,
                    retry_delay_ms: Some(2000),
                    max_retries: Some(3),
                    message: "Network connection problem, retrying automatically",
                },
            },
            CategoryRule {
                category: ErrorCategory::Timeout,
                patterns: patterns(&[r"(?i)timeout", r"(?i)timed out", r"(?i)time out"]),
                status_codes: &[408],
                kind: Some("TimeoutError"),
                policy: Policy {
                    severity: ErrorSeverity::Minor,
                    is_retryable: true,
                    suggested_action: SuggestedAction::Retry,
                    retry_delay_ms: Some(3000),
                    max_retries: Some(3),
                    message: "The request timed out, retrying",
                },
            },
            CategoryRule {
                category: ErrorCategory::RateLimit,
                patterns: patterns(&[
                    r"(?i)rate limit",
                    r"(?i)too many requests",
                    r"429",
                    r"(?i)quota exceeded",
                    r"(?i)throttl",
                ]),
                status_codes: &[429],
                kind: None,
                policy: Policy {
                    severity: ErrorSeverity::Moderate,
                    is_retryable: true,
                    suggested_action: SuggestedAction::Retry,
                    retry_delay_ms: Some(10_000),
                    max_retries: Some(2),
                    message: "Too many requests, waiting before retrying",
                },
            },
            CategoryRule {
                category: ErrorCategory::Validation,
                patterns: patterns(&[
                    r"(?i)validation",
                    r"(?i)invalid",
                    r"(?i)required",
                    r"(?i)must be",
                    r"(?i)should be",
                    r"400",
                ]),
                status_codes: &[400],
                kind: Some("ValidationError"),
                policy: Policy {
                    severity: ErrorSeverity::Moderate,
                    is_retryable: false,
                    suggested_action: SuggestedAction::Manual,
                    retry_delay_ms: None,
                    max_retries: None,
                    message: "The input is invalid, check the parameters",
                },
            },
            CategoryRule {
                category: ErrorCategory::Dependency,
                patterns: patterns(&[
                    r"(?i)service unavailable",
                    r"503",
                    r"502",
                    r"504",
                    r"(?i)upstream",
                    r"(?i)dependency",
                ]),
                status_codes: &[502, 503, 504],
                kind: None,
                policy: Policy {
                    severity: ErrorSeverity::Moderate,
                    is_retryable: true,
                    suggested_action: SuggestedAction::Retry,
                    retry_delay_ms: Some(5000),
                    max_retries: Some(2),
                    message: "An external service is temporarily unavailable",
                },
            },
            CategoryRule {
                category: ErrorCategory::Internal,
                patterns: patterns(&[
                    r"(?i)internal server error",
                    r"500",
                    r"(?i)uncaught exception",
                    r"(?i)fatal",
                ]),
                status_codes: &[500],
                kind: None,
                policy: Policy {
                    severity: ErrorSeverity::Critical,
                    is_retryable: false,
                    suggested_action: SuggestedAction::Abort,
                    retry_delay_ms: None,
                    max_retries: None,
                    message: "Internal error, please contact support",
                },
            },
        ];

        Self { rules }
    }

    pub fn classify_failure(&self, failure: &AgentFailure) -> ErrorClassification {
        self.rules
            .iter()
            .find(|rule| rule.matches(failure))
            .map(|rule| build(rule.category, rule.policy))
            .unwrap_or_else(|| build(ErrorCategory::Unknown, UNKNOWN))
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureClassifier for ErrorClassifier {
    fn classify(&self, failure: &AgentFailure) -> Result<ErrorClassification, ClassifierError> {
        Ok(self.classify_failure(failure))
    }
}

fn patterns(list: &[&str]) -> RegexSet {
    RegexSet::new(list).expect("Invalid classifier pattern")
}

fn build(category: ErrorCategory, policy: Policy) -> ErrorClassification {
    ErrorClassification {
        severity: policy.severity,
        category,
        is_retryable: policy.is_retryable,
        suggested_action: policy.suggested_action,
        retry_delay_ms: policy.retry_delay_ms,
        max_retries: policy.max_retries,
        message: policy.message.to_string(),
    }
}
