use forge_core::AgentStatus;

use crate::error::{OrchestratorError, Result};

/// Allowed status transitions for one step.
///
/// `failed` is terminal for the automatic loop; only a manual re-submission
/// moves it back to `pending`.
pub struct StepStateMachine;

impl StepStateMachine {
    pub fn validate_transition(from: &AgentStatus, to: &AgentStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &AgentStatus) -> Vec<AgentStatus> {
        match from {
            AgentStatus::Idle => vec![AgentStatus::Pending],
            AgentStatus::Pending => vec![AgentStatus::InProgress, AgentStatus::Skipped],
            AgentStatus::InProgress => vec![
                AgentStatus::Completed,
                AgentStatus::Retrying,
                AgentStatus::Failed,
            ],
            AgentStatus::Retrying => vec![AgentStatus::InProgress],
            AgentStatus::Failed => vec![AgentStatus::Pending],
            AgentStatus::Completed | AgentStatus::Skipped => vec![],
        }
    }

    pub fn can_transition(from: &AgentStatus, to: &AgentStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StepStateMachine::can_transition(
            &AgentStatus::Pending,
            &AgentStatus::InProgress
        ));
        assert!(StepStateMachine::can_transition(
            &AgentStatus::InProgress,
            &AgentStatus::Retrying
        ));
        assert!(StepStateMachine::can_transition(
            &AgentStatus::Retrying,
            &AgentStatus::InProgress
        ));
        assert!(StepStateMachine::can_transition(
            &AgentStatus::Pending,
            &AgentStatus::Skipped
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!StepStateMachine::can_transition(
            &AgentStatus::Pending,
            &AgentStatus::Completed
        ));
        assert!(!StepStateMachine::can_transition(
            &AgentStatus::Retrying,
            &AgentStatus::Completed
        ));
        assert!(!StepStateMachine::can_transition(
            &AgentStatus::Completed,
            &AgentStatus::Pending
        ));
        assert!(!StepStateMachine::can_transition(
            &AgentStatus::Skipped,
            &AgentStatus::InProgress
        ));
    }

    #[test]
    fn test_manual_reset() {
        assert!(StepStateMachine::can_transition(
            &AgentStatus::Failed,
            &AgentStatus::Pending
        ));
        assert!(!StepStateMachine::can_transition(
            &AgentStatus::Failed,
            &AgentStatus::InProgress
        ));
    }

    #[test]
    fn test_error_message() {
        let err =
            StepStateMachine::validate_transition(&AgentStatus::Completed, &AgentStatus::Failed)
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition from completed to failed"
        );
    }
}
