use crate::error::AutoAssignError;
use thiserror::Error;

/// Error types for queue entry state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition for entry {entry_id} from {from} to {to}")]
    InvalidTransition {
        entry_id: i64,
        from: String,
        to: String,
    },

    #[error("Invitation for entry {entry_id} expired")]
    InvitationExpired { entry_id: i64 },

    #[error("Invitation for entry {entry_id} has not reached its deadline")]
    DeadlineNotReached { entry_id: i64 },

    #[error("Invalid transition payload: {0}")]
    InvalidPayload(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for AutoAssignError {
    fn from(error: StateMachineError) -> Self {
        match error {
            StateMachineError::InvalidTransition { entry_id, from, to } => {
                AutoAssignError::InvalidTransition { entry_id, from, to }
            }
            StateMachineError::InvitationExpired { entry_id } => {
                AutoAssignError::InvitationExpired { entry_id }
            }
            StateMachineError::DeadlineNotReached { entry_id } => {
                AutoAssignError::InvitationStillOpen { entry_id }
            }
            StateMachineError::InvalidPayload(message) => AutoAssignError::Validation(message),
        }
    }
}
