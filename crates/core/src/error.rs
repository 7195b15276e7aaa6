use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Unknown request type: {0}")]
    UnknownRequestType(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
