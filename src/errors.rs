use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Session {session} does not hold the write lock on {key}")]
    LockNotHeld { key: String, session: String },

    #[error("Transaction conflict detected: {0}")]
    Conflict(String),

    #[error("Session {0} is already committed or aborted")]
    SessionClosed(String),

    #[error("Schedule references undeclared session {0}")]
    UnknownSession(String),

    #[error("Session {0} declared more than once")]
    DuplicateSession(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scenario error: {0}")]
    Scenario(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
