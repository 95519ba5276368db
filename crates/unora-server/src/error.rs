//! User-facing error taxonomy for engine operations.

use unora_core::db::{BusyError, DatabaseError};

/// Errors returned by the matching, streak, nudge and reveal engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing entity, or the caller is not a participant.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate action.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Action not valid for the current streak or reveal state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A participant has no free connection slot.
    #[error("Capacity reached: {0}")]
    CapacityReached(String),

    /// Malformed request input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            Self::CapacityReached(_) => "CAPACITY_REACHED",
            Self::InvalidInput(_) => "BAD_REQUEST",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DatabaseError> for EngineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            DatabaseError::Conflict(what) => Self::Conflict(what),
            other => Self::Storage(other),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        DatabaseError::from(e).into()
    }
}

impl BusyError for EngineError {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_busy())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
