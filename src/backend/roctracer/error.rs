//! roctracer error types

use thiserror::Error;

/// roctracer error types
#[derive(Error, Debug, Clone)]
pub enum RoctracerError {
    #[error("{call} failed with status {status}")]
    Status { call: &'static str, status: i32 },
    #[error("timestamp query failed: {0}")]
    Timestamp(String),
    #[error("unknown operation name: {0}")]
    UnknownOp(String),
    #[error("runtime returned a null pointer from {0}")]
    NullPointer(&'static str),
    #[error("internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for RoctracerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        RoctracerError::LockPoisoned(format!("lock poisoned: {}", err))
    }
}

/// roctracer result type
pub type RoctracerResult<T> = Result<T, RoctracerError>;
