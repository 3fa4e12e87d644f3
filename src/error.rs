//! Unified error handling for omnitrace
//!
//! This module provides a centralized error type for the tracing engine. It
//! implements error categorization for:
//! - Contract errors (double initialize/finalize, surfaced to the caller)
//! - Backend errors (roctracer/HSA registration failures, tracing degrades)
//! - Internal errors (bugs, poisoned locks)

use thiserror::Error;

/// Unified error type for the tracing engine
///
/// Internal errors never propagate into the traced application; the tracer is
/// best-effort. Contract errors are the exception: they are raised back to
/// whoever violated the session contract (e.g. a second `initialize`).
#[derive(Debug, Error)]
pub enum OmnitraceError {
    /// Trace session was already established
    #[error("omnitrace is already initialized")]
    AlreadyInitialized,

    /// Trace session was already torn down
    #[error("omnitrace is already finalized")]
    AlreadyFinalized,

    /// roctracer/HSA runtime registration or query failed
    #[error("roctracer error: {0}")]
    Roctracer(#[from] crate::backend::roctracer::RoctracerError),

    /// A user-supplied filter pattern failed to compile
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Lock poisoned (indicates a bug on another thread)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for OmnitraceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        OmnitraceError::LockPoisoned(err.to_string())
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session-contract violation - raised to the caller
    Contract,
    /// Runtime registration/query failure - tracing degrades, load continues
    Backend,
    /// Internal error - indicates a bug
    Internal,
}

impl OmnitraceError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            OmnitraceError::AlreadyInitialized
            | OmnitraceError::AlreadyFinalized
            | OmnitraceError::InvalidPattern { .. } => ErrorCategory::Contract,
            OmnitraceError::Roctracer(_) => ErrorCategory::Backend,
            OmnitraceError::LockPoisoned(_) | OmnitraceError::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this error should be raised back to the caller
    ///
    /// Everything else is logged and swallowed: the tracer must not crash the
    /// host application.
    pub fn is_contract_error(&self) -> bool {
        self.category() == ErrorCategory::Contract
    }
}

/// Result type used throughout the tracing engine
pub type TraceResult<T> = std::result::Result<T, OmnitraceError>;
