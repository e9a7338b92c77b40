//! Error types for diaghub.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Store mutation never fails; errors come from
//! validation at the service boundary, from pull-based producers, from
//! cancellation, or from the notification worker going away.

use thiserror::Error;

use crate::cancel::Cancelled;
use crate::ids::ProducerId;

/// Validation errors raised at the service boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Producer {producer} is already registered")]
    DuplicateProducer {
        producer: ProducerId,
    },

    #[error("Producer {producer} is not registered")]
    UnknownProducer {
        producer: ProducerId,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised while running a query or waiting on the queue.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Producer '{producer}' failed: {message}")]
    ProducerFailed {
        producer: String,
        message: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("{operation} called on the notification worker would wait on itself")]
    WorkerReentry {
        operation: String,
    },
}

/// Top-level error type for diaghub.
#[derive(Debug, Error)]
pub enum DiagError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<Cancelled> for ExecutionError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<Cancelled> for DiagError {
    fn from(c: Cancelled) -> Self {
        Self::Execution(c.into())
    }
}

impl DiagError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the operation was cancelled by its caller.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Cancelled))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::ProducerFailed { .. }
            ),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for diaghub operations.
pub type DiagResult<T> = Result<T, DiagError>;
