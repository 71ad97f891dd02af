//! Error types for hybrid queue operations.

use hybrid_queue_runtime::{MessageId, OverflowId, QueueError, StorageError, ValidationError};
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Standard result type for hybrid queue operations
pub type HybridQueueResult<T> = Result<T, HybridQueueError>;

/// Longest value echoed back in a conversion error
const MAX_ECHOED_VALUE_CHARS: usize = 64;

/// Errors surfaced by the hybrid queue facade
#[derive(Debug, Error)]
pub enum HybridQueueError {
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    #[error(
        "Failed to decode message {message_id}{}: {reason}",
        describe_overflow(.overflow_id)
    )]
    DecodeFailure {
        message_id: MessageId,
        overflow_id: Option<OverflowId>,
        reason: String,
    },

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Queue transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Overflow store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cannot convert '{value}' to {type_name}: {message}")]
    Conversion {
        type_name: &'static str,
        value: String,
        message: String,
    },

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

fn describe_overflow(overflow_id: &Option<OverflowId>) -> String {
    match overflow_id {
        Some(id) => format!(" (overflow object {})", id),
        None => String::new(),
    }
}

/// Coarse classification used by callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The same call will fail again
    Permanent,
    /// A collaborator reported a condition that may clear on retry
    Transient,
    /// The caller gave up
    Cancelled,
}

impl HybridQueueError {
    pub(crate) fn invalid_argument(argument: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn conversion(
        type_name: &'static str,
        value: &str,
        message: impl Into<String>,
    ) -> Self {
        let value = if value.chars().count() > MAX_ECHOED_VALUE_CHARS {
            let truncated: String = value.chars().take(MAX_ECHOED_VALUE_CHARS).collect();
            format!("{}...", truncated)
        } else {
            value.to_string()
        };

        Self::Conversion {
            type_name,
            value,
            message: message.into(),
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Storage(e) => e.is_transient(),
            Self::InvalidArgument { .. }
            | Self::DecodeFailure { .. }
            | Self::InvariantViolation { .. }
            | Self::Conversion { .. }
            | Self::Serialization(_)
            | Self::Cancelled => false,
        }
    }

    /// Get error category for retry decisions and exit codes
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled => ErrorCategory::Cancelled,
            _ if self.is_transient() => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// True when a delete was rejected because the pop receipt no longer holds the lease
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::Transport(QueueError::PreconditionFailed { .. }))
    }
}

impl From<ValidationError> for HybridQueueError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Required { field } => Self::InvalidArgument {
                argument: field,
                message: "value is required".to_string(),
            },
            ValidationError::InvalidFormat { field, message }
            | ValidationError::OutOfRange { field, message } => Self::InvalidArgument {
                argument: field,
                message,
            },
        }
    }
}
