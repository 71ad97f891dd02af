//! Error types for queue transport and overflow store operations.

use chrono::Duration;
use thiserror::Error;

/// Errors raised by a [`QueueTransport`](crate::client::QueueTransport).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    /// The pop receipt no longer grants ownership of the message, either because
    /// the visibility window expired or because the message was received again.
    #[error("Precondition failed for message {message_id}: {message}")]
    PreconditionFailed { message_id: String, message: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::PreconditionFailed { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true, // Throttling and server busy land here
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }
}

/// Errors raised by an [`OverflowStore`](crate::client::OverflowStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection to storage service failed
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Authentication with storage service failed
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// No object exists under the requested key
    #[error("Overflow object not found: {key}")]
    NotFound { key: String },

    /// Permission denied for operation
    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },

    /// Invalid object path
    #[error("Invalid object path: {path}")]
    InvalidPath { path: String },

    /// Network timeout
    #[error("Network timeout: {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The storage service rejected the request
    #[error("Storage service error ({status}): {code} - {message}")]
    ServiceError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    /// Internal storage error
    #[error("Internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Check if error is transient and worth retrying
    ///
    /// Connection failures, timeouts and internal service errors may resolve on
    /// their own. A missing object, an authentication failure or a permission
    /// problem will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::InternalError { .. } => {
                true
            }
            Self::ServiceError { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Check if the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors during message body encoding on the wire
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("XML serialization failed: {message}")]
    Xml { message: String },

    #[error("Message body is not valid base64: {message}")]
    InvalidBase64 { message: String },

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
