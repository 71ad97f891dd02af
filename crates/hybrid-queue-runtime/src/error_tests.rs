//! Tests for error types.

use super::*;

#[test]
fn test_queue_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    }
    .is_transient());

    assert!(!QueueError::PreconditionFailed {
        message_id: "1".to_string(),
        message: "pop receipt mismatch".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());
}

#[test]
fn test_timeout_is_transient() {
    let timeout = QueueError::Timeout {
        duration: chrono::Duration::seconds(30),
    };
    assert!(timeout.is_transient());
    assert!(timeout.to_string().contains("timed out"));
}

#[test]
fn test_storage_error_classification() {
    let missing = StorageError::NotFound {
        key: "abc".to_string(),
    };
    assert!(missing.is_not_found());
    assert!(!missing.is_transient());

    assert!(StorageError::Timeout { timeout_ms: 100 }.is_transient());
    assert!(StorageError::InternalError {
        message: "busy".to_string()
    }
    .is_transient());
    assert!(StorageError::ServiceError {
        status: 503,
        code: "ServerBusy".to_string(),
        message: "try later".to_string(),
    }
    .is_transient());
    assert!(!StorageError::ServiceError {
        status: 400,
        code: "InvalidHeaderValue".to_string(),
        message: "bad".to_string(),
    }
    .is_transient());
    assert!(!StorageError::PermissionDenied {
        operation: "delete".to_string()
    }
    .is_transient());
}

#[test]
fn test_precondition_failed_message_names_the_message() {
    let err = QueueError::PreconditionFailed {
        message_id: "msg-1".to_string(),
        message: "stale".to_string(),
    };
    assert!(err.to_string().contains("msg-1"));
}
