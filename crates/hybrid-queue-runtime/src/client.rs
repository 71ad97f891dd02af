//! Collaborator traits for the size-limited queue transport and the overflow store.

use crate::error::{QueueError, StorageError};
use crate::message::{
    ContainerName, MessageId, OverflowId, PopReceipt, QueueName, ReceivedQueueMessage, SendOptions,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Hard upper bound on messages returned by a single receive call
pub const MAX_RECEIVE_BATCH: u32 = 32;

/// Content type stamped on every overflow object
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message transport with a hard per-message byte limit
///
/// Bodies travel as UTF-8 strings. Implementations assign the message id and
/// hand out a fresh pop receipt on every delivery; deleting requires both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create the queue if absent. Returns `true` when it was created.
    async fn create_if_not_exists(&self) -> Result<bool, QueueError>;

    /// Enqueue a single message body
    async fn send_message(&self, body: &str, options: &SendOptions) -> Result<(), QueueError>;

    /// Dequeue up to `max_messages` messages, hiding them for `visibility_timeout`
    /// (or the transport default when `None`).
    async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedQueueMessage>, QueueError>;

    /// Delete a message previously received
    ///
    /// Fails with [`QueueError::PreconditionFailed`] when the pop receipt is stale.
    async fn delete_message(
        &self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError>;

    /// Name of the underlying queue
    fn queue_name(&self) -> &QueueName;

    /// Largest body, in UTF-8 bytes, that may be sent inline
    fn max_message_bytes(&self) -> usize;
}

/// Unbounded object store used for payloads that do not fit on the queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverflowStore: Send + Sync {
    /// Create the container if absent. Returns `true` when it was created.
    async fn create_if_not_exists(&self) -> Result<bool, StorageError>;

    /// Store a new object under `id`
    async fn upload(
        &self,
        id: &OverflowId,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Read an object's full content
    ///
    /// Fails with [`StorageError::NotFound`] when no object exists under `id`.
    async fn open_read(&self, id: &OverflowId) -> Result<Bytes, StorageError>;

    /// Delete an object. Returns `false` when there was nothing to delete.
    async fn delete_if_exists(&self, id: &OverflowId) -> Result<bool, StorageError>;

    /// Name of the container holding overflow objects
    fn container_name(&self) -> &ContainerName;
}
