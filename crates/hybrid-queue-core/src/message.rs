//! Reconstructed messages and the leases needed to delete them.

use hybrid_queue_runtime::{MessageId, OverflowId, PopReceipt, Timestamp};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Proof of ownership of a delivered message
///
/// Valid until the visibility window of the delivery expires. The overflow id is
/// present when the message body referenced an overflow object, which is then
/// deleted together with the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageLease {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_id: Option<OverflowId>,
}

impl MessageLease {
    pub fn new(
        message_id: MessageId,
        pop_receipt: PopReceipt,
        overflow_id: Option<OverflowId>,
    ) -> Self {
        Self {
            message_id,
            pop_receipt,
            overflow_id,
        }
    }
}

/// A queue entry with its payload resolved
#[derive(Debug, Clone, PartialEq)]
pub struct HybridMessage<T> {
    content: T,
    lease: MessageLease,
    dequeue_count: u32,
    inserted_at: Timestamp,
}

impl<T> HybridMessage<T> {
    pub(crate) fn new(
        content: T,
        lease: MessageLease,
        dequeue_count: u32,
        inserted_at: Timestamp,
    ) -> Self {
        Self {
            content,
            lease,
            dequeue_count,
            inserted_at,
        }
    }

    /// The decoded payload
    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn message_id(&self) -> &MessageId {
        &self.lease.message_id
    }

    pub fn pop_receipt(&self) -> &PopReceipt {
        &self.lease.pop_receipt
    }

    /// Set when the payload was read from the overflow store
    pub fn overflow_id(&self) -> Option<OverflowId> {
        self.lease.overflow_id
    }

    /// How many times the transport has delivered this message
    pub fn dequeue_count(&self) -> u32 {
        self.dequeue_count
    }

    pub fn inserted_at(&self) -> &Timestamp {
        &self.inserted_at
    }

    pub fn lease(&self) -> &MessageLease {
        &self.lease
    }

    pub fn into_content(self) -> T {
        self.content
    }

    /// Split into the payload and the lease needed to delete the message
    pub fn into_parts(self) -> (T, MessageLease) {
        (self.content, self.lease)
    }
}
