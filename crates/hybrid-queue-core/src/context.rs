//! Logging context carried through each hybrid queue operation.

use hybrid_queue_runtime::{MessageId, OverflowId, QueueName};
use tracing::field::Empty;
use tracing::Span;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// Fields describing one facade operation
///
/// Rendered as a `hybrid_queue` tracing span so that every event logged by the
/// encoder, decoder and collaborators inherits them.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContext {
    pub operation: &'static str,
    pub queue_name: QueueName,
    pub force_overflow: Option<bool>,
    pub batch_size: Option<usize>,
    pub max_messages: Option<u32>,
    pub message_id: Option<MessageId>,
    pub overflow_id: Option<OverflowId>,
}

impl OperationContext {
    pub fn new(operation: &'static str, queue_name: &QueueName) -> Self {
        Self {
            operation,
            queue_name: queue_name.clone(),
            force_overflow: None,
            batch_size: None,
            max_messages: None,
            message_id: None,
            overflow_id: None,
        }
    }

    pub fn with_force_overflow(mut self, force_overflow: bool) -> Self {
        self.force_overflow = Some(force_overflow);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    pub fn with_message(mut self, message_id: &MessageId, overflow_id: Option<OverflowId>) -> Self {
        self.message_id = Some(message_id.clone());
        self.overflow_id = overflow_id;
        self
    }

    /// Open a span carrying every populated field
    pub fn span(&self) -> Span {
        let span = tracing::info_span!(
            "hybrid_queue",
            operation = self.operation,
            queue_name = %self.queue_name,
            force_overflow = Empty,
            batch_size = Empty,
            max_messages = Empty,
            message_id = Empty,
            overflow_id = Empty,
        );

        if let Some(force_overflow) = self.force_overflow {
            span.record("force_overflow", force_overflow);
        }
        if let Some(batch_size) = self.batch_size {
            span.record("batch_size", batch_size);
        }
        if let Some(max_messages) = self.max_messages {
            span.record("max_messages", max_messages);
        }
        if let Some(message_id) = &self.message_id {
            span.record("message_id", tracing::field::display(message_id));
        }
        if let Some(overflow_id) = &self.overflow_id {
            span.record("overflow_id", tracing::field::display(overflow_id));
        }

        span
    }
}
