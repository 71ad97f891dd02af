//! Encoding of items into queue bodies and resolution of bodies back into items.
//!
//! The encoder keeps a payload inline when it fits the transport limit and
//! otherwise parks it in the overflow store, sending the object's UUID in its
//! place. The decoder reverses this: any body that parses as a UUID is treated as
//! an overflow reference, even when the producer meant it as a plain value.

use crate::cancellation::Cancellation;
use crate::error::HybridQueueError;
use crate::message::{HybridMessage, MessageLease};
use crate::payload::{PayloadKind, QueuePayload};
use bytes::Bytes;
use hybrid_queue_runtime::{
    MessageId, OverflowId, OverflowStore, ReceivedQueueMessage, JSON_CONTENT_TYPE,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

// ============================================================================
// Encoder
// ============================================================================

/// The wire form of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload<'a> {
    /// Queue body: the inline encoding or an overflow reference
    pub body: Cow<'a, str>,
    /// Set when the payload was routed to the overflow store
    pub overflow_id: Option<OverflowId>,
}

impl EncodedPayload<'_> {
    pub fn is_overflow(&self) -> bool {
        self.overflow_id.is_some()
    }
}

/// Routes items inline or through the overflow store
#[derive(Clone)]
pub struct PayloadEncoder {
    store: Arc<dyn OverflowStore>,
    max_message_bytes: usize,
}

impl PayloadEncoder {
    pub fn new(store: Arc<dyn OverflowStore>, max_message_bytes: usize) -> Self {
        Self {
            store,
            max_message_bytes,
        }
    }

    /// Largest inline body, in UTF-8 bytes
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Encode `item`, uploading an overflow object when required
    ///
    /// With `force_overflow` the item's JSON form is always uploaded and its size
    /// is never measured. Otherwise the natural inline form is used if its UTF-8
    /// length is within the limit. Never touches the queue transport.
    pub async fn encode<'a, T: QueuePayload>(
        &self,
        item: &'a T,
        force_overflow: bool,
        cancel: &Cancellation,
    ) -> Result<EncodedPayload<'a>, HybridQueueError> {
        if force_overflow {
            debug!("Overflow forced, storing item in the overflow store");
            let json = item.to_json()?;
            let overflow_id = self.upload(json, cancel).await?;
            return Ok(EncodedPayload {
                body: Cow::Owned(overflow_id.to_string()),
                overflow_id: Some(overflow_id),
            });
        }

        let inline = item.to_inline()?;
        let message_size = inline.len();
        if message_size <= self.max_message_bytes {
            debug!(
                kind = ?T::KIND,
                message_size,
                "Item fits on the queue, sending inline"
            );
            return Ok(EncodedPayload {
                body: inline,
                overflow_id: None,
            });
        }

        debug!(
            kind = ?T::KIND,
            message_size,
            max_message_bytes = self.max_message_bytes,
            "Item is too large for the queue, storing it in the overflow store"
        );

        // Overflow objects always hold JSON so the read path can parse them.
        let json = match T::KIND {
            PayloadKind::Structured => inline.into_owned(),
            PayloadKind::Text | PayloadKind::Scalar => item.to_json()?,
        };
        let overflow_id = self.upload(json, cancel).await?;

        Ok(EncodedPayload {
            body: Cow::Owned(overflow_id.to_string()),
            overflow_id: Some(overflow_id),
        })
    }

    async fn upload(
        &self,
        json: String,
        cancel: &Cancellation,
    ) -> Result<OverflowId, HybridQueueError> {
        let overflow_id = OverflowId::new();
        let content = Bytes::from(json);

        cancel
            .run(self.store.upload(&overflow_id, content, JSON_CONTENT_TYPE))
            .await?
            .map_err(|e| {
                error!(
                    overflow_id = %overflow_id,
                    container = %self.store.container_name(),
                    error = %e,
                    "Failed to store item in the overflow store"
                );
                HybridQueueError::from(e)
            })?;

        debug!(overflow_id = %overflow_id, "Item added to the overflow store");
        Ok(overflow_id)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Resolves raw queue messages into [`HybridMessage`] values
#[derive(Clone)]
pub struct PayloadDecoder {
    store: Arc<dyn OverflowStore>,
}

impl PayloadDecoder {
    pub fn new(store: Arc<dyn OverflowStore>) -> Self {
        Self { store }
    }

    /// Decode one raw message
    ///
    /// Precedence is fixed: a body that parses as a UUID is an overflow reference;
    /// otherwise simple types use their text conversion and structured types are
    /// parsed as JSON.
    pub async fn decode<T: QueuePayload>(
        &self,
        raw: ReceivedQueueMessage,
        cancel: &Cancellation,
    ) -> Result<HybridMessage<T>, HybridQueueError> {
        let ReceivedQueueMessage {
            message_id,
            pop_receipt,
            body,
            dequeue_count,
            inserted_at,
            ..
        } = raw;

        let (content, overflow_id) = if let Some(overflow_id) = OverflowId::parse(&body) {
            let content = self.read_overflow(&message_id, overflow_id, cancel).await?;
            (content, Some(overflow_id))
        } else if T::KIND.is_simple() {
            debug!(message_id = %message_id, kind = ?T::KIND, "Converting inline simple value");
            (T::from_inline(body)?, None)
        } else {
            debug!(message_id = %message_id, "Parsing inline structured value");
            let content = T::from_json(body.as_bytes()).map_err(|e| {
                error!(message_id = %message_id, error = %e, "Failed to parse inline message");
                HybridQueueError::DecodeFailure {
                    message_id: message_id.clone(),
                    overflow_id: None,
                    reason: e.to_string(),
                }
            })?;
            (content, None)
        };

        Ok(HybridMessage::new(
            content,
            MessageLease::new(message_id, pop_receipt, overflow_id),
            dequeue_count,
            inserted_at,
        ))
    }

    async fn read_overflow<T: QueuePayload>(
        &self,
        message_id: &MessageId,
        overflow_id: OverflowId,
        cancel: &Cancellation,
    ) -> Result<T, HybridQueueError> {
        debug!(
            message_id = %message_id,
            overflow_id = %overflow_id,
            "Retrieving item from the overflow store"
        );

        let decode_failure = |reason: String| {
            error!(
                message_id = %message_id,
                overflow_id = %overflow_id,
                reason = %reason,
                "Could not decode overflow object"
            );
            HybridQueueError::DecodeFailure {
                message_id: message_id.clone(),
                overflow_id: Some(overflow_id),
                reason,
            }
        };

        let content = match cancel.run(self.store.open_read(&overflow_id)).await? {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Err(decode_failure(e.to_string())),
            Err(e) => {
                error!(
                    message_id = %message_id,
                    overflow_id = %overflow_id,
                    error = %e,
                    "Failed to read overflow object"
                );
                return Err(e.into());
            }
        };

        T::from_json(&content).map_err(|e| decode_failure(e.to_string()))
    }
}
