//! The hybrid queue facade.

use crate::batch::{BatchCoordinator, BatchReport, DEFAULT_BATCH_SIZE};
use crate::cancellation::Cancellation;
use crate::codec::{PayloadDecoder, PayloadEncoder};
use crate::context::OperationContext;
use crate::error::HybridQueueError;
use crate::message::{HybridMessage, MessageLease};
use crate::payload::QueuePayload;
use chrono::Duration;
use futures::future::join_all;
use futures::TryFutureExt;
use hybrid_queue_runtime::{
    ContainerName, OverflowId, OverflowStore, QueueName, QueueTransport, ReceivedQueueMessage,
    SendOptions, MAX_RECEIVE_BATCH,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Options applied to every message of an `add` or `add_many` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// How long new messages stay invisible after being enqueued
    pub initial_visibility_delay: Option<Duration>,
    /// Message lifetime; the transport default when unset
    pub time_to_live: Option<Duration>,
    /// Store every payload in the overflow store regardless of size
    pub force_overflow: bool,
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_visibility_delay(mut self, delay: Duration) -> Self {
        self.initial_visibility_delay = Some(delay);
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_force_overflow(mut self, force_overflow: bool) -> Self {
        self.force_overflow = force_overflow;
        self
    }

    fn send_options(&self) -> SendOptions {
        SendOptions {
            initial_visibility_delay: self.initial_visibility_delay,
            time_to_live: self.time_to_live,
        }
    }
}

/// Which resources `setup` had to create
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub container_created: bool,
    pub queue_created: bool,
}

/// What happened to the overflow object while deleting a message
///
/// Only [`OverflowCleanup::NotApplicable`] and [`OverflowCleanup::Deleted`] mean
/// nothing was left behind. The queue entry is deleted in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverflowCleanup {
    /// The message carried its payload inline
    NotApplicable,
    Deleted,
    /// No object existed under the message's overflow id
    Missing,
    /// The store refused or failed the delete; the object may be orphaned
    Failed { reason: String },
}

impl OverflowCleanup {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::NotApplicable | Self::Deleted)
    }
}

/// A logical queue carrying payloads of any size
///
/// Payloads that fit the transport's per-message limit travel inline. Larger ones
/// are written to the overflow store and the queue carries only the object's
/// UUID. Reads resolve references transparently and deletes remove both halves.
#[derive(Clone)]
pub struct HybridQueue {
    transport: Arc<dyn QueueTransport>,
    store: Arc<dyn OverflowStore>,
    encoder: PayloadEncoder,
    decoder: PayloadDecoder,
}

impl std::fmt::Debug for HybridQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridQueue")
            .field("queue_name", self.transport.queue_name())
            .field("container_name", self.store.container_name())
            .field("max_message_bytes", &self.encoder.max_message_bytes())
            .finish()
    }
}

impl HybridQueue {
    /// Compose a queue from its collaborators
    ///
    /// The inline limit is the transport's `max_message_bytes`.
    pub fn new(transport: Arc<dyn QueueTransport>, store: Arc<dyn OverflowStore>) -> Self {
        let max_message_bytes = transport.max_message_bytes();
        Self {
            encoder: PayloadEncoder::new(store.clone(), max_message_bytes),
            decoder: PayloadDecoder::new(store.clone()),
            transport,
            store,
        }
    }

    pub fn queue_name(&self) -> &QueueName {
        self.transport.queue_name()
    }

    pub fn container_name(&self) -> &ContainerName {
        self.store.container_name()
    }

    /// Largest payload, in UTF-8 bytes, sent inline
    pub fn max_message_bytes(&self) -> usize {
        self.encoder.max_message_bytes()
    }

    fn context(&self, operation: &'static str) -> OperationContext {
        OperationContext::new(operation, self.queue_name())
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    /// Create the overflow container and then the queue, each only if missing
    pub async fn setup(
        &self,
        log_each_creation: bool,
        cancel: &Cancellation,
    ) -> Result<SetupReport, HybridQueueError> {
        let span = self.context("setup").span();
        self.create_resources(log_each_creation, cancel)
            .instrument(span)
            .await
    }

    async fn create_resources(
        &self,
        log_each_creation: bool,
        cancel: &Cancellation,
    ) -> Result<SetupReport, HybridQueueError> {
        let container_created = cancel
            .run(self.store.create_if_not_exists())
            .await?
            .map_err(|e| {
                error!(
                    container = %self.container_name(),
                    error = %e,
                    "Failed to create overflow container"
                );
                HybridQueueError::from(e)
            })?;
        if log_each_creation {
            if container_created {
                info!(
                    container = %self.container_name(),
                    "Overflow container was missing, created it"
                );
            } else {
                debug!(container = %self.container_name(), "Overflow container already exists");
            }
        }

        let queue_created = cancel
            .run(self.transport.create_if_not_exists())
            .await?
            .map_err(|e| {
                error!(error = %e, "Failed to create queue");
                HybridQueueError::from(e)
            })?;
        if log_each_creation {
            if queue_created {
                info!("Queue was missing, created it");
            } else {
                debug!("Queue already exists");
            }
        }

        Ok(SetupReport {
            container_created,
            queue_created,
        })
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Enqueue one item, routing it through the overflow store when needed
    ///
    /// Returns the overflow id when an overflow object was created. If the send
    /// fails after an upload, the object is left behind.
    pub async fn add<T: QueuePayload>(
        &self,
        item: &T,
        options: &AddOptions,
        cancel: &Cancellation,
    ) -> Result<Option<OverflowId>, HybridQueueError> {
        let span = self
            .context("add")
            .with_force_overflow(options.force_overflow)
            .span();
        self.add_one(item, options, cancel).instrument(span).await
    }

    async fn add_one<T: QueuePayload>(
        &self,
        item: &T,
        options: &AddOptions,
        cancel: &Cancellation,
    ) -> Result<Option<OverflowId>, HybridQueueError> {
        debug!("Adding a message to the hybrid queue");
        let encoded = self
            .encoder
            .encode(item, options.force_overflow, cancel)
            .await?;

        cancel
            .run(
                self.transport
                    .send_message(&encoded.body, &options.send_options()),
            )
            .await?
            .map_err(|e| {
                error!(
                    overflow_id = ?encoded.overflow_id,
                    error = %e,
                    "Failed to add an item to the queue"
                );
                HybridQueueError::from(e)
            })?;

        debug!(overflow_id = ?encoded.overflow_id, "Finished adding an item to the queue");
        Ok(encoded.overflow_id)
    }

    /// Enqueue many items in groups of `batch_size`
    ///
    /// Items within a group are sent concurrently; groups run one after another.
    /// The first failing group fails the call once all its members settle.
    /// Earlier groups stay sent and later groups are never attempted.
    pub async fn add_many<'a, T, I>(
        &self,
        items: I,
        options: &AddOptions,
        batch_size: usize,
        cancel: &Cancellation,
    ) -> Result<BatchReport, HybridQueueError>
    where
        T: QueuePayload + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let coordinator = BatchCoordinator::new(batch_size)?;
        let span = self
            .context("add_many")
            .with_batch_size(batch_size)
            .with_force_overflow(options.force_overflow)
            .span();

        let report = coordinator
            .run(items, cancel, |item| {
                self.add_one(item, options, cancel).map_ok(|_| ())
            })
            .instrument(span.clone())
            .await?;

        span.in_scope(|| {
            debug!(
                items = report.items(),
                groups = report.groups(),
                "Finished adding a batch of items"
            )
        });
        Ok(report)
    }

    /// Enqueue many items in groups of [`DEFAULT_BATCH_SIZE`]
    pub async fn add_batch<'a, T, I>(
        &self,
        items: I,
        options: &AddOptions,
        cancel: &Cancellation,
    ) -> Result<BatchReport, HybridQueueError>
    where
        T: QueuePayload + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        self.add_many(items, options, DEFAULT_BATCH_SIZE, cancel).await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Receive and decode up to `max_messages` messages (1 to 32)
    ///
    /// Messages are decoded concurrently. Any decode failure fails the whole
    /// call; the messages already received then reappear once their visibility
    /// timeout lapses.
    pub async fn receive<T: QueuePayload>(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> Result<Vec<HybridMessage<T>>, HybridQueueError> {
        if !(1..=MAX_RECEIVE_BATCH).contains(&max_messages) {
            return Err(HybridQueueError::invalid_argument(
                "max_messages",
                format!("must be between 1 and {}", MAX_RECEIVE_BATCH),
            ));
        }

        let span = self
            .context("receive")
            .with_max_messages(max_messages)
            .span();

        self.receive_and_decode(max_messages, visibility_timeout, cancel)
            .instrument(span)
            .await
    }

    async fn receive_and_decode<T: QueuePayload>(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> Result<Vec<HybridMessage<T>>, HybridQueueError> {
        debug!("About to receive queue messages");
        let raw = cancel
            .run(
                self.transport
                    .receive_messages(max_messages, visibility_timeout),
            )
            .await?
            .map_err(|e| {
                error!(error = %e, "Failed to receive queue messages");
                HybridQueueError::from(e)
            })?;

        if raw.is_empty() {
            debug!("No queue messages retrieved");
            return Ok(Vec::new());
        }
        debug!(message_count = raw.len(), "Received queue messages");

        let decoded = cancel
            .run(join_all(
                raw.into_iter()
                    .map(|message| self.decoder.decode::<T>(message, cancel)),
            ))
            .await?;
        decoded.into_iter().collect()
    }

    /// Receive and decode a full batch of up to 32 messages
    pub async fn receive_batch<T: QueuePayload>(
        &self,
        visibility_timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> Result<Vec<HybridMessage<T>>, HybridQueueError> {
        self.receive(MAX_RECEIVE_BATCH, visibility_timeout, cancel).await
    }

    /// Receive at most one message
    pub async fn receive_one<T: QueuePayload>(
        &self,
        visibility_timeout: Option<Duration>,
        cancel: &Cancellation,
    ) -> Result<Option<HybridMessage<T>>, HybridQueueError> {
        let mut messages = self.receive(1, visibility_timeout, cancel).await?;
        match messages.len() {
            0 | 1 => Ok(messages.pop()),
            count => Err(HybridQueueError::InvariantViolation {
                message: format!("expected at most 1 message but received {}", count),
            }),
        }
    }

    /// Resolve a raw transport message obtained outside this queue
    pub async fn decode<T: QueuePayload>(
        &self,
        raw: ReceivedQueueMessage,
        cancel: &Cancellation,
    ) -> Result<HybridMessage<T>, HybridQueueError> {
        let span = self
            .context("decode")
            .with_message(&raw.message_id, None)
            .span();
        self.decoder.decode(raw, cancel).instrument(span).await
    }

    // ------------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------------

    /// Delete a received message and its overflow object
    pub async fn delete<T>(
        &self,
        message: &HybridMessage<T>,
        cancel: &Cancellation,
    ) -> Result<OverflowCleanup, HybridQueueError> {
        self.delete_lease(message.lease(), cancel).await
    }

    /// Delete the message identified by a lease
    ///
    /// The overflow object goes first, best-effort: its absence or failure is
    /// logged as a warning and reported in the returned [`OverflowCleanup`]. The
    /// queue entry is deleted afterwards; a stale pop receipt fails the call with
    /// a precondition failure.
    pub async fn delete_lease(
        &self,
        lease: &MessageLease,
        cancel: &Cancellation,
    ) -> Result<OverflowCleanup, HybridQueueError> {
        let span = self
            .context("delete")
            .with_message(&lease.message_id, lease.overflow_id)
            .span();

        self.delete_both(lease, cancel).instrument(span).await
    }

    async fn delete_both(
        &self,
        lease: &MessageLease,
        cancel: &Cancellation,
    ) -> Result<OverflowCleanup, HybridQueueError> {
        debug!("Deleting a message");

        let cleanup = match lease.overflow_id {
            None => OverflowCleanup::NotApplicable,
            Some(overflow_id) => {
                debug!("Deleting the overflow object");
                match cancel.run(self.store.delete_if_exists(&overflow_id)).await? {
                    Ok(true) => OverflowCleanup::Deleted,
                    Ok(false) => {
                        warn!("Failed to delete the overflow object, it does not exist");
                        OverflowCleanup::Missing
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to delete the overflow object");
                        OverflowCleanup::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };

        cancel
            .run(
                self.transport
                    .delete_message(&lease.message_id, &lease.pop_receipt),
            )
            .await?
            .map_err(|e| {
                error!(error = %e, "Failed to delete the message from the queue");
                HybridQueueError::from(e)
            })?;

        debug!("Deleted a message from the queue");
        Ok(cleanup)
    }
}
