//! # Hybrid Queue Core
//!
//! A logical message queue whose payloads may exceed the per-message limit of the
//! underlying transport.
//!
//! Payloads that fit travel inline. Larger ones are written to an overflow store
//! under a fresh UUID and the queue message carries only that UUID. Receiving
//! resolves references transparently and deleting removes both the queue entry
//! and its overflow object.
//!
//! ## Architecture
//!
//! - [`payload`] - How item types map to inline text and JSON
//! - [`codec`] - The encoder that routes items inline or to the store, and the
//!   decoder that resolves raw messages back into items
//! - [`batch`] - Bounded, group-at-a-time fan-out for batched sends
//! - [`queue`] - The [`HybridQueue`] facade composing all of the above
//! - [`config`] - Serializable configuration and [`HybridQueueFactory`]
//! - [`cancellation`] - Cooperative cancellation threaded through every call
//!
//! The transport and store are the [`QueueTransport`] and [`OverflowStore`]
//! traits from `hybrid-queue-runtime`; any implementation can be plugged in.
//!
//! ## Usage
//!
//! ```rust
//! use hybrid_queue_core::{AddOptions, Cancellation, HybridQueueConfig, HybridQueueFactory};
//!
//! # async fn example() -> Result<(), hybrid_queue_core::HybridQueueError> {
//! let queue = HybridQueueFactory::build(&HybridQueueConfig::new("orders"))?;
//! let cancel = Cancellation::none();
//!
//! queue.setup(true, &cancel).await?;
//! queue.add(&"hello".to_string(), &AddOptions::new(), &cancel).await?;
//!
//! if let Some(message) = queue.receive_one::<String>(None, &cancel).await? {
//!     println!("{}", message.content());
//!     queue.delete(&message, &cancel).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cancellation;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod payload;
pub mod queue;

#[cfg(test)]
mod test_support;

pub use batch::{BatchCoordinator, BatchReport, DEFAULT_BATCH_SIZE};
pub use cancellation::{Cancellation, CancellationSource};
pub use codec::{EncodedPayload, PayloadDecoder, PayloadEncoder};
pub use config::{BackendConfig, HybridQueueConfig, HybridQueueFactory};
pub use context::OperationContext;
pub use error::{ErrorCategory, HybridQueueError, HybridQueueResult};
pub use message::{HybridMessage, MessageLease};
pub use payload::{Json, PayloadKind, QueuePayload};
pub use queue::{AddOptions, HybridQueue, OverflowCleanup, SetupReport};

// Runtime types that appear in this crate's public API
pub use hybrid_queue_runtime::{
    ContainerName, MessageEncoding, MessageId, OverflowId, OverflowStore, PopReceipt, QueueName,
    QueueTransport, ReceivedQueueMessage, ValidationError, MAX_RECEIVE_BATCH,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
