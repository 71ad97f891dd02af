//! # Hybrid Queue Runtime
//!
//! Storage collaborators for the hybrid queue: a size-limited message transport and
//! an unbounded overflow store, with in-memory, filesystem and Azure Storage
//! implementations.
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for transport and store operations
//! - [`message`] - Identifiers and raw message records
//! - [`provider`] - Provider types and configuration
//! - [`client`] - The [`QueueTransport`] and [`OverflowStore`] traits
//! - [`providers`] - Concrete backends

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{OverflowStore, QueueTransport, JSON_CONTENT_TYPE, MAX_RECEIVE_BATCH};
pub use error::{ConfigurationError, QueueError, SerializationError, StorageError, ValidationError};
pub use message::{
    ContainerName, MessageId, OverflowId, PopReceipt, QueueName, ReceivedQueueMessage,
    SendOptions, Timestamp,
};
pub use provider::{AzureStorageConfig, FilesystemConfig, InMemoryConfig, MessageEncoding};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
