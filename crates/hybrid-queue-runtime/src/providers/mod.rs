//! Queue transport and overflow store implementations.
//!
//! - [`memory`]: in-process transport and store for tests and development
//! - [`filesystem`]: overflow store backed by local files
//! - [`azure_queue`] and [`azure_blob`]: Azure Storage over its REST APIs

pub mod azure;
pub mod azure_blob;
pub mod azure_queue;
pub mod filesystem;
pub mod memory;

pub use azure::{AzureError, StorageConnectionString};
pub use azure_blob::AzureBlobOverflowStore;
pub use azure_queue::AzureQueueTransport;
pub use filesystem::FilesystemOverflowStore;
pub use memory::{InMemoryOverflowStore, InMemoryQueueTransport};
