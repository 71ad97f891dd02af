//! Common test utilities for hybrid queue integration tests
//!
//! This module provides:
//! - A queue built on the in-memory backends, with handles to inspect them
//! - A transport wrapper that records sends and rejects chosen bodies
//! - Shared payload types

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use hybrid_queue_core::{HybridQueue, HybridQueueError};
use hybrid_queue_runtime::providers::{InMemoryOverflowStore, InMemoryQueueTransport};
use hybrid_queue_runtime::{
    ContainerName, InMemoryConfig, MessageId, PopReceipt, QueueError, QueueName, QueueTransport,
    ReceivedQueueMessage, SendOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Inline limit used by most tests; small enough to overflow easily
pub const SMALL_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub tags: Vec<String>,
}

hybrid_queue_core::structured_payload!(Customer);

impl Customer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            tags: Vec::new(),
        }
    }

    /// A customer whose JSON form is exactly `len` bytes long
    pub fn with_json_len(len: usize) -> Self {
        let mut customer = Self::new("Ada");
        let base = serde_json::to_string(&customer).map(|s| s.len()).unwrap_or(0);
        customer.name.push_str(&"a".repeat(len - base));
        customer
    }
}

pub fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

pub fn container_name(name: &str) -> ContainerName {
    ContainerName::new(format!("{}-overflow", name)).unwrap()
}

/// A hybrid queue over in-memory backends, plus handles to both backends
pub struct MemoryQueue {
    pub queue: HybridQueue,
    pub transport: InMemoryQueueTransport,
    pub store: InMemoryOverflowStore,
}

impl MemoryQueue {
    /// Build and set up a queue whose inline limit is `max_message_bytes`
    pub async fn new(max_message_bytes: usize) -> Result<Self, HybridQueueError> {
        let transport = InMemoryQueueTransport::new(
            queue_name("customers"),
            InMemoryConfig {
                max_message_bytes,
                ..InMemoryConfig::default()
            },
        );
        let store = InMemoryOverflowStore::new(container_name("customers"));
        let queue = HybridQueue::new(Arc::new(transport.clone()), Arc::new(store.clone()));
        queue
            .setup(true, &hybrid_queue_core::Cancellation::none())
            .await?;

        Ok(Self {
            queue,
            transport,
            store,
        })
    }
}

// ============================================================================
// Recording Transport
// ============================================================================

/// Forwards to an in-memory transport, recording every send attempt and
/// failing sends whose body is on the reject list
#[derive(Clone)]
pub struct RecordingTransport {
    inner: InMemoryQueueTransport,
    attempts: Arc<Mutex<Vec<String>>>,
    rejected: Arc<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new(inner: InMemoryQueueTransport, rejected: &[&str]) -> Self {
        Self {
            inner,
            attempts: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(rejected.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Bodies of every attempted send, in attempt order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn create_if_not_exists(&self) -> Result<bool, QueueError> {
        self.inner.create_if_not_exists().await
    }

    async fn send_message(&self, body: &str, options: &SendOptions) -> Result<(), QueueError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(body.to_string());
        }
        if self.rejected.contains(body) {
            return Err(QueueError::ConnectionFailed {
                message: format!("rejected body '{}'", body),
            });
        }
        self.inner.send_message(body, options).await
    }

    async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedQueueMessage>, QueueError> {
        self.inner
            .receive_messages(max_messages, visibility_timeout)
            .await
    }

    async fn delete_message(
        &self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        self.inner.delete_message(message_id, pop_receipt).await
    }

    fn queue_name(&self) -> &QueueName {
        self.inner.queue_name()
    }

    fn max_message_bytes(&self) -> usize {
        self.inner.max_message_bytes()
    }
}
