//! In-memory queue transport and overflow store for testing and development.
//!
//! The transport mirrors the delivery model of a storage queue:
//! - Messages become visible after an optional initial delay
//! - A receive hides each delivered message for a visibility timeout
//! - Every delivery hands out a fresh pop receipt; older receipts go stale
//! - Messages past their time-to-live are dropped on the next access
//!
//! Both types are cheap to clone. Clones share the same underlying storage, so a
//! test can keep a handle for inspection while the queue facade owns another.

use crate::client::{OverflowStore, QueueTransport, MAX_RECEIVE_BATCH};
use crate::error::{QueueError, StorageError, ValidationError};
use crate::message::{
    ContainerName, MessageId, OverflowId, PopReceipt, QueueName, ReceivedQueueMessage, SendOptions,
    Timestamp,
};
use crate::provider::InMemoryConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Internal state for a single queue
#[derive(Default)]
struct QueueState {
    exists: bool,
    /// Messages in enqueue order
    messages: Vec<StoredMessage>,
}

impl QueueState {
    fn purge_expired(&mut self, now: &Timestamp) {
        self.messages.retain(|m| !m.is_expired(now));
    }
}

/// A message stored in the queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    pop_receipt: Option<PopReceipt>,
    body: String,
    dequeue_count: u32,
    inserted_at: Timestamp,
    visible_at: Timestamp,
    expires_at: Option<Timestamp>,
}

impl StoredMessage {
    fn is_expired(&self, now: &Timestamp) -> bool {
        match self.expires_at {
            Some(ref expires_at) => now >= expires_at,
            None => false,
        }
    }

    fn is_visible(&self, now: &Timestamp) -> bool {
        now >= &self.visible_at
    }
}

fn poisoned_queue() -> QueueError {
    QueueError::ProviderError {
        provider: "InMemory".to_string(),
        code: "LockPoisoned".to_string(),
        message: "queue storage lock poisoned".to_string(),
    }
}

fn poisoned_store() -> StorageError {
    StorageError::InternalError {
        message: "overflow storage lock poisoned".to_string(),
    }
}

// ============================================================================
// InMemoryQueueTransport
// ============================================================================

/// In-memory implementation of [`QueueTransport`]
#[derive(Clone)]
pub struct InMemoryQueueTransport {
    queue_name: QueueName,
    config: InMemoryConfig,
    state: Arc<RwLock<QueueState>>,
}

impl InMemoryQueueTransport {
    /// Create a transport for a queue that does not exist yet
    pub fn new(queue_name: QueueName, config: InMemoryConfig) -> Self {
        Self {
            queue_name,
            config,
            state: Arc::new(RwLock::new(QueueState::default())),
        }
    }

    /// Number of live messages, visible or not
    pub fn approximate_message_count(&self) -> usize {
        let now = Timestamp::now();
        self.read_state()
            .map(|state| state.messages.iter().filter(|m| !m.is_expired(&now)).count())
            .unwrap_or(0)
    }

    /// Bodies of all live messages in enqueue order, without receiving them
    pub fn peek_bodies(&self) -> Vec<String> {
        let now = Timestamp::now();
        self.read_state()
            .map(|state| {
                state
                    .messages
                    .iter()
                    .filter(|m| !m.is_expired(&now))
                    .map(|m| m.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, QueueState>, QueueError> {
        self.state.read().map_err(|_| poisoned_queue())
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, QueueState>, QueueError> {
        self.state.write().map_err(|_| poisoned_queue())
    }

    fn ensure_exists(&self, state: &QueueState) -> Result<(), QueueError> {
        if state.exists {
            Ok(())
        } else {
            Err(QueueError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            })
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn create_if_not_exists(&self) -> Result<bool, QueueError> {
        let mut state = self.write_state()?;
        let created = !state.exists;
        state.exists = true;
        Ok(created)
    }

    async fn send_message(&self, body: &str, options: &SendOptions) -> Result<(), QueueError> {
        if body.len() > self.config.max_message_bytes {
            return Err(QueueError::MessageTooLarge {
                size: body.len(),
                max_size: self.config.max_message_bytes,
            });
        }

        let mut state = self.write_state()?;
        self.ensure_exists(&state)?;

        let now = Timestamp::now();
        let visible_at = match options.initial_visibility_delay {
            Some(delay) => now.plus(delay),
            None => now.clone(),
        };
        let expires_at = options
            .time_to_live
            .or(self.config.default_message_ttl)
            .map(|ttl| now.plus(ttl));

        state.messages.push(StoredMessage {
            message_id: MessageId::new(),
            pop_receipt: None,
            body: body.to_string(),
            dequeue_count: 0,
            inserted_at: now,
            visible_at,
            expires_at,
        });

        Ok(())
    }

    async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedQueueMessage>, QueueError> {
        if max_messages == 0 || max_messages > MAX_RECEIVE_BATCH {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: format!("must be between 1 and {}", MAX_RECEIVE_BATCH),
            }
            .into());
        }

        let mut state = self.write_state()?;
        self.ensure_exists(&state)?;

        let now = Timestamp::now();
        state.purge_expired(&now);

        let next_visible_at =
            now.plus(visibility_timeout.unwrap_or(self.config.default_visibility_timeout));

        let mut received = Vec::new();
        for stored in state.messages.iter_mut() {
            if received.len() >= max_messages as usize {
                break;
            }
            if !stored.is_visible(&now) {
                continue;
            }

            let receipt = PopReceipt::generate();
            stored.pop_receipt = Some(receipt.clone());
            stored.dequeue_count += 1;
            stored.visible_at = next_visible_at.clone();

            received.push(ReceivedQueueMessage {
                message_id: stored.message_id.clone(),
                pop_receipt: receipt,
                body: stored.body.clone(),
                dequeue_count: stored.dequeue_count,
                inserted_at: stored.inserted_at.clone(),
                next_visible_at: next_visible_at.clone(),
            });
        }

        Ok(received)
    }

    async fn delete_message(
        &self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let mut state = self.write_state()?;
        self.ensure_exists(&state)?;

        let now = Timestamp::now();
        state.purge_expired(&now);

        let position = state
            .messages
            .iter()
            .position(|m| &m.message_id == message_id)
            .ok_or_else(|| QueueError::PreconditionFailed {
                message_id: message_id.to_string(),
                message: "message not found".to_string(),
            })?;

        if state.messages[position].pop_receipt.as_ref() != Some(pop_receipt) {
            return Err(QueueError::PreconditionFailed {
                message_id: message_id.to_string(),
                message: "pop receipt does not match the latest delivery".to_string(),
            });
        }

        state.messages.remove(position);
        Ok(())
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    fn max_message_bytes(&self) -> usize {
        self.config.max_message_bytes
    }
}

// ============================================================================
// InMemoryOverflowStore
// ============================================================================

struct StoredObject {
    content: Bytes,
    content_type: String,
}

#[derive(Default)]
struct StoreState {
    exists: bool,
    objects: HashMap<OverflowId, StoredObject>,
}

/// In-memory implementation of [`OverflowStore`]
#[derive(Clone)]
pub struct InMemoryOverflowStore {
    container_name: ContainerName,
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryOverflowStore {
    /// Create a store for a container that does not exist yet
    pub fn new(container_name: ContainerName) -> Self {
        Self {
            container_name,
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.state.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    /// Whether an object exists under `id`
    pub fn contains(&self, id: &OverflowId) -> bool {
        self.state
            .read()
            .map(|s| s.objects.contains_key(id))
            .unwrap_or(false)
    }

    /// Content type recorded for an object
    pub fn content_type(&self, id: &OverflowId) -> Option<String> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.objects.get(id).map(|o| o.content_type.clone()))
    }

    fn ensure_exists(&self, state: &StoreState) -> Result<(), StorageError> {
        if state.exists {
            Ok(())
        } else {
            Err(StorageError::InvalidPath {
                path: format!("{} (container does not exist)", self.container_name),
            })
        }
    }
}

#[async_trait]
impl OverflowStore for InMemoryOverflowStore {
    async fn create_if_not_exists(&self) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| poisoned_store())?;
        let created = !state.exists;
        state.exists = true;
        Ok(created)
    }

    async fn upload(
        &self,
        id: &OverflowId,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| poisoned_store())?;
        self.ensure_exists(&state)?;

        state.objects.insert(
            *id,
            StoredObject {
                content,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn open_read(&self, id: &OverflowId) -> Result<Bytes, StorageError> {
        let state = self.state.read().map_err(|_| poisoned_store())?;
        self.ensure_exists(&state)?;

        state
            .objects
            .get(id)
            .map(|o| o.content.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: format!("{}/{}", self.container_name, id),
            })
    }

    async fn delete_if_exists(&self, id: &OverflowId) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| poisoned_store())?;
        self.ensure_exists(&state)?;
        Ok(state.objects.remove(id).is_some())
    }

    fn container_name(&self) -> &ContainerName {
        &self.container_name
    }
}
