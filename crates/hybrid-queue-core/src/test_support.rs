//! Shared fixtures for unit tests: collaborator mocks and in-memory backends.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use hybrid_queue_runtime::providers::{InMemoryOverflowStore, InMemoryQueueTransport};
use hybrid_queue_runtime::{
    ContainerName, InMemoryConfig, MessageId, OverflowId, OverflowStore, PopReceipt, QueueError,
    QueueName, QueueTransport, ReceivedQueueMessage, SendOptions, StorageError,
};
use serde::{Deserialize, Serialize};

mockall::mock! {
    pub Transport {}

    #[async_trait]
    impl QueueTransport for Transport {
        async fn create_if_not_exists(&self) -> Result<bool, QueueError>;
        async fn send_message(&self, body: &str, options: &SendOptions) -> Result<(), QueueError>;
        async fn receive_messages(
            &self,
            max_messages: u32,
            visibility_timeout: Option<Duration>,
        ) -> Result<Vec<ReceivedQueueMessage>, QueueError>;
        async fn delete_message(
            &self,
            message_id: &MessageId,
            pop_receipt: &PopReceipt,
        ) -> Result<(), QueueError>;
        fn queue_name(&self) -> &QueueName;
        fn max_message_bytes(&self) -> usize;
    }
}

mockall::mock! {
    pub Store {}

    #[async_trait]
    impl OverflowStore for Store {
        async fn create_if_not_exists(&self) -> Result<bool, StorageError>;
        async fn upload(
            &self,
            id: &OverflowId,
            content: Bytes,
            content_type: &str,
        ) -> Result<(), StorageError>;
        async fn open_read(&self, id: &OverflowId) -> Result<Bytes, StorageError>;
        async fn delete_if_exists(&self, id: &OverflowId) -> Result<bool, StorageError>;
        fn container_name(&self) -> &ContainerName;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub notes: String,
}

crate::structured_payload!(Order);

pub fn queue_name() -> QueueName {
    QueueName::new("orders".to_string()).unwrap()
}

pub fn container_name() -> ContainerName {
    ContainerName::new("orders-overflow".to_string()).unwrap()
}

/// In-memory transport and store, both already created
pub async fn memory_backends(max_message_bytes: usize) -> (InMemoryQueueTransport, InMemoryOverflowStore) {
    let config = InMemoryConfig {
        max_message_bytes,
        ..InMemoryConfig::default()
    };
    let transport = InMemoryQueueTransport::new(queue_name(), config);
    let store = InMemoryOverflowStore::new(container_name());
    transport.create_if_not_exists().await.unwrap();
    store.create_if_not_exists().await.unwrap();
    (transport, store)
}

/// A raw message as the transport would deliver it
pub fn raw_message(body: &str) -> ReceivedQueueMessage {
    ReceivedQueueMessage::new(
        MessageId::new(),
        PopReceipt::generate(),
        body.to_string(),
    )
}
