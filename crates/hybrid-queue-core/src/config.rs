//! Serializable queue configuration and the factory that turns it into a
//! [`HybridQueue`].
//!
//! Loading layered configuration from files and the environment is left to the
//! binary; this module only describes the shape and validates it.

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::HybridQueueError;
use crate::queue::HybridQueue;
use chrono::Duration;
use hybrid_queue_runtime::providers::{
    AzureBlobOverflowStore, AzureQueueTransport, FilesystemOverflowStore, InMemoryOverflowStore,
    InMemoryQueueTransport,
};
use hybrid_queue_runtime::{
    AzureStorageConfig, ContainerName, FilesystemConfig, InMemoryConfig, MessageEncoding,
    OverflowStore, QueueName, QueueTransport, MAX_RECEIVE_BATCH,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Suffix appended to the queue name when no container name is configured
pub const CONTAINER_SUFFIX: &str = "-overflow";

/// Top-level hybrid queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridQueueConfig {
    pub queue_name: String,

    /// Overflow container; `{queue_name}-overflow` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    pub backend: BackendConfig,

    /// Group size for batched sends
    pub batch_size: usize,

    /// Visibility timeout applied to received messages, in seconds
    pub visibility_timeout_seconds: Option<u64>,

    /// Maximum number of messages per receive call
    pub max_messages: u32,

    /// Log each resource `setup` creates or finds
    pub log_each_creation: bool,
}

impl Default for HybridQueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "hybrid-queue".to_string(),
            container_name: None,
            backend: BackendConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            visibility_timeout_seconds: None,
            max_messages: MAX_RECEIVE_BATCH,
            log_each_creation: true,
        }
    }
}

impl HybridQueueConfig {
    /// Configuration for `queue_name` with every other setting defaulted
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn queue_name(&self) -> Result<QueueName, HybridQueueError> {
        Ok(QueueName::new(self.queue_name.clone())?)
    }

    /// The configured container name, or the one derived from the queue name
    pub fn container_name(&self) -> Result<ContainerName, HybridQueueError> {
        let name = self
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.queue_name, CONTAINER_SUFFIX));
        Ok(ContainerName::new(name)?)
    }

    pub fn visibility_timeout(&self) -> Option<Duration> {
        self.visibility_timeout_seconds
            .and_then(|seconds| i64::try_from(seconds).ok())
            .map(Duration::seconds)
    }

    /// Check every setting, reporting all problems at once
    pub fn validate(&self) -> Result<(), HybridQueueError> {
        let mut errors = Vec::new();

        if let Err(e) = self.queue_name() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.container_name() {
            errors.push(e.to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be greater than zero".to_string());
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.max_messages) {
            errors.push(format!(
                "max_messages must be between 1 and {}",
                MAX_RECEIVE_BATCH
            ));
        }
        if let Err(e) = self.backend.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HybridQueueError::invalid_argument("config", errors.join("; ")))
        }
    }
}

/// Which storage backs the queue and its overflow container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Both halves live in process memory
    Memory {
        #[serde(default = "default_memory_max_message_bytes")]
        max_message_bytes: usize,
    },

    /// In-memory queue with overflow objects written under `path`
    Filesystem {
        path: PathBuf,
        #[serde(default = "default_memory_max_message_bytes")]
        max_message_bytes: usize,
    },

    /// Azure Storage queue and blob container in one account
    Azure {
        connection_string: String,
        #[serde(default)]
        message_encoding: MessageEncoding,
    },
}

fn default_memory_max_message_bytes() -> usize {
    InMemoryConfig::default().max_message_bytes
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory {
            max_message_bytes: default_memory_max_message_bytes(),
        }
    }
}

impl BackendConfig {
    /// Short backend name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::Filesystem { .. } => "filesystem",
            Self::Azure { .. } => "azure",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Memory { max_message_bytes } | Self::Filesystem { max_message_bytes, .. }
                if *max_message_bytes == 0 =>
            {
                Err("backend.max_message_bytes must be greater than zero".to_string())
            }
            Self::Filesystem { path, .. } if path.as_os_str().is_empty() => {
                Err("backend.path is required for the filesystem backend".to_string())
            }
            Self::Azure {
                connection_string, ..
            } if connection_string.trim().is_empty() => Err(
                "backend.connection_string is required for the azure backend".to_string(),
            ),
            _ => Ok(()),
        }
    }
}

/// Builds a [`HybridQueue`] from configuration
pub struct HybridQueueFactory;

impl HybridQueueFactory {
    /// Validate `config` and construct the transport and store it names
    ///
    /// No network or filesystem access happens here; call
    /// [`HybridQueue::setup`] to create the resources.
    pub fn build(config: &HybridQueueConfig) -> Result<HybridQueue, HybridQueueError> {
        config.validate()?;
        let queue_name = config.queue_name()?;
        let container_name = config.container_name()?;

        let (transport, store): (Arc<dyn QueueTransport>, Arc<dyn OverflowStore>) =
            match &config.backend {
                BackendConfig::Memory { max_message_bytes } => (
                    Arc::new(InMemoryQueueTransport::new(
                        queue_name,
                        memory_config(*max_message_bytes),
                    )),
                    Arc::new(InMemoryOverflowStore::new(container_name)),
                ),
                BackendConfig::Filesystem {
                    path,
                    max_message_bytes,
                } => {
                    let fs_config = FilesystemConfig {
                        base_path: path.clone(),
                    };
                    (
                        Arc::new(InMemoryQueueTransport::new(
                            queue_name,
                            memory_config(*max_message_bytes),
                        )),
                        Arc::new(FilesystemOverflowStore::new(&fs_config, container_name)),
                    )
                }
                BackendConfig::Azure {
                    connection_string,
                    message_encoding,
                } => {
                    let mut azure = AzureStorageConfig::new(connection_string.clone());
                    azure.message_encoding = *message_encoding;
                    (
                        Arc::new(AzureQueueTransport::new(&azure, queue_name)?),
                        Arc::new(AzureBlobOverflowStore::new(&azure, container_name)?),
                    )
                }
            };

        let queue = HybridQueue::new(transport, store);
        info!(
            backend = config.backend.kind(),
            queue = %queue.queue_name(),
            container = %queue.container_name(),
            max_message_bytes = queue.max_message_bytes(),
            "Built hybrid queue"
        );
        Ok(queue)
    }
}

fn memory_config(max_message_bytes: usize) -> InMemoryConfig {
    InMemoryConfig {
        max_message_bytes,
        ..InMemoryConfig::default()
    }
}
