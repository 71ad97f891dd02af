//! Provider types and configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inline limit of a base64-encoded Azure queue message body
pub const AZURE_BASE64_MAX_MESSAGE_BYTES: usize = 49152;

/// Inline limit of an unencoded Azure queue message body
pub const AZURE_RAW_MAX_MESSAGE_BYTES: usize = 65536;

/// How queue message bodies are encoded on the Azure wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// Bodies are base64 encoded, matching the Azure SDK default
    #[default]
    Base64,
    /// Bodies are sent as XML-escaped text
    None,
}

impl MessageEncoding {
    /// Largest inline body, in UTF-8 bytes, for this encoding
    pub fn max_message_bytes(&self) -> usize {
        match self {
            Self::Base64 => AZURE_BASE64_MAX_MESSAGE_BYTES,
            Self::None => AZURE_RAW_MAX_MESSAGE_BYTES,
        }
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryConfig {
    /// Largest body accepted by `send_message`
    pub max_message_bytes: usize,
    /// Visibility timeout applied when a receive does not name one
    pub default_visibility_timeout: Duration,
    /// Message lifetime applied when a send does not name one
    pub default_message_ttl: Option<Duration>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: AZURE_BASE64_MAX_MESSAGE_BYTES,
            default_visibility_timeout: Duration::seconds(30),
            default_message_ttl: None,
        }
    }
}

/// Filesystem overflow store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Directory under which one sub-directory per container is created
    pub base_path: PathBuf,
}

/// Azure Storage account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureStorageConfig {
    pub connection_string: String,
    #[serde(default)]
    pub message_encoding: MessageEncoding,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl AzureStorageConfig {
    /// Create a configuration with default encoding and timeout
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            message_encoding: MessageEncoding::default(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
