//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validate a storage resource name (queue or container).
///
/// Names are 3-63 characters of lowercase ASCII letters, digits and hyphens,
/// start and end with a letter or digit, and never contain `--`.
fn validate_resource_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "must be 3-63 characters".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only lowercase ASCII letters, digits and hyphens allowed".to_string(),
        });
    }

    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validated queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        validate_resource_name("queue_name", &name)?;
        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Validated overflow container name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Create new container name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        validate_resource_name("container_name", &name)?;
        Ok(Self(name))
    }

    /// Get container name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ContainerName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(value: ContainerName) -> Self {
        value.0
    }
}

/// Transport-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque lease token proving the holder currently owns a delivered message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Generate a fresh random receipt
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get receipt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PopReceipt {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "pop_receipt".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Key of an object in the overflow store
///
/// Rendered as a hyphenated lowercase UUID. This same string is what goes on the
/// queue in place of an oversized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverflowId(Uuid);

impl OverflowId {
    /// Generate a new random overflow id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Try to read a queue body as an overflow reference.
    ///
    /// Accepts any UUID notation the `uuid` crate parses (hyphenated, simple,
    /// braced, urn) after trimming surrounding whitespace.
    pub fn parse(body: &str) -> Option<Self> {
        Uuid::parse_str(body.trim()).ok().map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OverflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OverflowId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OverflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for OverflowId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::InvalidFormat {
            field: "overflow_id".to_string(),
            message: format!("'{}' is not a UUID", s),
        })
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset from this one
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A raw message as delivered by the queue transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedQueueMessage {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    pub body: String,
    pub dequeue_count: u32,
    pub inserted_at: Timestamp,
    pub next_visible_at: Timestamp,
}

impl ReceivedQueueMessage {
    /// Create a received message delivered now, for the first time
    pub fn new(message_id: MessageId, pop_receipt: PopReceipt, body: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            message_id,
            pop_receipt,
            body: body.into(),
            dequeue_count: 1,
            inserted_at: now.clone(),
            next_visible_at: now,
        }
    }
}

/// Configuration options for sending messages to queues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// How long the message stays invisible after being enqueued
    pub initial_visibility_delay: Option<Duration>,
    /// Time-to-live for automatic message expiration
    pub time_to_live: Option<Duration>,
}

impl SendOptions {
    /// Create new send options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide the message for a delay after it is enqueued
    pub fn with_initial_visibility_delay(mut self, delay: Duration) -> Self {
        self.initial_visibility_delay = Some(delay);
        self
    }

    /// Set time-to-live for message expiration
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
