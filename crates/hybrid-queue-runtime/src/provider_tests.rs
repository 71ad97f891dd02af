//! Tests for provider types.

use super::*;

#[test]
fn test_message_encoding_limits() {
    assert_eq!(MessageEncoding::Base64.max_message_bytes(), 49152);
    assert_eq!(MessageEncoding::None.max_message_bytes(), 65536);
    assert_eq!(MessageEncoding::default(), MessageEncoding::Base64);
}

#[test]
fn test_message_encoding_deserializes_lowercase() {
    let encoding: MessageEncoding = serde_json::from_str("\"none\"").unwrap();
    assert_eq!(encoding, MessageEncoding::None);

    let encoding: MessageEncoding = serde_json::from_str("\"base64\"").unwrap();
    assert_eq!(encoding, MessageEncoding::Base64);
}

#[test]
fn test_in_memory_defaults() {
    let config = InMemoryConfig::default();
    assert_eq!(config.max_message_bytes, 49152);
    assert_eq!(config.default_visibility_timeout, Duration::seconds(30));
    assert!(config.default_message_ttl.is_none());
}

#[test]
fn test_azure_config_defaults_from_json() {
    let config: AzureStorageConfig =
        serde_json::from_str(r#"{"connection_string": "UseDevelopmentStorage=true"}"#).unwrap();
    assert_eq!(config.message_encoding, MessageEncoding::Base64);
    assert_eq!(config.request_timeout_seconds, 30);
}
