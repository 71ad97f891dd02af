//! Azure Storage REST plumbing shared by the queue transport and the blob store.
//!
//! The Queue and Blob services are called directly over HTTPS instead of through an
//! SDK, which keeps the dependency footprint small and lets unit tests run against
//! a mock HTTP server.
//!
//! ## Authentication
//!
//! Requests are authorized with Shared Key: an HMAC-SHA256 over a canonical
//! string built from the verb, selected standard headers, all `x-ms-*` headers and
//! the canonicalized resource, keyed with the base64-decoded account key.
//!
//! ## Connection strings
//!
//! Both the account form (`AccountName=...;AccountKey=...`) and
//! `UseDevelopmentStorage=true` (the Azurite emulator) are accepted.

use crate::error::{ConfigurationError, QueueError, SerializationError, StorageError};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// REST API version sent with every request
pub const STORAGE_API_VERSION: &str = "2021-08-06";

const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEVELOPMENT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";
const DEVELOPMENT_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

// ============================================================================
// Error Types
// ============================================================================

/// Azure Storage specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Storage service error ({status}): {code} - {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AzureError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::NetworkError(_) => true,
            Self::Timeout { .. } => true,
            Self::Service { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::ConfigurationError(_) => false,
            Self::SerializationError(_) => false,
        }
    }

    /// Service error code, when the service returned one
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// HTTP status, when the service answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map to the transport error taxonomy
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout { timeout_ms } => QueueError::Timeout {
                duration: chrono::Duration::milliseconds(timeout_ms as i64),
            },
            Self::Service { code, message, .. } => QueueError::ProviderError {
                provider: "AzureStorage".to_string(),
                code,
                message,
            },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(message) => {
                QueueError::SerializationError(SerializationError::Xml { message })
            }
        }
    }

    /// Map to the overflow store error taxonomy
    pub fn to_storage_error(self) -> StorageError {
        match self {
            Self::Authentication(message) => StorageError::AuthenticationFailed { message },
            Self::NetworkError(message) => StorageError::ConnectionFailed { message },
            Self::Timeout { timeout_ms } => StorageError::Timeout { timeout_ms },
            Self::Service {
                status,
                code,
                message,
            } => StorageError::ServiceError {
                status,
                code,
                message,
            },
            Self::ConfigurationError(message) => {
                StorageError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(message) => StorageError::InternalError { message },
        }
    }
}

// ============================================================================
// Connection String
// ============================================================================

/// Parsed storage account connection string
#[derive(Clone)]
pub struct StorageConnectionString {
    pub account_name: String,
    account_key: Zeroizing<Vec<u8>>,
    pub queue_endpoint: Url,
    pub blob_endpoint: Url,
}

impl StorageConnectionString {
    /// Parse a connection string
    ///
    /// # Errors
    ///
    /// Returns [`AzureError::ConfigurationError`] when the account name or key is
    /// missing, the key is not base64, or an endpoint is not a valid URL.
    pub fn parse(connection_string: &str) -> Result<Self, AzureError> {
        let settings: BTreeMap<String, String> = connection_string
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.split_once('='))
            .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::from_parts(
                DEVELOPMENT_ACCOUNT_NAME,
                DEVELOPMENT_ACCOUNT_KEY,
                DEVELOPMENT_QUEUE_ENDPOINT,
                DEVELOPMENT_BLOB_ENDPOINT,
            );
        }

        let account_name = settings.get("accountname").ok_or_else(|| {
            AzureError::ConfigurationError("Connection string has no AccountName".to_string())
        })?;
        let account_key = settings.get("accountkey").ok_or_else(|| {
            AzureError::ConfigurationError("Connection string has no AccountKey".to_string())
        })?;

        let protocol = settings
            .get("defaultendpointsprotocol")
            .map(String::as_str)
            .unwrap_or("https");
        let suffix = settings
            .get("endpointsuffix")
            .map(String::as_str)
            .unwrap_or("core.windows.net");

        let queue_endpoint = settings
            .get("queueendpoint")
            .cloned()
            .unwrap_or_else(|| format!("{}://{}.queue.{}", protocol, account_name, suffix));
        let blob_endpoint = settings
            .get("blobendpoint")
            .cloned()
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Self::from_parts(account_name, account_key, &queue_endpoint, &blob_endpoint)
    }

    fn from_parts(
        account_name: &str,
        account_key: &str,
        queue_endpoint: &str,
        blob_endpoint: &str,
    ) -> Result<Self, AzureError> {
        let key = STANDARD.decode(account_key).map_err(|e| {
            AzureError::ConfigurationError(format!("AccountKey is not valid base64: {}", e))
        })?;

        let parse_endpoint = |name: &str, value: &str| {
            Url::parse(value.trim_end_matches('/')).map_err(|e| {
                AzureError::ConfigurationError(format!("Invalid {}: {}", name, e))
            })
        };

        Ok(Self {
            account_name: account_name.to_string(),
            account_key: Zeroizing::new(key),
            queue_endpoint: parse_endpoint("QueueEndpoint", queue_endpoint)?,
            blob_endpoint: parse_endpoint("BlobEndpoint", blob_endpoint)?,
        })
    }
}

impl fmt::Debug for StorageConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("queue_endpoint", &self.queue_endpoint.as_str())
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}

/// Append a path segment to an endpoint, keeping any existing path prefix
pub(crate) fn resource_url(endpoint: &Url, segments: &[&str]) -> Result<Url, AzureError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| AzureError::ConfigurationError(format!("Endpoint {} cannot be a base", endpoint)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

// ============================================================================
// Shared Key Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Shared Key signer for Queue and Blob service requests
#[derive(Clone)]
pub(crate) struct SharedKeySigner {
    account_name: String,
    account_key: Zeroizing<Vec<u8>>,
}

/// Request fields that take part in the signature
pub(crate) struct SignableRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub content_length: usize,
    pub content_type: Option<&'a str>,
    /// `x-ms-*` headers, in any order
    pub ms_headers: &'a [(String, String)],
}

impl SharedKeySigner {
    pub(crate) fn new(connection: &StorageConnectionString) -> Self {
        Self {
            account_name: connection.account_name.clone(),
            account_key: connection.account_key.clone(),
        }
    }

    /// Build the canonical string-to-sign
    pub(crate) fn string_to_sign(&self, request: &SignableRequest<'_>) -> String {
        let content_length = if request.content_length == 0 {
            String::new()
        } else {
            request.content_length.to_string()
        };

        // Content-Encoding, Content-Language, Content-Length, Content-MD5,
        // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
        // If-Unmodified-Since, Range
        let standard_headers = [
            "",
            "",
            content_length.as_str(),
            "",
            request.content_type.unwrap_or(""),
            "",
            "",
            "",
            "",
            "",
            "",
        ];

        let mut canonical = String::new();
        canonical.push_str(request.method.as_str());
        canonical.push('\n');
        for header in standard_headers {
            canonical.push_str(header);
            canonical.push('\n');
        }
        canonical.push_str(&self.canonicalized_headers(request.ms_headers));
        canonical.push_str(&self.canonicalized_resource(request.url));
        canonical
    }

    fn canonicalized_headers(&self, ms_headers: &[(String, String)]) -> String {
        let mut headers: Vec<(String, String)> = ms_headers
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .filter(|(k, _)| k.starts_with("x-ms-"))
            .collect();
        headers.sort();

        headers
            .into_iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect()
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account_name, url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            params
                .entry(key.to_ascii_lowercase())
                .or_default()
                .push(value.into_owned());
        }

        for (key, mut values) in params {
            values.sort();
            resource.push('\n');
            resource.push_str(&key);
            resource.push(':');
            resource.push_str(&values.join(","));
        }

        resource
    }

    /// Compute the `Authorization` header value
    pub(crate) fn authorization(&self, request: &SignableRequest<'_>) -> Result<String, AzureError> {
        let string_to_sign = self.string_to_sign(request);
        let mut mac = HmacSha256::new_from_slice(&self.account_key).map_err(|e| {
            AzureError::ConfigurationError(format!("Unusable account key: {}", e))
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account_name, signature))
    }
}

/// RFC 1123 date as required by `x-ms-date`
pub(crate) fn rfc1123(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ============================================================================
// REST Client
// ============================================================================

/// Successful response from the storage service
#[derive(Debug)]
pub(crate) struct AzureResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Request body with its content type
pub(crate) struct RequestBody<'a> {
    pub content_type: &'a str,
    pub content: Bytes,
}

/// Signed HTTP client for one storage account
#[derive(Clone)]
pub(crate) struct AzureRestClient {
    http_client: HttpClient,
    signer: Arc<SharedKeySigner>,
    timeout_ms: u64,
}

impl AzureRestClient {
    pub(crate) fn new(
        connection: &StorageConnectionString,
        timeout: std::time::Duration,
    ) -> Result<Self, AzureError> {
        let http_client = HttpClient::builder().timeout(timeout).build().map_err(|e| {
            AzureError::NetworkError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            http_client,
            signer: Arc::new(SharedKeySigner::new(connection)),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Sign and send a request; non-success statuses become [`AzureError`]
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<RequestBody<'_>>,
        extra_ms_headers: &[(&str, &str)],
    ) -> Result<AzureResponse, AzureError> {
        let mut ms_headers = vec![
            ("x-ms-date".to_string(), rfc1123(&Utc::now())),
            ("x-ms-version".to_string(), STORAGE_API_VERSION.to_string()),
        ];
        ms_headers.extend(
            extra_ms_headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let content_length = body.as_ref().map(|b| b.content.len()).unwrap_or(0);
        let content_type = body.as_ref().map(|b| b.content_type);

        let authorization = self.signer.authorization(&SignableRequest {
            method: &method,
            url: &url,
            content_length,
            content_type,
            ms_headers: &ms_headers,
        })?;

        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .header("Authorization", authorization);
        for (key, value) in &ms_headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", body.content_type)
                .body(body.content);
        } else if method == Method::PUT || method == Method::POST {
            request = request.header("Content-Length", "0");
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AzureError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else if e.is_connect() {
                AzureError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AzureError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| AzureError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            return Ok(AzureResponse { status, body });
        }

        let (xml_code, message) = parse_error_response(&body);
        let code = header_code
            .or(xml_code)
            .unwrap_or_else(|| "Unknown".to_string());
        let message = message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            code = %code,
            "Storage request rejected"
        );

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AzureError::Authentication(format!("{}: {}", code, message)));
        }

        Err(AzureError::Service {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Pull `Code` and `Message` out of an error response body
pub(crate) fn parse_error_response(body: &[u8]) -> (Option<String>, Option<String>) {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let Ok(xml) = std::str::from_utf8(body) else {
        return (None, None);
    };

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut code = None;
    let mut message = None;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Code" => in_code = true,
                b"Message" => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (code, message)
}
