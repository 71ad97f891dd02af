//! Azure Queue Storage transport over the Queue service REST API.

use super::azure::{resource_url, AzureError, AzureRestClient, RequestBody, StorageConnectionString};
use crate::client::{QueueTransport, MAX_RECEIVE_BATCH};
use crate::error::{QueueError, SerializationError, ValidationError};
use crate::message::{MessageId, PopReceipt, QueueName, ReceivedQueueMessage, SendOptions, Timestamp};
use crate::provider::{AzureStorageConfig, MessageEncoding};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[cfg(test)]
#[path = "azure_queue_tests.rs"]
mod tests;

/// [`QueueTransport`] backed by an Azure Storage queue
#[derive(Clone)]
pub struct AzureQueueTransport {
    client: AzureRestClient,
    queue_url: Url,
    queue_name: QueueName,
    encoding: MessageEncoding,
}

impl AzureQueueTransport {
    /// Create a transport for `queue_name` in the account named by the configuration
    ///
    /// # Errors
    ///
    /// Fails when the connection string cannot be parsed or the HTTP client cannot
    /// be built.
    pub fn new(config: &AzureStorageConfig, queue_name: QueueName) -> Result<Self, QueueError> {
        let connection = StorageConnectionString::parse(&config.connection_string)
            .map_err(AzureError::to_queue_error)?;
        Self::from_connection(
            &connection,
            queue_name,
            config.message_encoding,
            std::time::Duration::from_secs(config.request_timeout_seconds),
        )
    }

    pub(crate) fn from_connection(
        connection: &StorageConnectionString,
        queue_name: QueueName,
        encoding: MessageEncoding,
        timeout: std::time::Duration,
    ) -> Result<Self, QueueError> {
        let client =
            AzureRestClient::new(connection, timeout).map_err(AzureError::to_queue_error)?;
        let queue_url = resource_url(&connection.queue_endpoint, &[queue_name.as_str()])
            .map_err(AzureError::to_queue_error)?;

        Ok(Self {
            client,
            queue_url,
            queue_name,
            encoding,
        })
    }

    fn messages_url(&self) -> Result<Url, QueueError> {
        resource_url(&self.queue_url, &["messages"]).map_err(AzureError::to_queue_error)
    }

    fn encode_body(&self, body: &str) -> String {
        match self.encoding {
            MessageEncoding::Base64 => STANDARD.encode(body.as_bytes()),
            MessageEncoding::None => quick_xml::escape::partial_escape(body).into_owned(),
        }
    }

    fn decode_body(&self, text: String) -> Result<String, QueueError> {
        match self.encoding {
            MessageEncoding::Base64 => {
                let raw = STANDARD.decode(text.trim()).map_err(|e| {
                    QueueError::SerializationError(SerializationError::InvalidBase64 {
                        message: e.to_string(),
                    })
                })?;
                String::from_utf8(raw)
                    .map_err(|_| QueueError::SerializationError(SerializationError::InvalidUtf8))
            }
            MessageEncoding::None => Ok(text),
        }
    }

    fn map_queue_error(&self, error: AzureError) -> QueueError {
        match error.error_code() {
            Some("QueueNotFound") => QueueError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            },
            Some("MessageTooLarge") | Some("RequestBodyTooLarge") => QueueError::MessageTooLarge {
                size: 0,
                max_size: self.encoding.max_message_bytes(),
            },
            _ => error.to_queue_error(),
        }
    }
}

impl fmt::Debug for AzureQueueTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureQueueTransport")
            .field("queue_url", &self.queue_url.as_str())
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for AzureQueueTransport {
    async fn create_if_not_exists(&self) -> Result<bool, QueueError> {
        let result = self
            .client
            .execute(Method::PUT, self.queue_url.clone(), None, &[])
            .await;

        match result {
            // 201 when created, 204 when an identical queue already exists
            Ok(response) => Ok(response.status == StatusCode::CREATED),
            Err(e) if e.error_code() == Some("QueueAlreadyExists") => Ok(false),
            Err(e) => Err(self.map_queue_error(e)),
        }
    }

    async fn send_message(&self, body: &str, options: &SendOptions) -> Result<(), QueueError> {
        let max_size = self.max_message_bytes();
        if body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: body.len(),
                max_size,
            });
        }

        let mut url = self.messages_url()?;
        let mut params = Vec::new();
        if let Some(delay) = options.initial_visibility_delay {
            params.push(("visibilitytimeout", delay.num_seconds().to_string()));
        }
        if let Some(ttl) = options.time_to_live {
            params.push(("messagettl", ttl.num_seconds().to_string()));
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        let payload = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            self.encode_body(body)
        );

        self.client
            .execute(
                Method::POST,
                url,
                Some(RequestBody {
                    content_type: "application/xml",
                    content: Bytes::from(payload),
                }),
                &[],
            )
            .await
            .map_err(|e| self.map_queue_error(e))?;

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

        let mut url = self.messages_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("numofmessages", &max_messages.to_string());
            if let Some(timeout) = visibility_timeout {
                query.append_pair("visibilitytimeout", &timeout.num_seconds().to_string());
            }
        }

        let response = self
            .client
            .execute(Method::GET, url, None, &[])
            .await
            .map_err(|e| self.map_queue_error(e))?;

        let xml = std::str::from_utf8(&response.body)
            .map_err(|_| QueueError::SerializationError(SerializationError::InvalidUtf8))?;

        parse_messages_response(xml)?
            .into_iter()
            .map(|raw| self.to_received(raw))
            .collect()
    }

    async fn delete_message(
        &self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let mut url = resource_url(&self.queue_url, &["messages", message_id.as_str()])
            .map_err(AzureError::to_queue_error)?;
        url.query_pairs_mut()
            .append_pair("popreceipt", pop_receipt.as_str());

        let result = self.client.execute(Method::DELETE, url, None, &[]).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match (e.status(), e.error_code()) {
                (Some(404), Some("MessageNotFound")) | (Some(400), Some("PopReceiptMismatch")) => {
                    Err(QueueError::PreconditionFailed {
                        message_id: message_id.to_string(),
                        message: e.to_string(),
                    })
                }
                _ => Err(self.map_queue_error(e)),
            },
        }
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    fn max_message_bytes(&self) -> usize {
        self.encoding.max_message_bytes()
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// One `<QueueMessage>` element of a get-messages response
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RawQueueMessage {
    pub message_id: Option<String>,
    pub pop_receipt: Option<String>,
    pub message_text: Option<String>,
    pub dequeue_count: Option<String>,
    pub insertion_time: Option<String>,
    pub time_next_visible: Option<String>,
}

impl AzureQueueTransport {
    fn to_received(&self, raw: RawQueueMessage) -> Result<ReceivedQueueMessage, QueueError> {
        let missing = |field: &str| {
            QueueError::SerializationError(SerializationError::Xml {
                message: format!("QueueMessage is missing {}", field),
            })
        };

        let message_id = raw
            .message_id
            .as_deref()
            .ok_or_else(|| missing("MessageId"))
            .and_then(|id| MessageId::from_str(id).map_err(QueueError::from))?;
        let pop_receipt = raw
            .pop_receipt
            .as_deref()
            .ok_or_else(|| missing("PopReceipt"))
            .and_then(|r| PopReceipt::from_str(r).map_err(QueueError::from))?;
        let body = self.decode_body(raw.message_text.unwrap_or_default())?;

        Ok(ReceivedQueueMessage {
            message_id,
            pop_receipt,
            body,
            dequeue_count: raw
                .dequeue_count
                .and_then(|c| c.parse().ok())
                .unwrap_or(1),
            inserted_at: parse_rfc1123(raw.insertion_time.as_deref()),
            next_visible_at: parse_rfc1123(raw.time_next_visible.as_deref()),
        })
    }
}

fn parse_rfc1123(value: Option<&str>) -> Timestamp {
    value
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
        .unwrap_or_else(Timestamp::now)
}

/// Parse a `QueueMessagesList` document
pub(crate) fn parse_messages_response(xml: &str) -> Result<Vec<RawQueueMessage>, QueueError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    #[derive(Clone, Copy)]
    enum Field {
        MessageId,
        PopReceipt,
        MessageText,
        DequeueCount,
        InsertionTime,
        TimeNextVisible,
    }

    // Message text is kept verbatim; only the metadata fields are trimmed
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut current: Option<RawQueueMessage> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"QueueMessage" => current = Some(RawQueueMessage::default()),
                b"MessageId" => field = Some(Field::MessageId),
                b"PopReceipt" => field = Some(Field::PopReceipt),
                b"MessageText" => {
                    if let Some(message) = current.as_mut() {
                        message.message_text = Some(String::new());
                    }
                    field = Some(Field::MessageText)
                }
                b"DequeueCount" => field = Some(Field::DequeueCount),
                b"InsertionTime" => field = Some(Field::InsertionTime),
                b"TimeNextVisible" => field = Some(Field::TimeNextVisible),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                if let (Some(message), Some(f)) = (current.as_mut(), field) {
                    let text = e.unescape().map(|s| s.into_owned()).map_err(|e| {
                        QueueError::SerializationError(SerializationError::Xml {
                            message: format!("Failed to parse XML: {}", e),
                        })
                    })?;
                    let trimmed = || Some(text.trim().to_string());
                    match f {
                        Field::MessageText => {
                            message.message_text.get_or_insert_with(String::new).push_str(&text)
                        }
                        Field::MessageId => message.message_id = trimmed(),
                        Field::PopReceipt => message.pop_receipt = trimmed(),
                        Field::DequeueCount => message.dequeue_count = trimmed(),
                        Field::InsertionTime => message.insertion_time = trimmed(),
                        Field::TimeNextVisible => message.time_next_visible = trimmed(),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                field = None;
                if e.name().as_ref() == b"QueueMessage" {
                    if let Some(message) = current.take() {
                        messages.push(message);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QueueError::SerializationError(SerializationError::Xml {
                    message: format!("XML parsing error: {}", e),
                }))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}
