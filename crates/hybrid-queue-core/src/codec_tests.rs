//! Tests for payload routing and resolution.

use super::*;
use crate::payload::Json;
use crate::test_support::{container_name, memory_backends, raw_message, MockStore, Order};
use hybrid_queue_runtime::providers::InMemoryOverflowStore;
use hybrid_queue_runtime::StorageError;

const LIMIT: usize = 64;

async fn codec() -> (PayloadEncoder, PayloadDecoder, InMemoryOverflowStore) {
    let (_, store) = memory_backends(LIMIT).await;
    let shared: Arc<dyn OverflowStore> = Arc::new(store.clone());
    (
        PayloadEncoder::new(shared.clone(), LIMIT),
        PayloadDecoder::new(shared),
        store,
    )
}

fn order_of_json_len(len: usize) -> Order {
    // {"id":1,"notes":""} is 19 bytes
    Order {
        id: 1,
        notes: "n".repeat(len - 19),
    }
}

// ============================================================================
// Encoder Tests
// ============================================================================

mod encoder_tests {
    use super::*;

    #[tokio::test]
    async fn test_small_text_stays_inline_without_copy() {
        let (encoder, _, store) = codec().await;
        let item = "hello".to_string();

        let encoded = encoder.encode(&item, false, &Cancellation::none()).await.unwrap();

        assert!(matches!(encoded.body, Cow::Borrowed("hello")));
        assert!(!encoded.is_overflow());
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_scalar_uses_display_form() {
        let (encoder, _, _) = codec().await;

        let encoded = encoder.encode(&-12i64, false, &Cancellation::none()).await.unwrap();
        assert_eq!(encoded.body, "-12");
    }

    #[tokio::test]
    async fn test_structured_at_limit_stays_inline() {
        let (encoder, _, store) = codec().await;
        let order = order_of_json_len(LIMIT);

        let encoded = encoder.encode(&order, false, &Cancellation::none()).await.unwrap();

        assert_eq!(encoded.body.len(), LIMIT);
        assert!(encoded.overflow_id.is_none());
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_structured_one_byte_over_limit_overflows() {
        let (encoder, _, store) = codec().await;
        let order = order_of_json_len(LIMIT + 1);

        let encoded = encoder.encode(&order, false, &Cancellation::none()).await.unwrap();

        let overflow_id = encoded.overflow_id.expect("expected an overflow object");
        assert_eq!(encoded.body, overflow_id.to_string());
        assert!(OverflowId::parse(&encoded.body).is_some());
        assert!(store.contains(&overflow_id));
        assert_eq!(
            store.content_type(&overflow_id).as_deref(),
            Some(JSON_CONTENT_TYPE)
        );

        let stored = store.open_read(&overflow_id).await.unwrap();
        let expected = serde_json::to_string(&order).unwrap();
        assert_eq!(stored, Bytes::from(expected));
    }

    #[tokio::test]
    async fn test_size_is_measured_in_utf8_bytes() {
        let (encoder, _, store) = codec().await;
        // 22 characters, 66 bytes
        let item = "€".repeat(22);

        let encoded = encoder.encode(&item, false, &Cancellation::none()).await.unwrap();

        assert!(encoded.is_overflow());
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_text_is_stored_as_json_string() {
        let (encoder, _, store) = codec().await;
        let item = "x".repeat(LIMIT + 1);

        let encoded = encoder.encode(&item, false, &Cancellation::none()).await.unwrap();

        let stored = store.open_read(&encoded.overflow_id.unwrap()).await.unwrap();
        assert_eq!(stored, Bytes::from(format!("\"{}\"", item)));
    }

    #[tokio::test]
    async fn test_force_overflow_routes_small_items() {
        let (encoder, _, store) = codec().await;

        let encoded = encoder.encode(&42u32, true, &Cancellation::none()).await.unwrap();

        let overflow_id = encoded.overflow_id.unwrap();
        assert_eq!(encoded.body, overflow_id.to_string());
        assert_eq!(store.open_read(&overflow_id).await.unwrap(), Bytes::from("42"));
    }

    #[tokio::test]
    async fn test_null_item_is_rejected_before_upload() {
        let (encoder, _, store) = codec().await;
        let item = Json(Option::<Order>::None);

        let err = encoder.encode(&item, true, &Cancellation::none()).await.unwrap_err();

        assert!(matches!(err, HybridQueueError::InvalidArgument { .. }));
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_propagates_unchanged() {
        let mut store = MockStore::new();
        store.expect_upload().times(1).returning(|_, _, _| {
            Err(StorageError::ConnectionFailed {
                message: "reset".to_string(),
            })
        });
        store.expect_container_name().return_const(container_name());

        let encoder = PayloadEncoder::new(Arc::new(store), LIMIT);
        let err = encoder
            .encode(&"x".repeat(LIMIT + 1), false, &Cancellation::none())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HybridQueueError::Storage(StorageError::ConnectionFailed { .. })
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancelled_encode_does_not_upload() {
        let mut store = MockStore::new();
        store.expect_upload().never();

        let source = crate::cancellation::CancellationSource::new();
        source.cancel();

        let encoder = PayloadEncoder::new(Arc::new(store), LIMIT);
        let err = encoder.encode(&1u8, true, &source.token()).await.unwrap_err();
        assert!(matches!(err, HybridQueueError::Cancelled));
    }
}

// ============================================================================
// Decoder Tests
// ============================================================================

mod decoder_tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_simple_values() {
        let (_, decoder, _) = codec().await;
        let cancel = Cancellation::none();

        let text: HybridMessage<String> = decoder.decode(raw_message("hi there"), &cancel).await.unwrap();
        assert_eq!(text.content(), "hi there");
        assert!(text.overflow_id().is_none());

        let number: HybridMessage<i32> = decoder.decode(raw_message("-5"), &cancel).await.unwrap();
        assert_eq!(*number.content(), -5);
    }

    #[tokio::test]
    async fn test_inline_structured_value_ignores_field_case() {
        let (_, decoder, _) = codec().await;

        let message: HybridMessage<Order> = decoder
            .decode(raw_message(r#"{"ID":3,"Notes":"rush"}"#), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(
            message.content(),
            &Order {
                id: 3,
                notes: "rush".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_lease_comes_from_raw_message() {
        let (_, decoder, _) = codec().await;
        let raw = raw_message("7");
        let message_id = raw.message_id.clone();
        let pop_receipt = raw.pop_receipt.clone();

        let message: HybridMessage<u8> = decoder.decode(raw, &Cancellation::none()).await.unwrap();

        assert_eq!(message.message_id(), &message_id);
        assert_eq!(message.pop_receipt(), &pop_receipt);
    }

    #[tokio::test]
    async fn test_overflow_reference_is_resolved() {
        let (encoder, decoder, _) = codec().await;
        let order = order_of_json_len(LIMIT * 3);
        let encoded = encoder.encode(&order, false, &Cancellation::none()).await.unwrap();

        // Surrounding whitespace does not hide a reference
        let body = format!("  {}\n", encoded.body);
        let message: HybridMessage<Order> = decoder
            .decode(raw_message(&body), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(message.content(), &order);
        assert_eq!(message.overflow_id(), encoded.overflow_id);
    }

    #[tokio::test]
    async fn test_overflowed_text_round_trips() {
        let (encoder, decoder, _) = codec().await;
        let item = "long text ".repeat(20);
        let encoded = encoder.encode(&item, false, &Cancellation::none()).await.unwrap();

        let message: HybridMessage<String> = decoder
            .decode(raw_message(&encoded.body), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(message.content(), &item);
        assert!(message.overflow_id().is_some());
    }

    #[tokio::test]
    async fn test_uuid_shaped_text_is_treated_as_reference() {
        let (_, decoder, _) = codec().await;
        let body = OverflowId::new().to_string();

        let err = decoder
            .decode::<String>(raw_message(&body), &Cancellation::none())
            .await
            .unwrap_err();

        match err {
            HybridQueueError::DecodeFailure { overflow_id, .. } => {
                assert_eq!(overflow_id.map(|id| id.to_string()), Some(body));
            }
            other => panic!("Expected DecodeFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_null_overflow_object_is_decode_failure() {
        let (_, decoder, store) = codec().await;
        let overflow_id = OverflowId::new();
        store
            .upload(&overflow_id, Bytes::from_static(b"null"), JSON_CONTENT_TYPE)
            .await
            .unwrap();

        let err = decoder
            .decode::<Json<Option<Order>>>(raw_message(&overflow_id.to_string()), &Cancellation::none())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HybridQueueError::DecodeFailure { overflow_id: Some(id), .. } if id == overflow_id
        ));
    }

    #[tokio::test]
    async fn test_null_inline_structured_body_is_decode_failure() {
        let (_, decoder, _) = codec().await;
        let raw = raw_message("null");
        let message_id = raw.message_id.clone();

        let err = decoder
            .decode::<Order>(raw, &Cancellation::none())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HybridQueueError::DecodeFailure { message_id: ref id, overflow_id: None, .. } if *id == message_id
        ));
    }

    #[tokio::test]
    async fn test_simple_conversion_failure_propagates() {
        let (_, decoder, _) = codec().await;

        let err = decoder
            .decode::<u16>(raw_message("not a number"), &Cancellation::none())
            .await
            .unwrap_err();

        assert!(matches!(err, HybridQueueError::Conversion { type_name: "u16", .. }));
    }

    #[tokio::test]
    async fn test_store_outage_is_not_a_decode_failure() {
        let mut store = MockStore::new();
        store.expect_open_read().returning(|_| {
            Err(StorageError::Timeout { timeout_ms: 100 })
        });

        let decoder = PayloadDecoder::new(Arc::new(store));
        let err = decoder
            .decode::<Order>(raw_message(&OverflowId::new().to_string()), &Cancellation::none())
            .await
            .unwrap_err();

        assert!(matches!(err, HybridQueueError::Storage(StorageError::Timeout { .. })));
        assert!(err.is_transient());
    }
}
