//! Integration tests for sending and receiving through the hybrid queue
//!
//! These tests verify:
//! - Inline round trips for text, scalar and structured payloads
//! - The overflow threshold, measured in UTF-8 bytes
//! - Forced overflow and empty receives
//! - Case-insensitive structured decoding
//! - The UUID ambiguity of simple payloads

mod common;

use common::{Customer, MemoryQueue, SMALL_LIMIT};
use hybrid_queue_core::{AddOptions, Cancellation, HybridQueueError, Json, OverflowId};
use hybrid_queue_runtime::{QueueTransport, MessageId, PopReceipt, ReceivedQueueMessage};
use rust_decimal::Decimal;
use std::str::FromStr;

#[tokio::test]
async fn test_inline_round_trips() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();

    q.queue.add(&"plain text".to_string(), &AddOptions::new(), &cancel).await?;
    q.queue.add(&-42i64, &AddOptions::new(), &cancel).await?;
    q.queue.add(&Decimal::from_str("19.99")?, &AddOptions::new(), &cancel).await?;
    q.queue.add(&Customer::new("Grace"), &AddOptions::new(), &cancel).await?;

    assert_eq!(q.store.object_count(), 0);
    assert_eq!(
        q.transport.peek_bodies()[..3],
        ["plain text".to_string(), "-42".to_string(), "19.99".to_string()]
    );

    let text = q.queue.receive_one::<String>(None, &cancel).await?.unwrap();
    assert_eq!(text.content(), "plain text");
    assert!(text.overflow_id().is_none());

    let number = q.queue.receive_one::<i64>(None, &cancel).await?.unwrap();
    assert_eq!(*number.content(), -42);

    let price = q.queue.receive_one::<Decimal>(None, &cancel).await?.unwrap();
    assert_eq!(price.content().to_string(), "19.99");

    let customer = q.queue.receive_one::<Customer>(None, &cancel).await?.unwrap();
    assert_eq!(customer.content(), &Customer::new("Grace"));
    assert!(customer.overflow_id().is_none());
    Ok(())
}

#[tokio::test]
async fn test_structured_payload_at_limit_stays_inline() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();
    let customer = Customer::with_json_len(SMALL_LIMIT);

    let overflow_id = q.queue.add(&customer, &AddOptions::new(), &cancel).await?;

    assert!(overflow_id.is_none());
    assert_eq!(q.transport.peek_bodies()[0].len(), SMALL_LIMIT);
    Ok(())
}

#[tokio::test]
async fn test_one_byte_over_limit_overflows() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();
    let customer = Customer::with_json_len(SMALL_LIMIT + 1);

    let overflow_id = q
        .queue
        .add(&customer, &AddOptions::new(), &cancel)
        .await?
        .expect("payload should overflow");

    let body = &q.transport.peek_bodies()[0];
    assert_eq!(OverflowId::parse(body), Some(overflow_id));
    assert!(q.store.contains(&overflow_id));

    let message = q.queue.receive_one::<Customer>(None, &cancel).await?.unwrap();
    assert_eq!(message.content(), &customer);
    assert_eq!(message.overflow_id(), Some(overflow_id));
    Ok(())
}

#[tokio::test]
async fn test_multibyte_text_is_measured_in_bytes() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();
    // Fewer characters than the limit, more bytes
    let text = "ü".repeat(SMALL_LIMIT / 2 + 1);

    let overflow_id = q.queue.add(&text, &AddOptions::new(), &cancel).await?;
    assert!(overflow_id.is_some());

    let message = q.queue.receive_one::<String>(None, &cancel).await?.unwrap();
    assert_eq!(message.content(), &text);
    Ok(())
}

#[tokio::test]
async fn test_force_overflow() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();
    let options = AddOptions::new().with_force_overflow(true);

    let overflow_id = q.queue.add(&true, &options, &cancel).await?.unwrap();
    assert_eq!(q.transport.peek_bodies(), vec![overflow_id.to_string()]);

    let message = q.queue.receive_one::<bool>(None, &cancel).await?.unwrap();
    assert!(*message.content());
    assert_eq!(message.overflow_id(), Some(overflow_id));
    Ok(())
}

#[tokio::test]
async fn test_empty_receive() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;

    let messages = q
        .queue
        .receive_batch::<Customer>(None, &Cancellation::none())
        .await?;

    assert!(messages.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_field_names_match_case_insensitively() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();

    for body in [
        r#"{"Name":"Lin","Email":"lin@example.com","Tags":["vip"]}"#,
        r#"{"name":"Lin","email":"lin@example.com","tags":["vip"]}"#,
        r#"{"nAmE":"Lin","EMAIL":"lin@example.com","tAgS":["vip"]}"#,
    ] {
        q.transport
            .send_message(body, &Default::default())
            .await?;
    }

    let messages = q.queue.receive::<Customer>(3, None, &cancel).await?;
    assert_eq!(messages.len(), 3);
    for message in messages {
        assert_eq!(message.content().name, "Lin");
        assert_eq!(message.content().tags, vec!["vip".to_string()]);
    }
    Ok(())
}

#[tokio::test]
async fn test_uuid_shaped_text_is_read_as_a_reference() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let cancel = Cancellation::none();
    let looks_like_reference = OverflowId::new().to_string();

    // Sent inline: the value is short and not forced to overflow
    let sent = q.queue.add(&looks_like_reference, &AddOptions::new(), &cancel).await?;
    assert!(sent.is_none());

    let err = q
        .queue
        .receive_one::<String>(None, &cancel)
        .await
        .unwrap_err();
    match err {
        HybridQueueError::DecodeFailure { overflow_id, .. } => {
            assert_eq!(overflow_id.map(|id| id.to_string()), Some(looks_like_reference));
        }
        other => panic!("Expected DecodeFailure, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_decode_of_externally_received_message() -> anyhow::Result<()> {
    let q = MemoryQueue::new(SMALL_LIMIT).await?;
    let raw = ReceivedQueueMessage::new(
        MessageId::from_str("external-1")?,
        PopReceipt::generate(),
        "[3,1,2]".to_string(),
    );

    let message = q
        .queue
        .decode::<Json<Vec<u32>>>(raw, &Cancellation::none())
        .await?;

    assert_eq!(message.message_id().to_string(), "external-1");
    assert_eq!(message.into_content().into_inner(), vec![3, 1, 2]);
    Ok(())
}
