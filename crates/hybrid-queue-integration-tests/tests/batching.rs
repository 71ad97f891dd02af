//! Integration tests for batched sends
//!
//! These tests verify:
//! - Items are sent in consecutive groups of the requested size
//! - A failing group stops the batch while earlier groups stay sent
//! - Oversized items in a batch are routed through the overflow store

mod common;

use common::{container_name, queue_name, Customer, RecordingTransport, SMALL_LIMIT};
use hybrid_queue_core::{AddOptions, Cancellation, HybridQueue, HybridQueueError};
use hybrid_queue_runtime::providers::{InMemoryOverflowStore, InMemoryQueueTransport};
use hybrid_queue_runtime::{InMemoryConfig, QueueError};
use std::sync::Arc;

async fn recording_queue(
    rejected: &[&str],
) -> anyhow::Result<(HybridQueue, RecordingTransport, InMemoryQueueTransport)> {
    let inner = InMemoryQueueTransport::new(
        queue_name("batches"),
        InMemoryConfig {
            max_message_bytes: SMALL_LIMIT,
            ..InMemoryConfig::default()
        },
    );
    let transport = RecordingTransport::new(inner.clone(), rejected);
    let store = InMemoryOverflowStore::new(container_name("batches"));
    let queue = HybridQueue::new(Arc::new(transport.clone()), Arc::new(store));
    queue.setup(false, &Cancellation::none()).await?;
    Ok((queue, transport, inner))
}

fn numbered(range: std::ops::Range<u32>) -> Vec<String> {
    range.map(|i| format!("item-{}", i)).collect()
}

#[tokio::test]
async fn test_ten_items_in_groups_of_three() -> anyhow::Result<()> {
    let (queue, transport, inner) = recording_queue(&[]).await?;
    let items = numbered(1..11);

    let report = queue
        .add_many(&items, &AddOptions::new(), 3, &Cancellation::none())
        .await?;

    assert_eq!(report.group_sizes, vec![3, 3, 3, 1]);
    assert_eq!(transport.attempts().len(), 10);
    assert_eq!(inner.approximate_message_count(), 10);
    Ok(())
}

#[tokio::test]
async fn test_failure_in_second_group_stops_the_batch() -> anyhow::Result<()> {
    let (queue, transport, inner) = recording_queue(&["item-5"]).await?;
    let items = numbered(1..11);

    let err = queue
        .add_many(&items, &AddOptions::new(), 3, &Cancellation::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HybridQueueError::Transport(QueueError::ConnectionFailed { .. })
    ));
    assert!(err.is_transient());

    // Group one and the healthy members of group two were sent
    let mut sent = inner.peek_bodies();
    sent.sort();
    assert_eq!(sent, vec!["item-1", "item-2", "item-3", "item-4", "item-6"]);

    // Group three was never attempted
    let attempted = transport.attempts();
    assert_eq!(attempted.len(), 6);
    assert!(!attempted.iter().any(|body| body == "item-7"));
    Ok(())
}

#[tokio::test]
async fn test_batch_mixes_inline_and_overflow_items() -> anyhow::Result<()> {
    let (queue, _, inner) = recording_queue(&[]).await?;
    let cancel = Cancellation::none();
    let items = vec![
        Customer::new("Small"),
        Customer::with_json_len(SMALL_LIMIT * 4),
        Customer::new("Tiny"),
    ];

    queue.add_many(&items, &AddOptions::new(), 25, &cancel).await?;
    assert_eq!(inner.approximate_message_count(), 3);

    let mut received: Vec<_> = queue
        .receive::<Customer>(3, None, &cancel)
        .await?
        .into_iter()
        .map(|m| (m.overflow_id().is_some(), m.into_content()))
        .collect();
    received.sort_by(|a, b| a.1.name.cmp(&b.1.name));

    assert_eq!(received.len(), 3);
    let overflowed: Vec<_> = received.iter().filter(|(o, _)| *o).collect();
    assert_eq!(overflowed.len(), 1);
    assert_eq!(overflowed[0].1, items[1]);
    Ok(())
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected() -> anyhow::Result<()> {
    let (queue, transport, _) = recording_queue(&[]).await?;

    let err = queue
        .add_many(&numbered(0..3), &AddOptions::new(), 0, &Cancellation::none())
        .await
        .unwrap_err();

    assert!(matches!(err, HybridQueueError::InvalidArgument { .. }));
    assert!(transport.attempts().is_empty());
    Ok(())
}
