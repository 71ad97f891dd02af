//! Tests for the batch coordinator.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_zero_batch_size_is_invalid() {
    let err = BatchCoordinator::new(0).unwrap_err();
    assert!(matches!(
        err,
        HybridQueueError::InvalidArgument { ref argument, .. } if argument == "batch_size"
    ));
}

#[test]
fn test_default_batch_size() {
    assert_eq!(BatchCoordinator::default().batch_size(), DEFAULT_BATCH_SIZE);
}

#[tokio::test]
async fn test_groups_are_consecutive_and_bounded() {
    let coordinator = BatchCoordinator::new(3).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let report = coordinator
        .run(0..10, &Cancellation::none(), |item| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(item);
                Ok::<(), HybridQueueError>(())
            }
        })
        .await
        .unwrap();

    assert_eq!(report.group_sizes, vec![3, 3, 3, 1]);
    assert_eq!(report.items(), 10);
    assert_eq!(report.groups(), 4);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_empty_input_runs_nothing() {
    let report = BatchCoordinator::new(4)
        .unwrap()
        .run(Vec::<u32>::new(), &Cancellation::none(), |_| async { Ok::<(), HybridQueueError>(()) })
        .await
        .unwrap();

    assert_eq!(report.groups(), 0);
}

#[tokio::test]
async fn test_group_members_run_concurrently_and_groups_do_not_overlap() {
    let coordinator = BatchCoordinator::new(3).unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    coordinator
        .run(0..9, &Cancellation::none(), |_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), HybridQueueError>(())
            }
        })
        .await
        .unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failure_settles_group_and_skips_later_groups() {
    let coordinator = BatchCoordinator::new(3).unwrap();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(AtomicUsize::new(0));

    let err = coordinator
        .run(0..10, &Cancellation::none(), |item| {
            let completed = completed.clone();
            started.fetch_add(1, Ordering::SeqCst);
            async move {
                if item == 4 {
                    return Err(HybridQueueError::invalid_argument("item", "item 4 is bad"));
                }
                // Let the failing member finish first
                tokio::time::sleep(Duration::from_millis(5)).await;
                completed.lock().unwrap().push(item);
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, HybridQueueError::InvalidArgument { .. }));
    assert_eq!(started.load(Ordering::SeqCst), 6);

    let mut completed = completed.lock().unwrap().clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![0, 1, 2, 3, 5]);
}

#[tokio::test]
async fn test_first_failure_in_item_order_is_reported() {
    let err = BatchCoordinator::new(4)
        .unwrap()
        .run(0..4, &Cancellation::none(), |item| async move {
            match item {
                1 => Err(HybridQueueError::InvariantViolation {
                    message: "first".to_string(),
                }),
                3 => Err(HybridQueueError::Cancelled),
                _ => Ok(()),
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, HybridQueueError::InvariantViolation { ref message } if message == "first"));
}

#[tokio::test]
async fn test_cancellation_stops_the_run() {
    let source = crate::cancellation::CancellationSource::new();
    let token = source.token();
    let started = Arc::new(AtomicUsize::new(0));

    let run = {
        let started = started.clone();
        async move {
            BatchCoordinator::new(2)
                .unwrap()
                .run(0..6, &token, |_| {
                    started.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<(), HybridQueueError>(())
                    }
                })
                .await
        }
    };
    let handle = tokio::spawn(run);

    tokio::time::sleep(Duration::from_millis(10)).await;
    source.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(HybridQueueError::Cancelled)));
    assert_eq!(started.load(Ordering::SeqCst), 2);
}
