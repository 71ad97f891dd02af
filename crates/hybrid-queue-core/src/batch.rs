//! Bounded fan-out of per-item operations in consecutive groups.

use crate::cancellation::Cancellation;
use crate::error::HybridQueueError;
use futures::future::join_all;
use std::future::Future;
use std::num::NonZeroUsize;
use tracing::{debug, error};

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;

/// Group size used when callers do not pick one
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Outcome of a fully successful batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Size of each group, in execution order
    pub group_sizes: Vec<usize>,
}

impl BatchReport {
    /// Total number of items processed
    pub fn items(&self) -> usize {
        self.group_sizes.iter().sum()
    }

    pub fn groups(&self) -> usize {
        self.group_sizes.len()
    }
}

/// Runs one operation per item, at most `batch_size` at a time
///
/// Items are split into consecutive groups. Every member of a group runs
/// concurrently and the whole group settles before the next one starts. The
/// first failing group ends the run; its error is the first failure in item
/// order, and later groups are never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCoordinator {
    batch_size: NonZeroUsize,
}

impl BatchCoordinator {
    /// Create a coordinator; `batch_size` must be positive
    pub fn new(batch_size: usize) -> Result<Self, HybridQueueError> {
        NonZeroUsize::new(batch_size)
            .map(|batch_size| Self { batch_size })
            .ok_or_else(|| HybridQueueError::invalid_argument("batch_size", "must be greater than zero"))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Run `operation` for every item
    pub async fn run<I, F, Fut>(
        &self,
        items: I,
        cancel: &Cancellation,
        mut operation: F,
    ) -> Result<BatchReport, HybridQueueError>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<(), HybridQueueError>>,
    {
        let mut items = items.into_iter().peekable();
        let mut report = BatchReport::default();

        while items.peek().is_some() {
            let group: Vec<Fut> = items
                .by_ref()
                .take(self.batch_size.get())
                .map(&mut operation)
                .collect();
            let group_size = group.len();
            let group_index = report.group_sizes.len();

            debug!(group_index, group_size, "Running batch group");
            let results = cancel.run(join_all(group)).await?;

            if let Some(e) = results.into_iter().find_map(Result::err) {
                error!(group_index, error = %e, "Batch group failed, skipping remaining groups");
                return Err(e);
            }
            report.group_sizes.push(group_size);
        }

        Ok(report)
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}
