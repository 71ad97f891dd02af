//! Cooperative cancellation for hybrid queue operations.
//!
//! A [`CancellationSource`] hands out [`Cancellation`] tokens. Every facade
//! operation takes a token and runs each collaborator call through
//! [`Cancellation::run`]; once the source fires, the in-flight call is dropped and
//! the operation fails with [`HybridQueueError::Cancelled`]. Work a collaborator
//! already committed (a sent message, an uploaded object) is not rolled back.

use crate::error::HybridQueueError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;

/// Owner side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancellationSource {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSource {
    /// Create a source that has not fired
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Get a token observing this source
    pub fn token(&self) -> Cancellation {
        Cancellation {
            receiver: self.sender.subscribe(),
        }
    }

    /// Signal cancellation to every token
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check whether the source has fired
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// A token that never fires
    pub fn none() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with [`HybridQueueError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<(), HybridQueueError> {
        if self.is_cancelled() {
            Err(HybridQueueError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is requested; never resolves for [`Cancellation::none`]
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            let fired = *receiver.borrow_and_update();
            if fired {
                return;
            }
            if receiver.changed().await.is_err() {
                // Source dropped without firing
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `future` to completion unless cancellation is requested first
    ///
    /// The future is dropped, and so aborted, on cancellation.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, HybridQueueError>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(HybridQueueError::Cancelled),
            output = future => Ok(output),
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::none()
    }
}
