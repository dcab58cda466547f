//! Bounded admission of tasks into the run

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Semaphore with one permit per concurrent pull
///
/// A permit is moved into the worker that runs the task, so it is released
/// when the worker finishes by any path, unwinding included.
#[derive(Debug, Clone)]
pub(crate) struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for a free slot; `None` once the run is cancelled
    pub(crate) async fn admit(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_up_to_limit() {
        let gate = ConcurrencyGate::new(2);
        let cancel = CancellationToken::new();

        let first = gate.admit(&cancel).await.unwrap();
        let _second = gate.admit(&cancel).await.unwrap();
        assert_eq!(gate.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.admit(&cancel)).await;
        assert!(blocked.is_err(), "third admission must wait");

        drop(first);
        assert!(gate.admit(&cancel).await.is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_admission() {
        let gate = ConcurrencyGate::new(1);
        let cancel = CancellationToken::new();
        let _held = gate.admit(&cancel).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.admit(&cancel).await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_free_permit() {
        let gate = ConcurrencyGate::new(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(gate.admit(&cancel).await.is_none());
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn permit_released_when_worker_panics() {
        let gate = ConcurrencyGate::new(1);
        let cancel = CancellationToken::new();
        let permit = gate.admit(&cancel).await.unwrap();

        let worker = tokio::spawn(async move {
            let _permit = permit;
            panic!("worker failed");
        });
        assert!(worker.await.unwrap_err().is_panic());
        assert_eq!(gate.available(), 1);
    }
}
