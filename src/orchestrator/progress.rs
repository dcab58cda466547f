//! Shared progress counters and the periodic snapshot publisher.

use crate::types::ProgressState;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Interval between progress snapshot emissions
pub(crate) const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Lock-free completion counters shared by every worker of a run
#[derive(Debug, Default)]
pub struct ProgressTracker {
    completed: AtomicU64,
    failed: AtomicU64,
    total: AtomicU64,
}

impl ProgressTracker {
    /// Create a tracker with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of tasks in the run
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Record that one task reached a terminal state
    pub fn record_completion(&self, succeeded: bool) {
        // completed is bumped before failed and read after it, so a snapshot
        // never shows more failures than completions
        self.completed.fetch_add(1, Ordering::SeqCst);
        if !succeeded {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Read the counters
    pub fn snapshot(&self) -> ProgressState {
        let failed = self.failed.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        ProgressState {
            completed,
            failed,
            total: self.total.load(Ordering::SeqCst),
        }
    }
}

/// Spawn a background task that publishes a snapshot every tick until `stop` fires
pub(crate) fn spawn_ticker(
    tracker: Arc<ProgressTracker>,
    feed: Arc<watch::Sender<ProgressState>>,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = tracker.snapshot();
                    feed.send_if_modified(|current| {
                        if *current == snapshot {
                            false
                        } else {
                            *current = snapshot;
                            true
                        }
                    });
                }
                _ = stop.cancelled() => {
                    break;
                }
            }
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let tracker = ProgressTracker::new();
        tracker.set_total(3);
        tracker.record_completion(true);
        tracker.record_completion(false);

        assert_eq!(
            tracker.snapshot(),
            ProgressState {
                completed: 2,
                failed: 1,
                total: 3
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_are_never_lost() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.set_total(8 * 1000);

        let mut handles = Vec::new();
        for worker in 0..8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..1000 {
                    tracker.record_completion((worker + i) % 4 != 0);
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed, 8000);
        assert_eq!(snapshot.failed, 2000);
        assert!(snapshot.is_complete());
    }

    #[tokio::test]
    async fn ticker_publishes_until_stopped() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.set_total(2);
        let (tx, mut rx) = watch::channel(ProgressState::default());
        let stop = CancellationToken::new();

        let handle = spawn_ticker(tracker.clone(), Arc::new(tx), stop.clone());

        // First tick fires immediately
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().total, 2);

        tracker.record_completion(true);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().completed, 1);

        stop.cancel();
        handle.await.unwrap();
    }
}
