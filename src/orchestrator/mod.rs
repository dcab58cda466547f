//! Bounded-concurrency retry orchestration
//!
//! [`Orchestrator::run`] turns a list of image references into a
//! [`RunReport`]:
//!
//! - tasks are admitted in input order, at most `max_concurrency` at a time
//! - each admitted task runs its own retry loop with exponential backoff
//! - every terminal outcome bumps the shared progress counters, which a
//!   background ticker publishes on the progress feed
//! - cancelling the run token stops admission and interrupts in-flight pulls;
//!   the report still holds exactly one result per task
//!
//! # Example
//!
//! ```no_run
//! use parallel_pull::{Config, Orchestrator, registry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> parallel_pull::Result<()> {
//! let config = Config::default();
//! let registry = registry::connect(&config.registry)?;
//! let orchestrator = Orchestrator::new(registry, &config)?;
//!
//! let report = orchestrator
//!     .run(vec!["alpine:latest".to_string()], &CancellationToken::new())
//!     .await;
//! println!("{} of {} pulled", report.metrics.success_count, report.metrics.total_tasks);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
mod collector;
mod executor;
mod gate;
pub mod metrics;
mod progress;


pub use executor::RetryExecutor;
pub use progress::ProgressTracker;

use crate::config::{Config, MAX_CONCURRENCY, RetryConfig};
use crate::error::Result;
use crate::registry::Registry;
use crate::security::sanitize;
use crate::types::{ProgressState, RunReport};
use gate::ConcurrencyGate;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

/// Pulls a batch of images with bounded concurrency and per-image retries
pub struct Orchestrator {
    registry: Arc<dyn Registry>,
    concurrency: usize,
    retry: RetryConfig,
    progress_tx: Arc<watch::Sender<ProgressState>>,
}

impl Orchestrator {
    /// Create an orchestrator from a configuration, validating it first
    pub fn new(registry: Arc<dyn Registry>, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_retry(
            registry,
            config.max_concurrency,
            config.retry(),
        ))
    }

    /// Create an orchestrator from raw settings
    ///
    /// `concurrency` is clamped to `1..=MAX_CONCURRENCY`. The retry settings are
    /// taken as given, which allows sub-second delays and timeouts.
    pub fn with_retry(registry: Arc<dyn Registry>, concurrency: usize, retry: RetryConfig) -> Self {
        let (progress_tx, _) = watch::channel(ProgressState::default());
        Self {
            registry,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            retry,
            progress_tx: Arc::new(progress_tx),
        }
    }

    /// Effective concurrency limit
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Stream of progress snapshots
    ///
    /// Yields the latest snapshot immediately, then a new one whenever the
    /// ticker observes a change. The last value of a run always equals its
    /// final counters.
    pub fn progress_feed(&self) -> WatchStream<ProgressState> {
        WatchStream::new(self.subscribe())
    }

    /// Receiver over the same snapshots as [`Orchestrator::progress_feed`]
    ///
    /// `borrow()` on a retained receiver reads the latest published snapshot,
    /// which after [`Orchestrator::run`] returns is the final one.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.progress_tx.subscribe()
    }

    /// Pull every task and report the outcome of each
    ///
    /// `tasks` should already be deduplicated. Results are returned in input
    /// order. Cancelling `cancel` stops the run early; tasks it interrupts or
    /// never starts are reported as cancelled failures.
    pub async fn run(&self, tasks: Vec<String>, cancel: &CancellationToken) -> RunReport {
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let tracker = Arc::new(ProgressTracker::new());
        tracker.set_total(tasks.len() as u64);
        self.progress_tx.send_replace(tracker.snapshot());

        let ticker_stop = CancellationToken::new();
        let ticker = progress::spawn_ticker(
            tracker.clone(),
            self.progress_tx.clone(),
            ticker_stop.clone(),
        );

        tracing::info!(
            total = tasks.len(),
            concurrency = self.concurrency,
            max_retries = self.retry.max_retries,
            registry = self.registry.name(),
            "Starting pull run"
        );

        let gate = ConcurrencyGate::new(self.concurrency);
        let executor = Arc::new(RetryExecutor::new(
            self.registry.clone(),
            self.retry.clone(),
        ));
        let (results_tx, collector) = collector::channel(tasks.len());

        let mut workers = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let Some(permit) = gate.admit(cancel).await else {
                tracing::info!(
                    dispatched = index,
                    total = tasks.len(),
                    "Run cancelled, no further pulls admitted"
                );
                break;
            };

            let executor = executor.clone();
            let tracker = tracker.clone();
            let results_tx = results_tx.clone();
            let cancel = cancel.clone();
            let task = task.clone();

            workers.push((
                index,
                tokio::spawn(async move {
                    // Permit is released when this worker ends, however it ends
                    let _permit = permit;

                    let result = executor.execute(&task, &cancel).await;
                    tracker.record_completion(result.succeeded);
                    results_tx.send(index, result);
                }),
            ));
        }
        drop(results_tx);

        let mut lost = HashSet::new();
        for (index, handle) in workers {
            if let Err(e) = handle.await {
                tracing::error!(
                    task_index = index,
                    error = %sanitize(&e.to_string()),
                    "Pull worker stopped unexpectedly"
                );
                lost.insert(index);
            }
        }

        let results = collector.finish(&tasks, &lost, &tracker);

        ticker_stop.cancel();
        if let Err(e) = ticker.await {
            tracing::warn!(error = %e, "Progress ticker stopped unexpectedly");
        }
        self.progress_tx.send_replace(tracker.snapshot());

        let metrics = metrics::reduce(&results, start.elapsed(), gate.limit());
        tracing::info!(
            succeeded = metrics.success_count,
            failed = metrics.failure_count,
            retries = metrics.total_retries,
            elapsed_ms = metrics.total_elapsed.as_millis() as u64,
            cancelled = cancel.is_cancelled(),
            "Pull run finished"
        );

        RunReport {
            started_at,
            metrics,
            results,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry.name())
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .finish()
    }
}
