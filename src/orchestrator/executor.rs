//! Per-task retry loop
//!
//! A task moves through `Pending → Attempting → {Succeeded, RetryScheduled,
//! Exhausted}`, with `RetryScheduled → Attempting` after a backoff sleep.
//! Every suspension point also watches the run's cancellation token.

use super::backoff;
use crate::config::RetryConfig;
use crate::error::RegistryError;
use crate::registry::Registry;
use crate::security::{MAX_FILE_SIZE, sanitize, validate_identifier};
use crate::types::{AttemptOutcome, FailureKind, TaskResult};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason recorded for tasks interrupted by cancellation
pub(crate) const CANCELLED_REASON: &str = "pull cancelled";

/// Drives one task to a terminal [`TaskResult`]
#[derive(Clone)]
pub struct RetryExecutor {
    registry: Arc<dyn Registry>,
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor pulling through `registry`
    pub fn new(registry: Arc<dyn Registry>, config: RetryConfig) -> Self {
        Self { registry, config }
    }

    /// Run `task` until it succeeds, exhausts its attempts or is cancelled
    ///
    /// Never returns an error: every outcome is encoded in the result.
    pub async fn execute(&self, task: &str, cancel: &CancellationToken) -> TaskResult {
        let started = Instant::now();
        let shown = sanitize(task);

        if let Err(e) = validate_identifier(task) {
            let reason = e.sanitized();
            tracing::warn!(identifier = %shown, error = %reason, "Rejected invalid image name");
            return TaskResult::failure(task, FailureKind::Validation, 1, started.elapsed(), reason);
        }

        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(identifier = %shown, attempt, max_attempts, "Pulling image");

            let outcome = self.attempt(task, &shown, cancel).await;
            if outcome.succeeded {
                if attempt > 1 {
                    tracing::info!(identifier = %shown, attempts = attempt, "Pull succeeded after retry");
                } else {
                    tracing::info!(identifier = %shown, bytes = outcome.bytes_transferred, "Pull succeeded");
                }
                return TaskResult::success(
                    task,
                    attempt,
                    started.elapsed(),
                    outcome.bytes_transferred,
                    outcome.content_digest,
                );
            }

            let reason = outcome
                .failure_reason
                .unwrap_or_else(|| "unknown failure".to_string());

            if cancel.is_cancelled() {
                tracing::info!(identifier = %shown, attempt, "Pull cancelled");
                return TaskResult::failure(
                    task,
                    FailureKind::Cancelled,
                    attempt,
                    started.elapsed(),
                    CANCELLED_REASON,
                );
            }

            if attempt > self.config.max_retries {
                tracing::error!(
                    identifier = %shown,
                    error = %reason,
                    attempts = attempt,
                    "Pull failed after all retry attempts exhausted"
                );
                return TaskResult::failure(
                    task,
                    FailureKind::Exhausted,
                    attempt,
                    started.elapsed(),
                    reason,
                );
            }

            let delay = backoff::delay(attempt, self.config.retry_delay);
            tracing::warn!(
                identifier = %shown,
                error = %reason,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Pull failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(identifier = %shown, attempt, "Pull cancelled during backoff");
                    return TaskResult::failure(
                        task,
                        FailureKind::Cancelled,
                        attempt,
                        started.elapsed(),
                        CANCELLED_REASON,
                    );
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One pull under a fresh attempt-scoped token and the attempt deadline
    async fn attempt(
        &self,
        task: &str,
        shown: &str,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let attempt_token = cancel.child_token();
        let timeout = self.config.attempt_timeout;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RegistryError::Cancelled),
            transfer = tokio::time::timeout(timeout, self.transfer(task, shown, attempt_token.clone())) => {
                transfer.unwrap_or(Err(RegistryError::TimedOut(timeout)))
            }
        };
        // Abort whatever the registry still has in flight for this attempt
        attempt_token.cancel();

        match result {
            Ok((bytes_transferred, digest)) => AttemptOutcome {
                succeeded: true,
                bytes_transferred,
                content_digest: Some(digest),
                failure_reason: None,
            },
            Err(e) => AttemptOutcome {
                succeeded: false,
                bytes_transferred: 0,
                content_digest: None,
                failure_reason: Some(sanitize(&e.to_string())),
            },
        }
    }

    /// Open the pull and drain its stream, hashing at most `MAX_FILE_SIZE` bytes
    ///
    /// `shown` is the redacted identifier used in log fields.
    async fn transfer(
        &self,
        task: &str,
        shown: &str,
        cancel: CancellationToken,
    ) -> Result<(u64, String), RegistryError> {
        let mut stream = self.registry.pull(task, cancel).await?;
        let mut hasher = Sha256::new();
        let mut transferred: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let remaining = MAX_FILE_SIZE - transferred;
            let take = usize::try_from(remaining).map_or(chunk.len(), |r| chunk.len().min(r));
            let accepted = &chunk[..take];

            hasher.update(accepted);
            transferred += take as u64;

            if self.config.verbose {
                for line in String::from_utf8_lossy(accepted).lines() {
                    let line = line.trim();
                    if !line.is_empty() {
                        tracing::debug!(identifier = %shown, output = %sanitize(line), "Pull output");
                    }
                }
            }

            if transferred >= MAX_FILE_SIZE {
                tracing::warn!(
                    identifier = %shown,
                    limit = MAX_FILE_SIZE,
                    "Pull output reached size ceiling, truncating"
                );
                break;
            }
        }

        Ok((transferred, format!("{:x}", hasher.finalize())))
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("registry", &self.registry.name())
            .field("config", &self.config)
            .finish()
    }
}
