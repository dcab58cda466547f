//! Core types for parallel-pull

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a task ended without success
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The identifier failed pre-flight validation (never retried)
    Validation,
    /// Every permitted attempt failed
    Exhausted,
    /// The run was cancelled before the task reached a terminal state
    Cancelled,
    /// The task's worker stopped unexpectedly
    Internal,
}

impl FailureKind {
    /// Short lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Exhausted => "exhausted",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single attempt, consumed immediately by the retry loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Whether the attempt transferred the artifact
    pub succeeded: bool,
    /// Bytes read from the registry during this attempt
    pub bytes_transferred: u64,
    /// SHA-256 of the transferred bytes (successful attempts only)
    pub content_digest: Option<String>,
    /// Sanitized failure reason (failed attempts only)
    pub failure_reason: Option<String>,
}

/// Terminal result of one task, created exactly once
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Artifact identifier
    #[serde(rename = "image")]
    pub task: String,
    /// Whether the artifact was pulled
    #[serde(rename = "success")]
    pub succeeded: bool,
    /// Attempts made, always in `1..=max_retries + 1`
    #[serde(rename = "attempts")]
    pub attempts_used: u32,
    /// Time from task start to its terminal state
    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub elapsed: Duration,
    /// Bytes transferred by the successful attempt
    #[serde(rename = "size", default, skip_serializing_if = "is_zero")]
    pub bytes_transferred: u64,
    /// SHA-256 of the transferred bytes
    #[serde(
        rename = "image_hash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_digest: Option<String>,
    /// Failure category, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Sanitized failure reason, absent on success
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TaskResult {
    /// Successful terminal result
    pub fn success(
        task: impl Into<String>,
        attempts_used: u32,
        elapsed: Duration,
        bytes_transferred: u64,
        content_digest: Option<String>,
    ) -> Self {
        Self {
            task: task.into(),
            succeeded: true,
            attempts_used,
            elapsed,
            bytes_transferred,
            content_digest,
            failure_kind: None,
            failure_reason: None,
        }
    }

    /// Failed terminal result; `reason` must already be sanitized
    pub fn failure(
        task: impl Into<String>,
        kind: FailureKind,
        attempts_used: u32,
        elapsed: Duration,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            succeeded: false,
            attempts_used: attempts_used.max(1),
            elapsed,
            bytes_transferred: 0,
            content_digest: None,
            failure_kind: Some(kind),
            failure_reason: Some(reason.into()),
        }
    }

    /// Retries consumed beyond the first attempt
    pub fn retries(&self) -> u32 {
        self.attempts_used.saturating_sub(1)
    }
}

/// Point-in-time view of the shared progress counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Tasks that reached a terminal state
    pub completed: u64,
    /// Terminal tasks that failed
    pub failed: u64,
    /// Tasks in the run
    pub total: u64,
}

impl ProgressState {
    /// Terminal tasks that succeeded
    pub fn succeeded(&self) -> u64 {
        self.completed.saturating_sub(self.failed)
    }

    /// Completion percentage (0.0 to 100.0), 100 for an empty run
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    /// Whether every task has reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Aggregate statistics for a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Tasks in the run
    #[serde(rename = "total_images")]
    pub total_tasks: usize,
    /// Tasks that succeeded
    pub success_count: usize,
    /// Tasks that failed for any reason
    pub failure_count: usize,
    /// Wall-clock span of the whole run
    #[serde(rename = "total_duration_ms", with = "duration_millis")]
    pub total_elapsed: Duration,
    /// Mean per-task elapsed time
    #[serde(rename = "average_duration_ms", with = "duration_millis")]
    pub average_elapsed: Duration,
    /// Sum of retries across all tasks
    pub total_retries: u64,
    /// Configured concurrency limit
    #[serde(rename = "concurrency")]
    pub concurrency_used: usize,
}

/// Everything a run produces
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Aggregate statistics
    pub metrics: AggregateMetrics,
    /// One result per task, in input order
    pub results: Vec<TaskResult>,
}

impl RunReport {
    /// Whether any task failed
    pub fn has_failures(&self) -> bool {
        self.metrics.failure_count > 0
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

// Duration serialization helper (whole milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
