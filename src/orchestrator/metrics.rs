//! Aggregate statistics over a finished run

use crate::types::{AggregateMetrics, TaskResult};
use std::time::Duration;

/// Fold per-task results into run-level metrics
///
/// `total_elapsed` is the wall-clock span of the run, measured by the caller.
/// An empty result set yields zero counts and a zero average.
pub fn reduce(
    results: &[TaskResult],
    total_elapsed: Duration,
    concurrency: usize,
) -> AggregateMetrics {
    let success_count = results.iter().filter(|r| r.succeeded).count();
    let summed: Duration = results.iter().map(|r| r.elapsed).sum();
    let total_retries: u64 = results.iter().map(|r| u64::from(r.retries())).sum();

    let average_elapsed = match u32::try_from(results.len()) {
        Ok(0) => Duration::ZERO,
        Ok(count) => summed / count,
        Err(_) => Duration::from_secs_f64(summed.as_secs_f64() / results.len() as f64),
    };

    AggregateMetrics {
        total_tasks: results.len(),
        success_count,
        failure_count: results.len() - success_count,
        total_elapsed,
        average_elapsed,
        total_retries,
        concurrency_used: concurrency,
    }
}
