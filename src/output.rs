//! Human and JSON rendering of progress and run results
//!
//! Everything here is a pure function returning a string; the binary decides
//! where it goes.

use crate::error::Result;
use crate::security::sanitize;
use crate::types::{AggregateMetrics, ProgressState, RunReport, TaskResult};
use std::fmt::Write as _;
use std::time::Duration;

/// Width of the progress bar in cells
const BAR_WIDTH: u64 = 40;

/// One-line progress bar, e.g. `[████░░…] 50.0% (2/4) ✅ 1 ❌ 1`
pub fn render_progress_bar(state: &ProgressState) -> String {
    let filled = if state.total == 0 {
        BAR_WIDTH
    } else {
        (BAR_WIDTH * state.completed.min(state.total)) / state.total
    };
    let empty = BAR_WIDTH - filled;

    format!(
        "[{}{}] {:.1}% ({}/{}) ✅ {} ❌ {}",
        "█".repeat(filled as usize),
        "░".repeat(empty as usize),
        state.percent(),
        state.completed,
        state.total,
        state.succeeded(),
        state.failed,
    )
}

/// Multi-line text summary of a run
pub fn render_summary_text(metrics: &AggregateMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📊 Pull Summary:");
    let _ = writeln!(out, "   ✅ Successful: {}", metrics.success_count);
    let _ = writeln!(out, "   ❌ Failed: {}", metrics.failure_count);
    let _ = writeln!(out, "   🔄 Total retries: {}", metrics.total_retries);
    let _ = writeln!(
        out,
        "   ⏱️  Total time: {}",
        format_duration(metrics.total_elapsed)
    );
    let _ = writeln!(
        out,
        "   📈 Average time per image: {}",
        format_duration(metrics.average_elapsed)
    );
    let _ = writeln!(out, "   🚀 Concurrency: {}", metrics.concurrency_used);
    out
}

/// One line per failed task with its failure kind and reason
pub fn render_failures_text(results: &[TaskResult]) -> String {
    let mut out = String::new();
    for result in results.iter().filter(|r| !r.succeeded) {
        let kind = result
            .failure_kind
            .map(|k| k.as_str())
            .unwrap_or("unknown");
        let reason = result.failure_reason.as_deref().unwrap_or("");
        let _ = writeln!(
            out,
            "   ❌ {} [{}, {} attempt(s)]: {}",
            sanitize(&result.task),
            kind,
            result.attempts_used,
            reason
        );
    }
    out
}

/// Pretty-printed JSON of the full report
pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Round to whole seconds and print as `1h2m3s`, `4m5s` or `6s`
pub fn format_duration(duration: Duration) -> String {
    let rounded = duration.saturating_add(Duration::from_millis(500)).as_secs();
    let (hours, minutes, seconds) = (rounded / 3600, (rounded % 3600) / 60, rounded % 60);

    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m{seconds}s"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}
