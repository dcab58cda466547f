//! Per-task result collection
//!
//! Workers push `(index, result)` pairs into a channel sized to the task count,
//! so a send never waits. Once every worker has been joined, the collector
//! fills the slots of tasks that never reported.

use super::progress::ProgressTracker;
use crate::types::{FailureKind, TaskResult};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;

/// Reason recorded for tasks the dispatcher never started
pub(crate) const NOT_STARTED_REASON: &str = "run cancelled before the pull started";

/// Reason recorded for tasks whose worker died
pub(crate) const WORKER_LOST_REASON: &str = "pull worker stopped unexpectedly";

/// Producer half handed to each worker
#[derive(Debug, Clone)]
pub(crate) struct ResultSender {
    tx: mpsc::Sender<(usize, TaskResult)>,
}

impl ResultSender {
    pub(crate) fn send(&self, index: usize, result: TaskResult) {
        if let Err(e) = self.tx.try_send((index, result)) {
            tracing::error!(task_index = index, error = %e, "Failed to hand over task result");
        }
    }
}

/// Consumer half owned by the orchestrator
#[derive(Debug)]
pub(crate) struct ResultCollector {
    rx: mpsc::Receiver<(usize, TaskResult)>,
}

/// Create a collector for `task_count` tasks
pub(crate) fn channel(task_count: usize) -> (ResultSender, ResultCollector) {
    let (tx, rx) = mpsc::channel(task_count.max(1));
    (ResultSender { tx }, ResultCollector { rx })
}

impl ResultCollector {
    /// Drain reported results and fill every missing slot
    ///
    /// Must be called after all workers have been joined. Slots of tasks in
    /// `lost` become internal failures, other missing slots become cancelled
    /// failures. Every filled slot is recorded on `tracker`.
    pub(crate) fn finish(
        mut self,
        tasks: &[String],
        lost: &HashSet<usize>,
        tracker: &ProgressTracker,
    ) -> Vec<TaskResult> {
        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];

        while let Ok((index, result)) = self.rx.try_recv() {
            match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(result),
                Some(_) => {
                    tracing::warn!(task_index = index, "Duplicate result ignored");
                }
                None => {
                    tracing::warn!(task_index = index, "Result for unknown task ignored");
                }
            }
        }

        slots
            .into_iter()
            .zip(tasks)
            .enumerate()
            .map(|(index, (slot, task))| {
                slot.unwrap_or_else(|| {
                    tracker.record_completion(false);
                    if lost.contains(&index) {
                        TaskResult::failure(
                            task.as_str(),
                            FailureKind::Internal,
                            1,
                            Duration::ZERO,
                            WORKER_LOST_REASON,
                        )
                    } else {
                        TaskResult::failure(
                            task.as_str(),
                            FailureKind::Cancelled,
                            1,
                            Duration::ZERO,
                            NOT_STARTED_REASON,
                        )
                    }
                })
            })
            .collect()
    }
}
