//! # parallel-pull
//!
//! Pull a batch of container images concurrently, with per-image retries,
//! live progress and aggregate metrics.
//!
//! ## Design
//!
//! - **Bounded** - at most `max_concurrency` pulls run at once
//! - **Resilient** - each image is retried with exponential backoff, and one
//!   image failing never stops the others
//! - **Cancellable** - a single [`CancellationToken`] interrupts admission,
//!   in-flight pulls and backoff sleeps; the report still covers every image
//! - **Pluggable** - the orchestrator only sees the [`Registry`] trait;
//!   [`DockerEngineClient`] is the shipped implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use parallel_pull::{Config, Orchestrator, cancel_on_signal, manifest, registry};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let images = manifest::load(&config.manifest_file)?;
//!
//!     let registry = registry::connect(&config.registry)?;
//!     let orchestrator = Orchestrator::new(registry, &config)?;
//!
//!     let cancel = CancellationToken::new();
//!     cancel_on_signal(cancel.clone());
//!
//!     let report = orchestrator.run(images, &cancel).await;
//!     println!("{} failed", report.metrics.failure_count);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Post-run removal of pulled images
pub mod cleanup;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Image manifest loading
pub mod manifest;
/// Bounded-concurrency retry orchestration
pub mod orchestrator;
/// Progress and summary rendering
pub mod output;
/// Registry clients
pub mod registry;
/// Identifier validation and log redaction
pub mod security;
/// Core result and progress types
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, OutputFormat, RegistryConfig, RetryConfig};
pub use error::{Error, ErrorDetail, ErrorReport, RegistryError, Result};
pub use orchestrator::{Orchestrator, ProgressTracker, RetryExecutor};
pub use registry::{DockerEngineClient, PullStream, Registry};
pub use types::{
    AggregateMetrics, AttemptOutcome, FailureKind, ProgressState, RunReport, TaskResult,
};

pub use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to whichever one
///   can be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The listener exits quietly if the token is cancelled by someone else first.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::warn!("Shutdown requested, cancelling remaining pulls");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
