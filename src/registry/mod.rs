//! Registry client abstraction
//!
//! The orchestrator only sees the [`Registry`] trait: "pull one artifact" is an
//! opaque fallible operation returning a byte stream. Two implementations speak
//! the Docker Engine API: [`DockerEngineClient`] over TCP HTTP and
//! `DockerSocketClient` over the daemon's Unix socket. [`connect`] picks one
//! from the configured endpoint.

mod docker;
#[cfg(unix)]
mod socket;

pub use docker::DockerEngineClient;
#[cfg(unix)]
pub use socket::DockerSocketClient;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the client for `config.endpoint`
///
/// `unix://` endpoints use the daemon socket; `http://`, `https://` and
/// `tcp://` endpoints use HTTP.
pub fn connect(config: &RegistryConfig) -> crate::Result<Arc<dyn Registry>> {
    match config.endpoint.strip_prefix("unix://") {
        #[cfg(unix)]
        Some(socket) => Ok(Arc::new(DockerSocketClient::new(socket)?)),
        #[cfg(not(unix))]
        Some(_) => Err(crate::Error::config(
            "registry.endpoint",
            "unix socket endpoints are only supported on Unix platforms",
        )),
        None => Ok(Arc::new(DockerEngineClient::new(config)?)),
    }
}

/// Body of a pull: chunks of registry output, ending on the first error
pub type PullStream = BoxStream<'static, Result<Vec<u8>, RegistryError>>;

/// Pull/remove/ping capability consumed by the orchestrator
///
/// Implementations must be safe to call repeatedly for the same identifier and
/// must report a missing artifact as [`RegistryError::NotFound`] so callers can
/// tell it apart from real failures.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Start pulling `identifier`
    ///
    /// `cancel` is scoped to a single attempt; it fires when the attempt times
    /// out or the whole run is cancelled. Dropping the returned stream also
    /// aborts the transfer.
    async fn pull(
        &self,
        identifier: &str,
        cancel: CancellationToken,
    ) -> Result<PullStream, RegistryError>;

    /// Remove a previously pulled artifact
    async fn remove(&self, identifier: &str) -> Result<(), RegistryError>;

    /// Check that the registry endpoint answers
    async fn ping(&self) -> Result<(), RegistryError>;
}
