//! Docker Engine API client over the daemon's Unix socket

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::docker::{DEFAULT_TAG, MAX_ERROR_BODY};
use super::{PullStream, Registry};
use crate::config::MAX_TIMEOUT;
use crate::error::{RegistryError, Result};
use crate::security::split_reference;

/// [`Registry`] backed by a local Docker daemon socket (`/var/run/docker.sock`)
///
/// Progress lines are re-encoded as JSON lines so the byte stream looks the
/// same as the HTTP client's. Errors the daemon reports mid-pull end the
/// stream with [`RegistryError::DaemonError`].
#[derive(Clone, Debug)]
pub struct DockerSocketClient {
    docker: Docker,
    socket: String,
}

impl DockerSocketClient {
    /// Create a client for the socket at `socket`
    ///
    /// Request deadlines are left to the caller; the client-level timeout is
    /// set to the longest permitted attempt.
    pub fn new(socket: &str) -> Result<Self> {
        let docker =
            Docker::connect_with_unix(socket, MAX_TIMEOUT.as_secs(), bollard::API_DEFAULT_VERSION)
                .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(Self {
            docker,
            socket: socket.to_string(),
        })
    }

    /// Socket path requests are sent to
    pub fn socket(&self) -> &str {
        &self.socket
    }
}

#[async_trait::async_trait]
impl Registry for DockerSocketClient {
    fn name(&self) -> &str {
        "docker-socket"
    }

    async fn pull(
        &self,
        identifier: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<PullStream, RegistryError> {
        if cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }

        let (name, tag) = split_reference(identifier);
        let options = CreateImageOptions {
            from_image: name.to_string(),
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
            ..Default::default()
        };

        let owned = identifier.to_string();
        let body = self
            .docker
            .create_image(Some(options), None, None)
            .map(move |item| match item {
                Ok(info) => serde_json::to_vec(&info)
                    .map(|mut line| {
                        line.push(b'\n');
                        line
                    })
                    .map_err(|e| RegistryError::Stream(e.to_string())),
                Err(e) => Err(map_error(&owned, e)),
            });

        Ok(end_on_error(body))
    }

    async fn remove(&self, identifier: &str) -> std::result::Result<(), RegistryError> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
        };
        self.docker
            .remove_image(identifier, Some(options), None)
            .await
            .map_err(|e| map_error(identifier, e))?;
        Ok(())
    }

    async fn ping(&self) -> std::result::Result<(), RegistryError> {
        self.docker
            .ping()
            .await
            .map_err(|e| map_error("_ping", e))?;
        Ok(())
    }
}

/// Stop yielding after the first error, matching the HTTP client's stream
fn end_on_error<S>(body: S) -> PullStream
where
    S: futures::Stream<Item = std::result::Result<Vec<u8>, RegistryError>> + Send + 'static,
{
    body.scan(false, |failed, item| {
        let next = if *failed {
            None
        } else {
            *failed = item.is_err();
            Some(item)
        };
        futures::future::ready(next)
    })
    .boxed()
}

fn map_error(identifier: &str, error: BollardError) -> RegistryError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RegistryError::NotFound(identifier.to_string()),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RegistryError::Status {
            code: status_code,
            message: message.chars().take(MAX_ERROR_BODY).collect(),
        },
        BollardError::DockerStreamError { error } => RegistryError::DaemonError(error),
        other => RegistryError::Transport(other.to_string()),
    }
}
