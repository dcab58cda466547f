//! Docker Engine API client: pull, remove and ping over HTTP.

use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{PullStream, Registry};
use crate::config::{RegistryConfig, normalize_endpoint};
use crate::error::{RegistryError, Result};
use crate::security::split_reference;

/// Longest response body excerpt kept in a status error
pub(super) const MAX_ERROR_BODY: usize = 512;

/// Tag used when an identifier does not name one
pub(super) const DEFAULT_TAG: &str = "latest";

/// [`Registry`] backed by a Docker daemon reachable over HTTP
///
/// Pulls go through `POST /images/create`, whose body is a JSON-lines progress
/// feed. The daemon reports failures that happen mid-pull as an `error` line
/// inside a `200 OK` body, so the returned stream is scanned for those.
#[derive(Clone, Debug)]
pub struct DockerEngineClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DockerEngineClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("parallel-pull/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: normalize_endpoint(&config.endpoint),
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn check_status(
        response: reqwest::Response,
        identifier: &str,
    ) -> std::result::Result<reqwest::Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<DaemonMessage>(&body)
            .ok()
            .and_then(|m| m.message.or(m.error))
            .unwrap_or(body);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(identifier.to_string()));
        }

        Err(RegistryError::Status {
            code: status.as_u16(),
            message: message.chars().take(MAX_ERROR_BODY).collect(),
        })
    }
}

#[async_trait::async_trait]
impl Registry for DockerEngineClient {
    fn name(&self) -> &str {
        "docker"
    }

    async fn pull(
        &self,
        identifier: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<PullStream, RegistryError> {
        let (name, tag) = split_reference(identifier);
        let request = self
            .http
            .post(format!("{}/images/create", self.endpoint))
            .query(&[("fromImage", name), ("tag", tag.unwrap_or(DEFAULT_TAG))]);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RegistryError::Cancelled),
            response = request.send() => response?,
        };
        let response = Self::check_status(response, identifier).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(RegistryError::from));

        Ok(scan_daemon_errors(body))
    }

    async fn remove(&self, identifier: &str) -> std::result::Result<(), RegistryError> {
        let response = self
            .http
            .delete(format!("{}/images/{}", self.endpoint, identifier))
            .query(&[("force", "true"), ("noprune", "false")])
            .send()
            .await?;

        Self::check_status(response, identifier).await?;
        Ok(())
    }

    async fn ping(&self) -> std::result::Result<(), RegistryError> {
        let response = self
            .http
            .get(format!("{}/_ping", self.endpoint))
            .send()
            .await?;

        Self::check_status(response, "_ping").await?;
        Ok(())
    }
}

/// One line of daemon output (or an error body)
#[derive(Debug, Deserialize)]
struct DaemonMessage {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    error_detail: Option<DaemonErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DaemonErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl DaemonMessage {
    fn into_error(self) -> Option<String> {
        self.error_detail.and_then(|d| d.message).or(self.error)
    }
}

/// Splits a chunked body into lines and reports the first daemon error line
#[derive(Debug, Default)]
struct DaemonErrorScanner {
    pending: Vec<u8>,
}

impl DaemonErrorScanner {
    fn feed(&mut self, chunk: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(error) = parse_error_line(&line) {
                return Some(error);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        parse_error_line(&line)
    }
}

fn parse_error_line(line: &[u8]) -> Option<String> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_slice::<DaemonMessage>(trimmed)
        .ok()
        .and_then(DaemonMessage::into_error)
}

/// Wrap a body stream so an in-band daemon error terminates it with an error
fn scan_daemon_errors<S>(body: S) -> PullStream
where
    S: Stream<Item = std::result::Result<Vec<u8>, RegistryError>> + Send + 'static,
{
    let state = (Box::pin(body), DaemonErrorScanner::default(), false);
    stream::unfold(state, |(mut body, mut scanner, done)| async move {
        if done {
            return None;
        }
        match body.next().await {
            Some(Ok(chunk)) => match scanner.feed(&chunk) {
                Some(error) => Some((
                    Err(RegistryError::DaemonError(error)),
                    (body, scanner, true),
                )),
                None => Some((Ok(chunk), (body, scanner, false))),
            },
            Some(Err(e)) => Some((Err(e), (body, scanner, true))),
            None => scanner
                .finish()
                .map(|error| (Err(RegistryError::DaemonError(error)), (body, scanner, true))),
        }
    })
    .boxed()
}
