//! Configuration types for parallel-pull

use crate::error::{Error, Result};
use crate::security::secure_read_file;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard ceiling on concurrent pulls
pub const MAX_CONCURRENCY: usize = 20;

/// Longest permitted per-attempt timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Shortest permitted per-attempt timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling on retries per artifact
pub const MAX_RETRIES: u32 = 10;

/// Endpoint schemes a registry client exists for (after `tcp://` rewriting)
const ENDPOINT_SCHEMES: [&str; 3] = ["http", "https", "unix"];

/// Output format for logs and the final summary
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "output format must be 'text' or 'json', got: {other}"
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Registry client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Docker Engine API endpoint (default: "unix:///var/run/docker.sock")
    ///
    /// `unix://` selects the daemon socket. `tcp://` URLs as used in
    /// `DOCKER_HOST` are accepted and treated as `http://`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

/// Main configuration for a pull run
///
/// Loaded from a YAML file (JSON is accepted too); unknown fields are
/// rejected. Every field has a default, so an empty mapping `{}` is a valid
/// configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Image manifest file (default: "containers.yaml")
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,

    /// Remove pulled images once the run finishes (default: true)
    #[serde(default = "default_true")]
    pub cleanup_after_run: bool,

    /// Log registry pull output for every image (default: false)
    #[serde(default)]
    pub verbose: bool,

    /// Maximum concurrent pulls (default: 5, max: 20)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-attempt timeout in seconds (default: 300, range: 30..=1800)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Retries after the first failed attempt (default: 3, max: 10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in seconds (default: 2)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Render a live progress bar in text mode (default: true)
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Output format (default: text)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Registry client settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
            cleanup_after_run: true,
            verbose: false,
            max_concurrency: default_max_concurrency(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            show_progress: true,
            output_format: OutputFormat::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// The file goes through the guarded reader (path policy, size ceiling).
    /// The result is not validated; call [`Config::validate`] before use.
    pub fn load(path: &Path) -> Result<Self> {
        let data = secure_read_file(path)?;
        serde_yaml::from_slice(&data).map_err(|e| Error::Config {
            message: format!("failed to parse config file: {e}"),
            key: None,
        })
    }

    /// Check that every parameter is inside its permitted range
    pub fn validate(&self) -> Result<()> {
        if self.manifest_file.as_os_str().is_empty() {
            return Err(Error::config(
                "manifest_file",
                "manifest file path cannot be empty",
            ));
        }

        if self.max_concurrency == 0 {
            return Err(Error::config(
                "max_concurrency",
                format!(
                    "max concurrency must be greater than 0, got: {}",
                    self.max_concurrency
                ),
            ));
        }

        if self.max_concurrency > MAX_CONCURRENCY {
            return Err(Error::config(
                "max_concurrency",
                format!(
                    "max concurrency too high (>{}), got: {}",
                    MAX_CONCURRENCY, self.max_concurrency
                ),
            ));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(Error::config(
                "timeout",
                format!(
                    "timeout too high (>{:?}), got: {:?}",
                    MAX_TIMEOUT, self.timeout
                ),
            ));
        }

        if self.timeout < MIN_TIMEOUT {
            return Err(Error::config(
                "timeout",
                format!(
                    "timeout too short, minimum {:?}, got: {:?}",
                    MIN_TIMEOUT, self.timeout
                ),
            ));
        }

        if self.max_retries > MAX_RETRIES {
            return Err(Error::config(
                "max_retries",
                format!(
                    "max retries too high (>{}), got: {}",
                    MAX_RETRIES, self.max_retries
                ),
            ));
        }

        match url::Url::parse(&normalize_endpoint(&self.registry.endpoint)) {
            Ok(url) if ENDPOINT_SCHEMES.contains(&url.scheme()) => {}
            Ok(url) => {
                return Err(Error::config(
                    "registry.endpoint",
                    format!(
                        "unsupported registry endpoint scheme '{}', expected one of: {}",
                        url.scheme(),
                        ENDPOINT_SCHEMES.join(", ")
                    ),
                ));
            }
            Err(_) => {
                return Err(Error::config(
                    "registry.endpoint",
                    format!("invalid registry endpoint: {}", self.registry.endpoint),
                ));
            }
        }

        Ok(())
    }

    /// Per-task retry settings derived from this configuration
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            attempt_timeout: self.timeout,
            retry_delay: self.retry_delay,
            verbose: self.verbose,
        }
    }
}

/// Retry configuration applied to every task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first failed attempt (total attempts = max_retries + 1)
    pub max_retries: u32,

    /// Deadline for a single attempt, covering the request and the body stream
    pub attempt_timeout: Duration,

    /// Base delay for exponential backoff
    pub retry_delay: Duration,

    /// Log registry pull output line by line
    pub verbose: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempt_timeout: default_timeout(),
            retry_delay: default_retry_delay(),
            verbose: false,
        }
    }
}

/// Rewrite `tcp://` endpoints (as found in `DOCKER_HOST`) to `http://`
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    match trimmed.strip_prefix("tcp://") {
        Some(rest) => format!("http://{rest}"),
        None => trimmed.to_string(),
    }
}

// Default value functions
fn default_manifest_file() -> PathBuf {
    PathBuf::from("containers.yaml")
}

#[cfg(unix)]
fn default_endpoint() -> String {
    "unix:///var/run/docker.sock".to_string()
}

#[cfg(not(unix))]
fn default_endpoint() -> String {
    "http://localhost:2375".to_string()
}

fn default_max_concurrency() -> usize {
    5
}

fn default_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
