//! Error types for parallel-pull
//!
//! This module provides error handling for the library, including:
//! - The top-level [`Error`] used by configuration, manifest and CLI code
//! - [`RegistryError`] returned by registry clients for a single operation
//! - Structured error reports with machine-readable error codes
//!
//! Per-task failures inside a run are never surfaced as `Error`; they are
//! recorded on the task's [`TaskResult`](crate::types::TaskResult) instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::security::sanitize;

/// Result type alias for parallel-pull operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for parallel-pull
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrency")
        key: Option<String>,
    },

    /// Artifact identifier failed validation
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Image manifest could not be used (empty, too large, malformed)
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Registry operation failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// File path rejected by the path policy
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The rejected path
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },

    /// File exceeds the size ceiling
    #[error("file too large: {size} bytes (max: {max})")]
    FileTooLarge {
        /// Actual size in bytes
        size: u64,
        /// Maximum permitted size in bytes
        max: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidIdentifier(_) => "invalid_identifier",
            Error::Manifest(_) => "invalid_manifest",
            Error::Registry(e) => e.error_code(),
            Error::InvalidPath { .. } => "invalid_path",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Error message with paths, credentials and addresses redacted
    pub fn sanitized(&self) -> String {
        sanitize(&self.to_string())
    }
}

/// Errors returned by a [`Registry`](crate::registry::Registry) operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The artifact does not exist in the registry or locally
    #[error("no such image: {0}")]
    NotFound(String),

    /// The registry answered with a non-success status
    #[error("registry returned status {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The daemon reported an error inside the pull progress stream
    #[error("pull failed: {0}")]
    DaemonError(String),

    /// Connection or request failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure while reading the response body
    #[error("stream error: {0}")]
    Stream(String),

    /// The attempt deadline elapsed
    #[error("attempt timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Returns true when the error means the artifact is absent
    ///
    /// Cleanup treats this as success; every other variant is a real failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            RegistryError::NotFound(_) => true,
            RegistryError::Status { code, .. } => *code == 404,
            _ => false,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Status { .. } => "registry_status",
            RegistryError::DaemonError(_) => "daemon_error",
            RegistryError::Transport(_) => "transport_error",
            RegistryError::Stream(_) => "stream_error",
            RegistryError::TimedOut(_) => "timed_out",
            RegistryError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_body() || e.is_decode() {
            RegistryError::Stream(e.to_string())
        } else {
            RegistryError::Transport(e.to_string())
        }
    }
}

/// Structured error report printed by the CLI in JSON mode
///
/// ```json
/// {
///   "error": {
///     "code": "config_error",
///     "message": "configuration error: max concurrency too high (>20), got: 50",
///     "details": { "key": "max_concurrency" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for error reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "config_error", "invalid_manifest")
    pub code: String,

    /// Sanitized human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorReport {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::FileTooLarge { size, max } => {
                Some(serde_json::json!({ "size": size, "max": max }))
            }
            Error::Registry(RegistryError::Status { code, .. }) => {
                Some(serde_json::json!({ "status": code }))
            }
            _ => None,
        };

        Self {
            error: ErrorDetail {
                code: error.error_code().to_string(),
                message: error.sanitized(),
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_cover_top_level_variants() {
        let cases: Vec<(Error, &str)> = vec![
            (Error::config("timeout", "too short"), "config_error"),
            (
                Error::InvalidIdentifier("bad;name".into()),
                "invalid_identifier",
            ),
            (Error::Manifest("empty".into()), "invalid_manifest"),
            (
                Error::Registry(RegistryError::NotFound("alpine".into())),
                "not_found",
            ),
            (
                Error::InvalidPath {
                    path: PathBuf::from("../etc"),
                    reason: "traversal".into(),
                },
                "invalid_path",
            ),
            (Error::FileTooLarge { size: 20, max: 10 }, "file_too_large"),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (Error::Other("boom".into()), "internal_error"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "wrong code for {error:?}");
        }
    }

    #[test]
    fn not_found_detection() {
        assert!(RegistryError::NotFound("alpine".into()).is_not_found());
        assert!(
            RegistryError::Status {
                code: 404,
                message: "missing".into()
            }
            .is_not_found()
        );
        assert!(
            !RegistryError::Status {
                code: 500,
                message: "boom".into()
            }
            .is_not_found()
        );
        assert!(!RegistryError::Transport("refused".into()).is_not_found());
        assert!(!RegistryError::Cancelled.is_not_found());
    }

    #[test]
    fn sanitized_message_redacts_paths_and_addresses() {
        let err = Error::Other("cannot reach 10.0.0.12 reading /home/user/pull.json".into());
        let msg = err.sanitized();
        assert!(!msg.contains("10.0.0.12"), "IP leaked: {msg}");
        assert!(!msg.contains("/home/user"), "path leaked: {msg}");
        assert!(msg.contains("[IP_REDACTED]"));
        assert!(msg.contains("[PATH_REDACTED]"));
    }

    #[test]
    fn error_report_carries_config_key() {
        let err = Error::config("max_concurrency", "max concurrency too high (>20), got: 50");
        let report = ErrorReport::from(&err);

        assert_eq!(report.error.code, "config_error");
        assert!(report.error.message.contains("too high"));
        assert_eq!(
            report.error.details,
            Some(serde_json::json!({ "key": "max_concurrency" }))
        );
    }

    #[test]
    fn error_report_omits_empty_details() {
        let report = ErrorReport::from(&Error::Manifest("no images found".into()));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["error"].get("details").is_none());
    }
}
