//! Identifier validation, log redaction and guarded file access
//!
//! Every string that leaves the crate (log fields, task failure reasons, CLI
//! error output) goes through [`sanitize`] first. Identifiers are checked by
//! [`validate_identifier`] before any registry call is made.

use crate::error::{Error, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Maximum size of files read through [`secure_read_file`] (10 MiB)
///
/// The same ceiling bounds how many bytes of a single pull are consumed.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of images accepted in one manifest
pub const MAX_TASKS: usize = 1000;

/// Maximum identifier length in bytes
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Maximum number of `/`-separated name components
const MAX_NAME_COMPONENTS: usize = 3;

/// Characters that never appear in a legitimate image reference
const SUSPICIOUS_CHARS: &[char] = &[
    '$', '`', ';', '&', '|', '<', '>', '(', ')', '{', '}', '[', ']',
];

struct Patterns {
    name_component: Regex,
    tag: Regex,
    port: Regex,
    path: Regex,
    secret: Regex,
    ip: Regex,
}

// All patterns are literals
#[allow(clippy::expect_used)]
fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        name_component: Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?$")
            .expect("name component pattern"),
        tag: Regex::new(r"^[a-zA-Z0-9._-]+$").expect("tag pattern"),
        port: Regex::new(r"^[0-9]{1,5}$").expect("port pattern"),
        path: Regex::new(r#"(^|[\s"'=(:,])/[a-zA-Z0-9/_.-]+"#).expect("path pattern"),
        secret: Regex::new(r"(?i)(password|token|key|secret)=[a-zA-Z0-9]+")
            .expect("secret pattern"),
        ip: Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("ip pattern"),
    })
}

/// Split an image reference into `(name, tag)`
///
/// The tag is whatever follows the last `:` when that suffix contains no `/`,
/// so `registry:5000/app` has no tag while `registry:5000/app:1.2` has tag `1.2`.
pub fn split_reference(identifier: &str) -> (&str, Option<&str>) {
    match identifier.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (identifier, None),
    }
}

/// Validate an artifact identifier (image reference)
///
/// Rejects empty or oversized names, shell metacharacters, more than three
/// path components, malformed components and malformed tags. A leading
/// registry host may carry a numeric port.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidIdentifier(
            "image name cannot be empty".to_string(),
        ));
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "image name too long: {} characters",
            identifier.len()
        )));
    }

    if identifier.contains(SUSPICIOUS_CHARS) {
        return Err(Error::InvalidIdentifier(format!(
            "image name contains suspicious characters: {}",
            sanitize(identifier)
        )));
    }

    let p = patterns();
    let (name, tag) = split_reference(identifier);

    if let Some(tag) = tag
        && !p.tag.is_match(tag)
    {
        return Err(Error::InvalidIdentifier(format!(
            "invalid image tag: {}",
            sanitize(tag)
        )));
    }

    let components: Vec<&str> = name.split('/').collect();
    if components.len() > MAX_NAME_COMPONENTS {
        return Err(Error::InvalidIdentifier(format!(
            "image name has too many path components: {}",
            sanitize(identifier)
        )));
    }

    for (index, component) in components.iter().enumerate() {
        let host_with_port = index == 0 && components.len() > 1 && component.contains(':');
        let valid = if host_with_port {
            match component.split_once(':') {
                Some((host, port)) => p.name_component.is_match(host) && p.port.is_match(port),
                None => false,
            }
        } else {
            p.name_component.is_match(component)
        };

        if !valid {
            let detail = if component.contains(':') {
                format!("invalid image tag format: {}", sanitize(identifier))
            } else {
                format!("invalid image name component: {}", sanitize(component))
            };
            return Err(Error::InvalidIdentifier(detail));
        }
    }

    Ok(())
}

/// Redact filesystem paths, credentials and IPv4 addresses from a message
pub fn sanitize(message: &str) -> String {
    let p = patterns();
    let redacted = p.path.replace_all(message, "${1}[PATH_REDACTED]");
    let redacted = p.secret.replace_all(&redacted, "${1}=[REDACTED]");
    p.ip.replace_all(&redacted, "[IP_REDACTED]").into_owned()
}

/// Check that a file path stays inside the allowed directories
///
/// Allowed roots are the system temp directory, `/var/tmp` and the current
/// working directory. Any `..` component is rejected outright.
pub fn validate_file_path(path: &Path) -> Result<PathBuf> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "path traversal detected".to_string(),
        });
    }

    let cwd = std::env::current_dir()?;
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let allowed_roots = [std::env::temp_dir(), PathBuf::from("/var/tmp"), cwd];
    if allowed_roots.iter().any(|root| absolute.starts_with(root)) {
        Ok(absolute)
    } else {
        Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "file path not in allowed directories".to_string(),
        })
    }
}

/// Read a small regular file with path and size checks
pub fn secure_read_file(path: &Path) -> Result<Vec<u8>> {
    let path = validate_file_path(path)?;

    let metadata = std::fs::metadata(&path)?;
    if !metadata.is_file() {
        return Err(Error::InvalidPath {
            path,
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge {
            size: metadata.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let data = std::fs::read(&path)?;
    // The file may have grown between stat and read
    if data.len() as u64 > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge {
            size: data.len() as u64,
            max: MAX_FILE_SIZE,
        });
    }

    Ok(data)
}

/// Lowercase hex SHA-256 of a byte slice
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_references() {
        for name in [
            "alpine",
            "alpine:latest",
            "library/alpine:3.19",
            "docker.io/library/alpine:latest",
            "ghcr.io/org/app:v1.2.3",
            "localhost:5000/app",
            "localhost:5000/team/app:dev",
            "a",
        ] {
            assert!(
                validate_identifier(name).is_ok(),
                "{name} should be valid: {:?}",
                validate_identifier(name)
            );
        }
    }

    #[test]
    fn rejects_empty_identifier() {
        assert!(matches!(
            validate_identifier(""),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn rejects_shell_injection() {
        let err = validate_identifier("alpine:latest; rm -rf /").unwrap_err();
        assert!(err.to_string().contains("suspicious characters"));
    }

    #[test]
    fn rejects_overlong_identifier() {
        let name = "\0".repeat(300);
        let err = validate_identifier(&name).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn rejects_too_many_components() {
        assert!(validate_identifier("a/b/c/d").is_err());
    }

    #[test]
    fn rejects_bad_components_and_tags() {
        assert!(validate_identifier("-alpine").is_err());
        assert!(validate_identifier("alpine-").is_err());
        assert!(validate_identifier("alpine:").is_err());
        assert!(validate_identifier("alpine:la test").is_err());
        assert!(validate_identifier("alpine:1:2").is_err());
        assert!(validate_identifier("host:port/app").is_err());
    }

    #[test]
    fn split_reference_respects_registry_port() {
        assert_eq!(split_reference("alpine"), ("alpine", None));
        assert_eq!(split_reference("alpine:3"), ("alpine", Some("3")));
        assert_eq!(
            split_reference("localhost:5000/app"),
            ("localhost:5000/app", None)
        );
        assert_eq!(
            split_reference("localhost:5000/app:dev"),
            ("localhost:5000/app", Some("dev"))
        );
    }

    #[test]
    fn sanitize_redacts_paths() {
        assert_eq!(
            sanitize("failed to read /home/user/secret.txt"),
            "failed to read [PATH_REDACTED]"
        );
    }

    #[test]
    fn sanitize_redacts_ip_addresses() {
        assert_eq!(
            sanitize("connection failed to 192.168.1.1"),
            "connection failed to [IP_REDACTED]"
        );
    }

    #[test]
    fn sanitize_redacts_credentials() {
        assert_eq!(
            sanitize("login with password=hunter2 and TOKEN=abc123"),
            "login with password=[REDACTED] and TOKEN=[REDACTED]"
        );
    }

    #[test]
    fn sanitize_keeps_image_references_readable() {
        assert_eq!(
            sanitize("pulling docker.io/library/alpine:latest"),
            "pulling docker.io/library/alpine:latest"
        );
    }

    #[test]
    fn sanitize_leaves_clean_text_alone() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("all good"), "all good");
    }

    #[test]
    fn file_path_traversal_rejected() {
        let err = validate_file_path(Path::new("../etc/passwd")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn file_path_outside_allowed_roots_rejected() {
        let err = validate_file_path(Path::new("/etc/passwd")).unwrap_err();
        assert!(err.to_string().contains("not in allowed directories"));
    }

    #[test]
    fn secure_read_file_reads_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.json");
        std::fs::write(&path, b"{\"images\": []}").unwrap();

        let data = secure_read_file(&path).unwrap();
        assert_eq!(data, b"{\"images\": []}");
    }

    #[test]
    fn secure_read_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = secure_read_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn secure_read_file_rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_FILE_SIZE + 1).unwrap();

        let err = secure_read_file(&path).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
    }

    #[test]
    fn content_digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
