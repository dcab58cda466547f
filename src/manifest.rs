//! Image manifest loading
//!
//! A manifest is a YAML file with a single `images` list:
//!
//! ```yaml
//! images:
//!   - alpine:latest
//!   - nginx:1.25
//! ```
//!
//! The JSON form `{"images": [...]}` parses as well.
//! Individual references are not validated here; an invalid one becomes a
//! validation failure for that task only, without stopping the run.

use crate::error::{Error, Result};
use crate::security::{MAX_TASKS, secure_read_file};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    images: Vec<String>,
}

/// Load, check and deduplicate the image list from `path`
pub fn load(path: &Path) -> Result<Vec<String>> {
    let data = secure_read_file(path)?;
    parse(&data)
}

/// Parse a manifest, keeping the first occurrence of each reference
pub fn parse(data: &[u8]) -> Result<Vec<String>> {
    let manifest: ManifestFile = serde_yaml::from_slice(data)
        .map_err(|e| Error::Manifest(format!("failed to parse manifest: {e}")))?;

    if manifest.images.is_empty() {
        return Err(Error::Manifest("no images found in manifest".to_string()));
    }

    if manifest.images.len() > MAX_TASKS {
        return Err(Error::Manifest(format!(
            "too many images in manifest: {} (max: {})",
            manifest.images.len(),
            MAX_TASKS
        )));
    }

    Ok(dedupe(manifest.images))
}

/// Drop repeated references, preserving first-seen order
pub fn dedupe(images: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(images.len());
    images
        .into_iter()
        .filter(|image| seen.insert(image.clone()))
        .collect()
}
