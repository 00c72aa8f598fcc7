use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::guard::{VersionRecord, VersionSource};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest unreadable at {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Reads the single current version tag from the release manifest.
///
/// The manifest is one tag on one line; the read is a single atomic
/// `read_to_string`, so a concurrent writer can never hand us half a value.
pub struct ManifestReader {
    path: PathBuf,
}

impl ManifestReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn current_tag(&self) -> Result<String, ManifestError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| ManifestError::Unreadable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tag = raw.trim();
        if tag.is_empty() {
            return Err(ManifestError::Unreadable {
                path: self.path.clone(),
                reason: "manifest is empty".to_string(),
            });
        }

        Ok(tag.to_string())
    }

    pub fn record(&self) -> Result<VersionRecord, ManifestError> {
        Ok(VersionRecord::new(
            VersionSource::ReleaseManifest,
            self.current_tag()?,
        ))
    }
}
