use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a version tag was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    ReleaseManifest,
    DisplayedLabel,
    PersistedSnapshot,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionSource::ReleaseManifest => "release-manifest",
            VersionSource::DisplayedLabel => "displayed-label",
            VersionSource::PersistedSnapshot => "persisted-snapshot",
        };
        write!(f, "{}", s)
    }
}

/// One externally visible version identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub tag: String,
    pub source: VersionSource,
}

impl VersionRecord {
    pub fn new(source: VersionSource, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            source,
        }
    }
}

/// Detected disagreement between version identifiers that must be equal.
///
/// This is corruption, not drift: it is reported, never repaired in place.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("version desync: snapshot tag '{expected}' disagrees with {}", describe(.mismatched))]
pub struct VersionDesync {
    pub expected: String,
    pub mismatched: Vec<VersionRecord>,
}

fn describe(records: &[VersionRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}='{}'", r.source, r.tag))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates that a snapshot's version tag matches every other version
/// record the environment exposes. A hard precondition for durability.
pub struct VersionGuard;

impl VersionGuard {
    pub fn validate(snapshot_tag: &str, records: &[VersionRecord]) -> Result<(), VersionDesync> {
        let mismatched: Vec<VersionRecord> = records
            .iter()
            .filter(|r| r.tag != snapshot_tag)
            .cloned()
            .collect();

        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(VersionDesync {
                expected: snapshot_tag.to_string(),
                mismatched,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(manifest: &str, label: &str) -> Vec<VersionRecord> {
        vec![
            VersionRecord::new(VersionSource::ReleaseManifest, manifest),
            VersionRecord::new(VersionSource::DisplayedLabel, label),
        ]
    }

    #[test]
    fn test_all_tags_equal() {
        assert!(VersionGuard::validate("6.3.2", &records("6.3.2", "6.3.2")).is_ok());
    }

    #[test]
    fn test_manifest_mismatch_named() {
        let err = VersionGuard::validate("6.3.2", &records("6.3.1", "6.3.2")).unwrap_err();
        assert_eq!(err.mismatched.len(), 1);
        assert_eq!(err.mismatched[0].source, VersionSource::ReleaseManifest);
        let msg = err.to_string();
        assert!(msg.contains("release-manifest"));
        assert!(!msg.contains("displayed-label"));
    }

    #[test]
    fn test_label_mismatch_named() {
        let err = VersionGuard::validate("6.3.2", &records("6.3.2", "6.4.0")).unwrap_err();
        assert_eq!(err.mismatched.len(), 1);
        assert_eq!(err.mismatched[0].source, VersionSource::DisplayedLabel);
    }

    #[test]
    fn test_multiple_mismatches_all_named() {
        let err = VersionGuard::validate("7.0.0", &records("6.3.2", "6.3.2")).unwrap_err();
        assert_eq!(err.mismatched.len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("release-manifest"));
        assert!(msg.contains("displayed-label"));
    }

    #[test]
    fn test_no_records_is_ok() {
        assert!(VersionGuard::validate("6.3.2", &[]).is_ok());
    }
}
