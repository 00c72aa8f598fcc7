use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::guard::{VersionDesync, VersionGuard, VersionRecord};
use crate::snapshot::{chain_hash, SnapshotBody, StateSnapshot, GENESIS_HASH};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History is empty: the store must be seeded before use")]
    EmptyHistory,

    #[error("History already seeded, head is at sequence {0}")]
    AlreadySeeded(u64),

    #[error("Concurrent append: parent {parent} is no longer the head (now {head})")]
    ConcurrencyConflict { parent: u64, head: u64 },

    #[error("No snapshot with sequence {0}")]
    UnknownSequence(u64),

    #[error("Snapshot chain corrupted at line {line}: {reason}")]
    ChainCorrupted { line: usize, reason: String },

    #[error(transparent)]
    Desync(#[from] VersionDesync),
}

struct Inner {
    file: File,
    head: Option<StateSnapshot>,
}

/// Append-only, hash-linked snapshot log. Single writer, strictly linear
/// history.
///
/// The whole read-head / build / validate / persist sequence runs under one
/// mutex, so the chain can never fork. Callers racing on the same parent
/// get `ConcurrencyConflict` and must retry against the refreshed head.
pub struct StateStore {
    log_path: PathBuf,
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Open (or create) a snapshot log. The existing chain is fully
    /// verified before the store is usable; a broken chain is fatal here,
    /// not at first append.
    pub fn open<P: AsRef<Path>>(log_path: P) -> Result<Self, StoreError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let chain = read_chain(&log_path)?;
        let head = chain.into_iter().last();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        if let Some(h) = &head {
            info!(
                sequence = h.sequence(),
                version = h.version_tag(),
                "resumed snapshot chain"
            );
        }

        Ok(Self {
            log_path,
            inner: Mutex::new(Inner { file, head }),
        })
    }

    /// Create the seed snapshot (sequence 0, no parent).
    pub fn seed(
        &self,
        payload: Map<String, Value>,
        version_tag: &str,
        records: &[VersionRecord],
    ) -> Result<StateSnapshot, StoreError> {
        let mut inner = self.inner.lock();

        if let Some(head) = &inner.head {
            return Err(StoreError::AlreadySeeded(head.sequence()));
        }

        VersionGuard::validate(version_tag, records)?;

        let body = SnapshotBody {
            sequence: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version_tag: version_tag.to_string(),
            parent: None,
            payload,
        };

        let snapshot = commit(&mut inner, GENESIS_HASH.to_string(), body)?;
        info!(version = version_tag, "seeded snapshot chain");
        Ok(snapshot)
    }

    /// Append a new snapshot whose parent is the current head.
    ///
    /// `parent_seq` is the head sequence the caller last observed; if the
    /// head has moved, nothing is written and the caller must re-read and
    /// retry. Version validation runs before the write, so a rejected
    /// snapshot leaves both the head and the log untouched.
    pub fn append(
        &self,
        parent_seq: u64,
        payload: Map<String, Value>,
        version_tag: &str,
        records: &[VersionRecord],
    ) -> Result<StateSnapshot, StoreError> {
        let mut inner = self.inner.lock();

        let head = inner.head.clone().ok_or(StoreError::EmptyHistory)?;
        if head.sequence() != parent_seq {
            return Err(StoreError::ConcurrencyConflict {
                parent: parent_seq,
                head: head.sequence(),
            });
        }

        VersionGuard::validate(version_tag, records)?;

        let body = SnapshotBody {
            sequence: head.sequence() + 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version_tag: version_tag.to_string(),
            parent: Some(head.sequence()),
            payload,
        };

        let snapshot = commit(&mut inner, head.entry_hash.clone(), body)?;
        debug!(
            sequence = snapshot.sequence(),
            version = version_tag,
            "committed snapshot"
        );
        Ok(snapshot)
    }

    /// Most recent committed snapshot.
    pub fn head(&self) -> Result<StateSnapshot, StoreError> {
        self.inner
            .lock()
            .head
            .clone()
            .ok_or(StoreError::EmptyHistory)
    }

    /// Read-only time travel: the snapshot exactly as it was appended.
    pub fn restore(&self, sequence: u64) -> Result<StateSnapshot, StoreError> {
        let _inner = self.inner.lock();
        let chain = read_chain(&self.log_path)?;
        chain
            .into_iter()
            .find(|s| s.sequence() == sequence)
            .ok_or(StoreError::UnknownSequence(sequence))
    }

    /// Re-verify the persisted chain end to end.
    pub fn verify_chain(&self) -> Result<(), StoreError> {
        let _inner = self.inner.lock();
        read_chain(&self.log_path)?;
        Ok(())
    }
}

/// Persist one snapshot line. Called with the store lock held.
fn commit(
    inner: &mut Inner,
    prev_hash: String,
    body: SnapshotBody,
) -> Result<StateSnapshot, StoreError> {
    let entry_hash = chain_hash(&prev_hash, &body)?;
    let snapshot = StateSnapshot {
        entry_hash,
        prev_hash,
        body,
    };

    let json = serde_json::to_string(&snapshot)?;
    writeln!(inner.file, "{}", json)?;
    inner.file.sync_all()?;

    inner.head = Some(snapshot.clone());
    Ok(snapshot)
}

/// Load and verify the full chain: hash linkage, recomputed entry hashes,
/// sequence monotonicity, parent pointers.
fn read_chain(log_path: &Path) -> Result<Vec<StateSnapshot>, StoreError> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(log_path)?;
    let reader = BufReader::new(file);

    let mut chain: Vec<StateSnapshot> = Vec::new();
    let mut prev_hash = GENESIS_HASH.to_string();
    let mut line_num = 0;

    for line in reader.lines() {
        line_num += 1;
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        let snapshot: StateSnapshot =
            serde_json::from_str(&line).map_err(|e| StoreError::ChainCorrupted {
                line: line_num,
                reason: format!("invalid JSON: {}", e),
            })?;

        if snapshot.prev_hash != prev_hash {
            return Err(StoreError::ChainCorrupted {
                line: line_num,
                reason: format!(
                    "hash chain broken: expected prev_hash '{}', got '{}'",
                    prev_hash, snapshot.prev_hash
                ),
            });
        }

        let computed = chain_hash(&prev_hash, &snapshot.body)?;
        if computed != snapshot.entry_hash {
            return Err(StoreError::ChainCorrupted {
                line: line_num,
                reason: format!(
                    "hash mismatch: expected '{}', got '{}'",
                    computed, snapshot.entry_hash
                ),
            });
        }

        let expected_seq = chain.len() as u64;
        if snapshot.sequence() != expected_seq {
            return Err(StoreError::ChainCorrupted {
                line: line_num,
                reason: format!(
                    "sequence not monotonic: expected {}, got {}",
                    expected_seq,
                    snapshot.sequence()
                ),
            });
        }

        let expected_parent = expected_seq.checked_sub(1);
        if snapshot.parent() != expected_parent {
            return Err(StoreError::ChainCorrupted {
                line: line_num,
                reason: format!(
                    "parent pointer wrong: expected {:?}, got {:?}",
                    expected_parent,
                    snapshot.parent()
                ),
            });
        }

        prev_hash = snapshot.entry_hash.clone();
        chain.push(snapshot);
    }

    Ok(chain)
}
