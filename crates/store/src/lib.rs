//! Durable agent state: the snapshot chain, version guard, and release
//! manifest.
//!
//! The snapshot chain is the agent's identity across restarts: an
//! append-only, hash-linked JSONL log with a single writer and strictly
//! linear history. Nothing is committed until the version guard agrees that
//! every externally visible version record carries the same tag.

pub mod guard;
pub mod manifest;
pub mod snapshot;
pub mod store;

pub use guard::{VersionDesync, VersionGuard, VersionRecord, VersionSource};
pub use manifest::{ManifestError, ManifestReader};
pub use snapshot::{SnapshotBody, StateSnapshot};
pub use store::{StateStore, StoreError};
