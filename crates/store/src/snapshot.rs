use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Sentinel previous-hash for the seed snapshot.
pub const GENESIS_HASH: &str = "genesis";

/// The hashed portion of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub sequence: u64,
    pub timestamp: String,
    pub version_tag: String,
    pub parent: Option<u64>,
    pub payload: Map<String, Value>,
}

/// One immutable record of full agent state.
///
/// `entry_hash` covers the previous hash plus the serialized body, so any
/// edit to a committed line breaks the chain on the next verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub entry_hash: String,
    pub prev_hash: String,
    #[serde(flatten)]
    pub body: SnapshotBody,
}

impl StateSnapshot {
    pub fn sequence(&self) -> u64 {
        self.body.sequence
    }

    pub fn version_tag(&self) -> &str {
        &self.body.version_tag
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.body.payload
    }

    pub fn parent(&self) -> Option<u64> {
        self.body.parent
    }
}

/// Hash a snapshot body onto the chain.
pub fn chain_hash(prev_hash: &str, body: &SnapshotBody) -> Result<String, serde_json::Error> {
    let body_json = serde_json::to_string(body)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(&body_json);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(sequence: u64) -> SnapshotBody {
        let mut payload = Map::new();
        payload.insert("identity".to_string(), json!("continuum"));
        SnapshotBody {
            sequence,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            version_tag: "6.3.2".to_string(),
            parent: sequence.checked_sub(1),
            payload,
        }
    }

    #[test]
    fn test_chain_hash_is_deterministic() {
        let b = body(1);
        let h1 = chain_hash(GENESIS_HASH, &b).unwrap();
        let h2 = chain_hash(GENESIS_HASH, &b).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_chain_hash_depends_on_prev() {
        let b = body(1);
        let h1 = chain_hash(GENESIS_HASH, &b).unwrap();
        let h2 = chain_hash("other", &b).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_chain_hash_depends_on_payload() {
        let mut b2 = body(1);
        b2.payload
            .insert("identity".to_string(), json!("something else"));
        let h1 = chain_hash(GENESIS_HASH, &body(1)).unwrap();
        let h2 = chain_hash(GENESIS_HASH, &b2).unwrap();
        assert_ne!(h1, h2);
    }
}
