//! Portable learner snapshots.
//!
//! ```json
//! { "type": "qlearning", "parameters": { ... }, "episodesTrained": 120, "checksum": "9f2c…" }
//! ```
//!
//! `checksum` is the SHA-256 of the compact JSON of `parameters`. A snapshot
//! that fails any check is refused; there is no silent fallback to an empty
//! learner.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Snapshot import/export failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("unknown learner type '{0}'")]
    UnknownType(String),

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("non-finite parameter at {location}")]
    NonFinite { location: String },
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Value,
    #[serde(rename = "episodesTrained")]
    pub episodes_trained: u64,
    pub checksum: String,
}

/// SHA-256 of the compact JSON form of `parameters`, lower-case hex.
pub fn parameters_checksum(parameters: &Value) -> Result<String, SnapshotError> {
    let canonical = serde_json::to_string(parameters)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

impl PolicySnapshot {
    pub fn new(kind: &str, parameters: Value, episodes_trained: u64) -> Result<Self, SnapshotError> {
        let checksum = parameters_checksum(&parameters)?;
        Ok(Self {
            kind: kind.to_string(),
            parameters,
            episodes_trained,
            checksum,
        })
    }

    /// Parse and verify the checksum. Learner-specific checks happen in
    /// [`crate::ActionSelector::from_snapshot`].
    pub fn from_json(blob: &str) -> Result<Self, SnapshotError> {
        let snapshot: PolicySnapshot = serde_json::from_str(blob)?;
        snapshot.verify()?;
        Ok(snapshot)
    }

    pub fn verify(&self) -> Result<(), SnapshotError> {
        let computed = parameters_checksum(&self.parameters)?;
        if computed != self.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                expected: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
