//! Fingerprint newtypes and the composite cache key.
//!
//! Fingerprints are BLAKE3 hashes serialized as 64-char lowercase hex so
//! they compare and log identically across processes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of an ordered bar series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetFingerprint(pub String);

impl DatasetFingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content hash of a canonicalized parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamFingerprint(pub String);

impl ParamFingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of derived result a cache entry holds.
///
/// The cache never inspects payloads; the kind keeps entries for different
/// artifact families from colliding on the same fingerprint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Backtest,
    Recommendation,
    Ranking,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backtest => "backtest",
            Self::Recommendation => "recommendation",
            Self::Ranking => "ranking",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key: (dataset fingerprint, parameter fingerprint, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub dataset: DatasetFingerprint,
    pub params: ParamFingerprint,
    pub kind: ArtifactKind,
}

impl CacheKey {
    pub fn new(dataset: DatasetFingerprint, params: ParamFingerprint, kind: ArtifactKind) -> Self {
        Self {
            dataset,
            params,
            kind,
        }
    }

    /// Deterministic combined hash, used as the entry file name and the
    /// single-flight lock key.
    pub fn combined_hash(&self) -> String {
        // Canonical serialization (fixed key order)
        let canonical = serde_json::json!({
            "dataset": self.dataset.as_hex(),
            "kind": self.kind.as_str(),
            "params": self.params.as_hex(),
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.dataset, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: ArtifactKind) -> CacheKey {
        CacheKey::new(
            DatasetFingerprint::from_bytes(b"dataset"),
            ParamFingerprint::from_bytes(b"params"),
            kind,
        )
    }

    #[test]
    fn fingerprints_are_hex_64() {
        let fp = DatasetFingerprint::from_bytes(b"abc");
        assert_eq!(fp.as_hex().len(), 64);
        assert!(fp.as_hex().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn combined_hash_is_deterministic() {
        assert_eq!(
            key(ArtifactKind::Backtest).combined_hash(),
            key(ArtifactKind::Backtest).combined_hash()
        );
    }

    #[test]
    fn combined_hash_differs_by_kind() {
        assert_ne!(
            key(ArtifactKind::Backtest).combined_hash(),
            key(ArtifactKind::Ranking).combined_hash()
        );
    }

    #[test]
    fn combined_hash_differs_by_fingerprint() {
        let a = key(ArtifactKind::Backtest);
        let mut b = a.clone();
        b.dataset = DatasetFingerprint::from_bytes(b"other dataset");
        assert_ne!(a.combined_hash(), b.combined_hash());
    }

    #[test]
    fn artifact_kind_serialization() {
        let json = serde_json::to_string(&ArtifactKind::Ranking).unwrap();
        assert_eq!(json, "\"ranking\"");
    }
}
