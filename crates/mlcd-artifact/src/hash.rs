//! Blake3 digests of artifact bytes
//!
//! Every stored artifact carries a [`ContentHash`]; stores keep it next to the
//! bytes and re-check it on read, so a truncated or edited model file is
//! rejected instead of deserialized.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DIGEST_LEN: usize = blake3::OUT_LEN;

/// Blake3 digest of an artifact's bytes
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// Digest of `data`
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Whether `data` hashes to this digest
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        // constant-time comparison from blake3
        blake3::Hash::from(self.0) == blake3::hash(data)
    }

    /// Leading 8 bytes as hex, for logs
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; DIGEST_LEN];
        if s.len() != DIGEST_LEN * 2 {
            return Err(HashError::Length(s.len()));
        }
        hex::decode_to_slice(s, &mut digest)?;
        Ok(Self(digest))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

/// Malformed hex digest
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Wrong number of hex characters
    #[error("digest must be {expected} hex characters, got {0}", expected = DIGEST_LEN * 2)]
    Length(usize),

    #[error("digest is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_only_on_bytes() {
        assert_eq!(
            ContentHash::compute(b"model bytes"),
            ContentHash::compute(b"model bytes")
        );
        assert_ne!(
            ContentHash::compute(b"model bytes"),
            ContentHash::compute(b"model bytez")
        );
    }

    #[test]
    fn matches_detects_tampering() {
        let hash = ContentHash::compute(b"{\"centroids\":[]}");
        assert!(hash.matches(b"{\"centroids\":[]}"));
        assert!(!hash.matches(b"{\"centroids\":[1]}"));
    }

    #[test]
    fn hex_round_trip_and_short_prefix() {
        let hash = ContentHash::compute(b"test");
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.starts_with(&hash.short()));
        assert_eq!(text.parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn rejects_truncated_and_non_hex_digests() {
        let text = ContentHash::compute(b"test").to_string();
        let err = text[..62].parse::<ContentHash>().unwrap_err();
        assert!(matches!(err, HashError::Length(62)));
        assert_eq!(err.to_string(), "digest must be 64 hex characters, got 62");
        assert!(matches!("zz".repeat(32).parse::<ContentHash>(), Err(HashError::Hex(_))));
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash = ContentHash::compute(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        assert!(serde_json::from_str::<ContentHash>("\"abc\"").is_err());
    }
}
