//! Model artifacts and artifact URIs
//!
//! A [`ModelArtifact`] is the opaque serialized predictor produced by one run.
//! It is immutable once written; the content hash is fixed at construction.

use crate::hash::ContentHash;
use crate::id::{RunId, RunIdError};
use crate::path::{ArtifactPath, PathError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// URI scheme used for artifact references handed between pipeline steps
pub const ARTIFACT_URI_SCHEME: &str = "mlcd-artifacts:/";

/// Serialized model bytes bound to the run that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    run_id: RunId,
    path: ArtifactPath,
    bytes: Vec<u8>,
    hash: ContentHash,
}

impl ModelArtifact {
    /// Create artifact, computing its content hash
    #[must_use]
    pub fn new(run_id: RunId, path: ArtifactPath, bytes: Vec<u8>) -> Self {
        let hash = ContentHash::compute(&bytes);
        Self {
            run_id,
            path,
            bytes,
            hash,
        }
    }

    /// Rebuild an artifact read back from storage, checking the recorded hash
    ///
    /// # Errors
    /// Returns [`ArtifactError::Corrupted`] if the bytes do not match `expected`
    pub fn from_stored(
        run_id: RunId,
        path: ArtifactPath,
        bytes: Vec<u8>,
        expected: ContentHash,
    ) -> Result<Self, ArtifactError> {
        let artifact = Self::new(run_id, path, bytes);
        if artifact.hash != expected {
            return Err(ArtifactError::Corrupted {
                run_id,
                path: artifact.path,
                expected,
                actual: artifact.hash,
            });
        }
        Ok(artifact)
    }

    /// Run that produced this artifact
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Path inside the run
    #[inline]
    #[must_use]
    pub fn path(&self) -> &ArtifactPath {
        &self.path
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into raw bytes
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Content hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// URI addressing this artifact
    #[must_use]
    pub fn uri(&self) -> ArtifactUri {
        ArtifactUri::new(self.run_id, self.path.clone())
    }
}

/// `mlcd-artifacts:/<run_id>/<path>` reference to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactUri {
    /// Producing run
    pub run_id: RunId,
    /// Path inside the run
    pub path: ArtifactPath,
}

impl ArtifactUri {
    /// Create URI
    #[inline]
    #[must_use]
    pub fn new(run_id: RunId, path: ArtifactPath) -> Self {
        Self { run_id, path }
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ARTIFACT_URI_SCHEME}{}/{}", self.run_id, self.path)
    }
}

impl FromStr for ArtifactUri {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(ARTIFACT_URI_SCHEME)
            .ok_or_else(|| ArtifactError::UnsupportedUri(s.to_string()))?;
        let (run, path) = rest
            .split_once('/')
            .ok_or_else(|| ArtifactError::UnsupportedUri(s.to_string()))?;
        Ok(Self {
            run_id: run.parse()?,
            path: path.parse()?,
        })
    }
}

impl TryFrom<String> for ArtifactUri {
    type Error = ArtifactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactUri> for String {
    fn from(value: ArtifactUri) -> Self {
        value.to_string()
    }
}

/// Artifact store errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// No artifact at this path for the run
    #[error("artifact not found: run {run_id}, path {path}")]
    NotFound { run_id: RunId, path: ArtifactPath },

    /// Write-once violation
    #[error("artifact already exists: run {run_id}, path {path}")]
    AlreadyExists { run_id: RunId, path: ArtifactPath },

    /// Stored bytes do not match their recorded hash
    #[error("artifact corrupted: run {run_id}, path {path} (expected {expected}, got {actual})")]
    Corrupted {
        run_id: RunId,
        path: ArtifactPath,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// URI with an unknown scheme or shape
    #[error("unsupported artifact uri: {0}")]
    UnsupportedUri(String),

    /// Invalid run identifier
    #[error(transparent)]
    RunId(#[from] RunIdError),

    /// Invalid artifact path
    #[error(transparent)]
    Path(#[from] PathError),

    /// Storage I/O failure
    #[error("artifact storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    /// Check if error is retryable
    ///
    /// Only storage I/O can succeed on a second attempt; everything else is a
    /// property of the request or of the stored data.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
