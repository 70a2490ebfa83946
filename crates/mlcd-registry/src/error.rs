//! Error types for the model registry

use crate::types::VersionRef;
use mlcd_artifact::{ArtifactError, ArtifactPath, ContentHash, RunId};

/// Registry and registry-client errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Unknown model version
    #[error("model version not found: {0}")]
    VersionNotFound(VersionRef),

    /// Run records are created once
    #[error("run already recorded: {0}")]
    RunAlreadyExists(RunId),

    /// Empty or malformed model name
    #[error("invalid model name: {0:?}")]
    InvalidModelName(String),

    /// Unknown stage name
    #[error("invalid stage: {0:?}")]
    InvalidStage(String),

    /// Artifact path does not exist for the run
    #[error("artifact not found: run {run_id}, path {path} (available: {available:?})")]
    ArtifactNotFound {
        run_id: RunId,
        path: ArtifactPath,
        available: Vec<ArtifactPath>,
    },

    /// Stored bytes cannot be reconstructed into a model
    #[error("cannot deserialize artifact: run {run_id}, path {path}: {reason}")]
    Deserialization {
        run_id: RunId,
        path: ArtifactPath,
        reason: String,
    },

    /// A different artifact already occupies the path
    #[error("conflicting artifact at run {run_id}, path {path}: stored {stored}, new {new}")]
    ArtifactConflict {
        run_id: RunId,
        path: ArtifactPath,
        stored: ContentHash,
        new: ContentHash,
    },

    /// Model could not be serialized for storage
    #[error("cannot serialize artifact: {0}")]
    Serialization(String),

    /// Other artifact store failure
    #[error("artifact store error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Registry backend unavailable (transient)
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// Registry backend storage failure
    #[error("registry storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Registry state file is unreadable
    #[error("registry state corrupted: {0}")]
    CorruptState(#[from] serde_json::Error),
}

impl RegistryError {
    /// Check if error is retryable
    ///
    /// Availability and storage I/O failures are retried at the scheduler
    /// level; missing or unreadable artifacts are fatal for the run.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Storage(_) => true,
            Self::Artifact(e) => e.is_retryable(),
            _ => false,
        }
    }
}
