//! Artifact store abstraction
//!
//! [`ArtifactStore`] is the run-addressed, write-once, read-many storage the
//! pipeline persists trained models into.

use crate::artifact::{ArtifactError, ModelArtifact};
use crate::id::RunId;
use crate::path::ArtifactPath;
use async_trait::async_trait;
use dashmap::DashMap;

/// Write-once storage for model artifacts keyed by `(run_id, path)`
#[async_trait]
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Persist an artifact
    ///
    /// # Errors
    /// - `ArtifactError::AlreadyExists` if the key was written before
    async fn put(&self, artifact: ModelArtifact) -> Result<(), ArtifactError>;

    /// Read an artifact back
    ///
    /// # Errors
    /// - `ArtifactError::NotFound` if nothing was written at this key
    /// - `ArtifactError::Corrupted` if the stored bytes fail verification
    async fn get(&self, run_id: RunId, path: &ArtifactPath) -> Result<ModelArtifact, ArtifactError>;

    /// List artifact paths stored for a run, sorted
    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactPath>, ArtifactError>;
}

/// In-process artifact store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<(RunId, ArtifactPath), ModelArtifact>,
}

impl MemoryArtifactStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Check if store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, artifact: ModelArtifact) -> Result<(), ArtifactError> {
        let key = (artifact.run_id(), artifact.path().clone());
        match self.artifacts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let (run_id, path) = entry.key().clone();
                Err(ArtifactError::AlreadyExists { run_id, path })
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::debug!(
                    run_id = %artifact.run_id(),
                    path = %artifact.path(),
                    "stored artifact"
                );
                entry.insert(artifact);
                Ok(())
            }
        }
    }

    async fn get(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
    ) -> Result<ModelArtifact, ArtifactError> {
        self.artifacts
            .get(&(run_id, path.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ArtifactError::NotFound {
                run_id,
                path: path.clone(),
            })
    }

    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactPath>, ArtifactError> {
        let mut paths: Vec<ArtifactPath> = self
            .artifacts
            .iter()
            .filter(|entry| entry.key().0 == run_id)
            .map(|entry| entry.key().1.clone())
            .collect();
        paths.sort();
        Ok(paths)
    }
}
