//! Registry client
//!
//! [`RegistryClient`] is the handle every pipeline step receives explicitly.
//! It pairs a [`ModelRegistry`] with an [`ArtifactStore`] and exposes the
//! operations the promotion workflow depends on:
//! - Production lookup that treats "no production model" as a normal state
//! - Artifact load/store with typed (de)serialization
//! - Idempotent archival
//! - Registration plus promotion of a new version

use crate::cache::ArtifactCache;
use crate::error::RegistryError;
use crate::registry::ModelRegistry;
use crate::types::{ModelName, ModelVersion, RunRecord, Stage, VersionRef};
use mlcd_artifact::{
    ArtifactError, ArtifactPath, ArtifactStore, ArtifactUri, ModelArtifact, RunId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Handle to the model registry and artifact store
#[derive(Debug, Clone)]
pub struct RegistryClient {
    registry: Arc<dyn ModelRegistry>,
    store: Arc<dyn ArtifactStore>,
    cache: ArtifactCache,
}

impl RegistryClient {
    /// Create client over a registry and an artifact store
    #[must_use]
    pub fn new(registry: Arc<dyn ModelRegistry>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            registry,
            store,
            cache: ArtifactCache::default(),
        }
    }

    /// Underlying registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    /// Underlying artifact store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Current production version of `name`
    ///
    /// Returns `None` when nothing is in production (cold start). If several
    /// versions are in production the highest version number wins.
    pub async fn get_production_version(
        &self,
        name: &ModelName,
    ) -> Result<Option<VersionRef>, RegistryError> {
        Ok(self.production_versions(name).await?.pop())
    }

    /// Every version of `name` currently in production, ascending
    pub async fn production_versions(
        &self,
        name: &ModelName,
    ) -> Result<Vec<VersionRef>, RegistryError> {
        let versions = self
            .registry
            .list_versions_by_stage(name, Stage::Production)
            .await?;
        Ok(versions.iter().map(ModelVersion::version_ref).collect())
    }

    /// Full registry entry of a version
    pub async fn version(&self, version: &VersionRef) -> Result<ModelVersion, RegistryError> {
        self.registry
            .get_version(version)
            .await?
            .ok_or_else(|| RegistryError::VersionNotFound(version.clone()))
    }

    /// All versions of `name`
    pub async fn versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, RegistryError> {
        self.registry.list_versions(name).await
    }

    /// Fetch raw artifact bytes
    ///
    /// # Errors
    /// - `RegistryError::ArtifactNotFound` if the path does not exist for the run
    /// - `RegistryError::Deserialization` if the stored bytes fail verification
    pub async fn fetch_artifact(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
    ) -> Result<Arc<ModelArtifact>, RegistryError> {
        let fetched = self
            .cache
            .try_get_or_insert_with(run_id, path, || self.store.get(run_id, path))
            .await;

        match fetched {
            Ok(artifact) => Ok(artifact),
            Err(ArtifactError::NotFound { run_id, path }) => {
                let available = self.store.list(run_id).await.unwrap_or_default();
                tracing::error!(
                    run_id = %run_id,
                    path = %path,
                    available = ?available.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "artifact not found"
                );
                Err(RegistryError::ArtifactNotFound {
                    run_id,
                    path,
                    available,
                })
            }
            Err(e @ ArtifactError::Corrupted { .. }) => Err(RegistryError::Deserialization {
                run_id,
                path: path.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Load and deserialize a model artifact
    ///
    /// # Errors
    /// - `RegistryError::ArtifactNotFound` if the path does not exist for the run
    /// - `RegistryError::Deserialization` if the bytes cannot be reconstructed
    pub async fn load_artifact<M: DeserializeOwned>(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
    ) -> Result<M, RegistryError> {
        tracing::info!(run_id = %run_id, path = %path, "loading model artifact");
        let artifact = self.fetch_artifact(run_id, path).await?;
        serde_json::from_slice(artifact.bytes()).map_err(|e| RegistryError::Deserialization {
            run_id,
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Serialize a model and store it under `(run_id, path)`
    ///
    /// # Errors
    /// - `RegistryError::Artifact` wrapping `AlreadyExists` if the key was written before
    pub async fn store_artifact<M: Serialize + Sync>(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
        model: &M,
    ) -> Result<ArtifactUri, RegistryError> {
        let bytes =
            serde_json::to_vec(model).map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let artifact = ModelArtifact::new(run_id, path.clone(), bytes);
        let uri = artifact.uri();
        self.store.put(artifact).await?;
        Ok(uri)
    }

    /// Store raw bytes under `(run_id, path)`, accepting an identical existing copy
    ///
    /// Lets a retried promotion re-register the same model without tripping
    /// the write-once rule.
    ///
    /// # Errors
    /// - `RegistryError::ArtifactConflict` if different bytes already occupy the path
    pub async fn ensure_artifact(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
        bytes: Vec<u8>,
    ) -> Result<ArtifactUri, RegistryError> {
        let artifact = ModelArtifact::new(run_id, path.clone(), bytes);
        let uri = artifact.uri();
        let new = *artifact.hash();

        match self.store.put(artifact).await {
            Ok(()) => Ok(uri),
            Err(ArtifactError::AlreadyExists { .. }) => {
                let stored = *self.fetch_artifact(run_id, path).await?.hash();
                if stored == new {
                    tracing::debug!(uri = %uri, "artifact already present");
                    Ok(uri)
                } else {
                    Err(RegistryError::ArtifactConflict {
                        run_id,
                        path: path.clone(),
                        stored,
                        new,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move a version to [`Stage::Archived`]
    ///
    /// Idempotent: returns `false` without touching the registry when the
    /// version is already archived.
    pub async fn archive(&self, version: &VersionRef) -> Result<bool, RegistryError> {
        let current = self.version(version).await?;
        if current.stage == Stage::Archived {
            tracing::debug!(version = %version, "already archived");
            return Ok(false);
        }
        tracing::info!(version = %version, from = %current.stage, "archiving model version");
        self.registry.transition_stage(version, Stage::Archived).await?;
        Ok(true)
    }

    /// Register a new version bound to `(run_id, artifact)` and move it to production
    ///
    /// Not idempotent: every call registers another version.
    pub async fn promote(
        &self,
        run_id: RunId,
        artifact: &ArtifactPath,
        name: &ModelName,
    ) -> Result<VersionRef, RegistryError> {
        let created = self.registry.create_version(name, run_id, artifact).await?;
        let version = created.version_ref();
        self.registry
            .transition_stage(&version, Stage::Production)
            .await?;
        tracing::info!(
            run_id = %run_id,
            version = %version,
            "promoted model version to production"
        );
        Ok(version)
    }

    /// Record a training run
    pub async fn record_run(&self, run: RunRecord) -> Result<(), RegistryError> {
        self.registry.record_run(run).await
    }

    /// Look up a training run
    pub async fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, RegistryError> {
        self.registry.get_run(run_id).await
    }
}
