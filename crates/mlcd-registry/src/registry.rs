//! Model registry contract and in-memory implementation
//!
//! [`ModelRegistry`] is the authoritative source of stage state per model
//! version. Each call is atomic on its own; callers that need several calls to
//! behave as one unit must serialize them externally.

use crate::error::RegistryError;
use crate::types::{ModelName, ModelVersion, RunRecord, Stage, VersionRef};
use async_trait::async_trait;
use chrono::Utc;
use mlcd_artifact::{ArtifactPath, RunId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Model registry operations
#[async_trait]
pub trait ModelRegistry: Send + Sync + std::fmt::Debug {
    /// Versions of `name` currently in `stage`, ascending by version
    async fn list_versions_by_stage(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError>;

    /// All versions of `name`, ascending by version
    async fn list_versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, RegistryError>;

    /// Look up one version
    async fn get_version(
        &self,
        version: &VersionRef,
    ) -> Result<Option<ModelVersion>, RegistryError>;

    /// Register a new version bound to an artifact; starts in [`Stage::None`]
    async fn create_version(
        &self,
        name: &ModelName,
        run_id: RunId,
        artifact_path: &ArtifactPath,
    ) -> Result<ModelVersion, RegistryError>;

    /// Move a version to `stage`
    ///
    /// # Errors
    /// - `RegistryError::VersionNotFound` for an unknown version
    async fn transition_stage(
        &self,
        version: &VersionRef,
        stage: Stage,
    ) -> Result<ModelVersion, RegistryError>;

    /// Store the metadata of a training run
    ///
    /// # Errors
    /// - `RegistryError::RunAlreadyExists` if the run was recorded before
    async fn record_run(&self, run: RunRecord) -> Result<(), RegistryError>;

    /// Look up a training run
    async fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, RegistryError>;
}

/// Registry contents shared by the in-memory and file-backed registries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegistryState {
    versions: Vec<ModelVersion>,
    runs: Vec<RunRecord>,
}

impl RegistryState {
    pub(crate) fn list_versions(
        &self,
        name: &ModelName,
        stage: Option<Stage>,
    ) -> Vec<ModelVersion> {
        let mut found: Vec<ModelVersion> = self
            .versions
            .iter()
            .filter(|v| &v.name == name && stage.map_or(true, |s| v.stage == s))
            .cloned()
            .collect();
        found.sort_by_key(|v| v.version);
        found
    }

    pub(crate) fn get_version(&self, version: &VersionRef) -> Option<ModelVersion> {
        self.versions
            .iter()
            .find(|v| v.name == version.name && v.version == version.version)
            .cloned()
    }

    pub(crate) fn create_version(
        &mut self,
        name: &ModelName,
        run_id: RunId,
        artifact_path: &ArtifactPath,
    ) -> ModelVersion {
        let next = self
            .versions
            .iter()
            .filter(|v| &v.name == name)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let version = ModelVersion {
            name: name.clone(),
            version: next,
            run_id,
            artifact_path: artifact_path.clone(),
            stage: Stage::None,
            created_at: now,
            updated_at: now,
        };
        self.versions.push(version.clone());
        version
    }

    pub(crate) fn transition_stage(
        &mut self,
        version: &VersionRef,
        stage: Stage,
    ) -> Result<ModelVersion, RegistryError> {
        let entry = self
            .versions
            .iter_mut()
            .find(|v| v.name == version.name && v.version == version.version)
            .ok_or_else(|| RegistryError::VersionNotFound(version.clone()))?;
        entry.stage = stage;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub(crate) fn record_run(&mut self, run: RunRecord) -> Result<(), RegistryError> {
        if self.runs.iter().any(|r| r.run_id == run.run_id) {
            return Err(RegistryError::RunAlreadyExists(run.run_id));
        }
        self.runs.push(run);
        Ok(())
    }

    pub(crate) fn get_run(&self, run_id: RunId) -> Option<RunRecord> {
        self.runs.iter().find(|r| r.run_id == run_id).cloned()
    }
}

/// In-process registry, used for tests and single-process pipelines
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryRegistry {
    async fn list_versions_by_stage(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        Ok(self.state.read().list_versions(name, Some(stage)))
    }

    async fn list_versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, RegistryError> {
        Ok(self.state.read().list_versions(name, None))
    }

    async fn get_version(
        &self,
        version: &VersionRef,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        Ok(self.state.read().get_version(version))
    }

    async fn create_version(
        &self,
        name: &ModelName,
        run_id: RunId,
        artifact_path: &ArtifactPath,
    ) -> Result<ModelVersion, RegistryError> {
        Ok(self.state.write().create_version(name, run_id, artifact_path))
    }

    async fn transition_stage(
        &self,
        version: &VersionRef,
        stage: Stage,
    ) -> Result<ModelVersion, RegistryError> {
        self.state.write().transition_stage(version, stage)
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), RegistryError> {
        self.state.write().record_run(run)
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, RegistryError> {
        Ok(self.state.read().get_run(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlcd_artifact::ArtifactUri;

    fn name() -> ModelName {
        ModelName::new("my_model").unwrap()
    }

    fn path() -> ArtifactPath {
        "production_model/model.json".parse().unwrap()
    }

    #[tokio::test]
    async fn versions_are_numbered_per_name() {
        let registry = InMemoryRegistry::new();
        let other = ModelName::new("other").unwrap();

        let v1 = registry.create_version(&name(), RunId::new(), &path()).await.unwrap();
        let v2 = registry.create_version(&name(), RunId::new(), &path()).await.unwrap();
        let o1 = registry.create_version(&other, RunId::new(), &path()).await.unwrap();

        assert_eq!((v1.version, v2.version, o1.version), (1, 2, 1));
        assert_eq!(v1.stage, Stage::None);
        assert_eq!(registry.list_versions(&name()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transition_and_list_by_stage() {
        let registry = InMemoryRegistry::new();
        let v1 = registry.create_version(&name(), RunId::new(), &path()).await.unwrap();
        registry.create_version(&name(), RunId::new(), &path()).await.unwrap();

        let moved = registry
            .transition_stage(&v1.version_ref(), Stage::Production)
            .await
            .unwrap();
        assert_eq!(moved.stage, Stage::Production);
        assert!(moved.updated_at >= moved.created_at);

        let prod = registry
            .list_versions_by_stage(&name(), Stage::Production)
            .await
            .unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].version, 1);
    }

    #[tokio::test]
    async fn transition_unknown_version_fails() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .transition_stage(&VersionRef::new(name(), 9), Stage::Archived)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn runs_are_recorded_once() {
        let registry = InMemoryRegistry::new();
        let run = RunRecord::new("exp", ArtifactUri::new(RunId::new(), path()));
        let run_id = run.run_id;

        registry.record_run(run.clone()).await.unwrap();
        let err = registry.record_run(run).await.unwrap_err();
        assert!(matches!(err, RegistryError::RunAlreadyExists(id) if id == run_id));
        assert!(registry.get_run(run_id).await.unwrap().is_some());
        assert!(registry.get_run(RunId::new()).await.unwrap().is_none());
    }

    fn stage() -> impl proptest::strategy::Strategy<Value = Stage> {
        proptest::sample::select(vec![
            Stage::None,
            Stage::Staging,
            Stage::Production,
            Stage::Archived,
        ])
    }

    proptest::proptest! {
        #[test]
        fn stage_listing_tracks_last_transition(
            moves in proptest::collection::vec((0usize..4, stage()), 0..32)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let registry = InMemoryRegistry::new();
                let mut refs = Vec::new();
                for _ in 0..4 {
                    let v = registry.create_version(&name(), RunId::new(), &path()).await.unwrap();
                    refs.push(v.version_ref());
                }
                let mut expected = [Stage::None; 4];
                for (index, target) in &moves {
                    registry.transition_stage(&refs[*index], *target).await.unwrap();
                    expected[*index] = *target;
                }

                let production: Vec<u32> = registry
                    .list_versions_by_stage(&name(), Stage::Production)
                    .await
                    .unwrap()
                    .iter()
                    .map(|v| v.version)
                    .collect();
                let want: Vec<u32> = (1..=4u32)
                    .filter(|v| expected[*v as usize - 1] == Stage::Production)
                    .collect();
                assert_eq!(production, want);
            });
        }
    }
}
