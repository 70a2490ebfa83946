//! File-backed model registry
//!
//! Keeps the whole registry in one JSON document so that separate pipeline
//! invocations (train, validate, promote) observe the same state. Each
//! mutation rewrites the document through a temporary file and a rename.

use crate::error::RegistryError;
use crate::registry::{ModelRegistry, RegistryState};
use crate::types::{ModelName, ModelVersion, RunRecord, Stage, VersionRef};
use async_trait::async_trait;
use mlcd_artifact::{ArtifactPath, RunId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_FILE: &str = "registry.json";

/// Registry persisted as `<root>/registry.json`
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    /// Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileRegistry {
    /// Create registry rooted at `root` (created on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the state document
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    async fn load(&self) -> Result<RegistryState, RegistryError> {
        match fs::read(self.state_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RegistryState::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &RegistryState) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.root).await?;
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self
            .root
            .join(format!(".{STATE_FILE}.{}.tmp", RunId::new()));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, self.state_path()).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> Result<T, RegistryError> {
        let _guard = self.guard.lock().await;
        let state = self.load().await?;
        Ok(f(&state))
    }

    async fn update<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let _guard = self.guard.lock().await;
        let mut state = self.load().await?;
        let out = f(&mut state)?;
        self.save(&state).await?;
        Ok(out)
    }
}

#[async_trait]
impl ModelRegistry for FileRegistry {
    async fn list_versions_by_stage(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        self.read(|s| s.list_versions(name, Some(stage))).await
    }

    async fn list_versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, RegistryError> {
        self.read(|s| s.list_versions(name, None)).await
    }

    async fn get_version(
        &self,
        version: &VersionRef,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        self.read(|s| s.get_version(version)).await
    }

    async fn create_version(
        &self,
        name: &ModelName,
        run_id: RunId,
        artifact_path: &ArtifactPath,
    ) -> Result<ModelVersion, RegistryError> {
        self.update(|s| Ok(s.create_version(name, run_id, artifact_path)))
            .await
    }

    async fn transition_stage(
        &self,
        version: &VersionRef,
        stage: Stage,
    ) -> Result<ModelVersion, RegistryError> {
        self.update(|s| s.transition_stage(version, stage)).await
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), RegistryError> {
        self.update(|s| s.record_run(run)).await
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, RegistryError> {
        self.read(|s| s.get_run(run_id)).await
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
        "model/model.json".parse().unwrap()
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        {
            let registry = FileRegistry::new(dir.path());
            let v = registry.create_version(&name(), run_id, &path()).await.unwrap();
            registry
                .transition_stage(&v.version_ref(), Stage::Production)
                .await
                .unwrap();
            registry
                .record_run(RunRecord::new("exp", ArtifactUri::new(run_id, path())))
                .await
                .unwrap();
        }

        let reopened = FileRegistry::new(dir.path());
        let prod = reopened
            .list_versions_by_stage(&name(), Stage::Production)
            .await
            .unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].run_id, run_id);
        assert!(reopened.get_run(run_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_root_reads_as_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().join("not-yet-created"));
        assert!(registry.list_versions(&name()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path());
        std::fs::write(registry.state_path(), b"{not json").unwrap();

        let err = registry.list_versions(&name()).await.unwrap_err();
        assert!(matches!(err, RegistryError::CorruptState(_)));
    }

    #[tokio::test]
    async fn failed_update_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path());
        registry.create_version(&name(), RunId::new(), &path()).await.unwrap();
        let before = std::fs::read(registry.state_path()).unwrap();

        let missing = VersionRef::new(name(), 42);
        assert!(registry.transition_stage(&missing, Stage::Archived).await.is_err());
        assert_eq!(std::fs::read(registry.state_path()).unwrap(), before);
    }
}
