//! Testing utilities for MLCD workspace
//!
//! Shared fixtures and fault-injecting test doubles.

#![allow(missing_docs)]

use async_trait::async_trait;
use mlcd_artifact::{ArtifactPath, MemoryArtifactStore, RunId};
use mlcd_core::{DataFiles, LabeledDataset, NearestCentroidTrainer, Trainer, TrainedModel};
use mlcd_registry::{
    InMemoryRegistry, ModelName, ModelRegistry, ModelVersion, RegistryClient, RegistryError,
    RunRecord, Stage, VersionRef,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// One feature column, two well separated classes
pub const FEATURES_CSV: &str = "x\n0.0\n0.1\n0.2\n1.0\n1.1\n1.2\n";
/// Labels matching [`FEATURES_CSV`]
pub const LABELS_CSV: &str = "y\n0\n0\n0\n1\n1\n1\n";
/// Labels of [`FEATURES_CSV`] with the classes swapped
pub const FLIPPED_LABELS_CSV: &str = "y\n1\n1\n1\n0\n0\n0\n";

pub fn model_name() -> ModelName {
    ModelName::new("my_model").unwrap()
}

pub fn model_path() -> ArtifactPath {
    "model/model.json".parse().unwrap()
}

/// Client over an in-memory registry and store
pub fn in_memory_client() -> RegistryClient {
    RegistryClient::new(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(MemoryArtifactStore::new()),
    )
}

/// Client over `registry` and an in-memory store
pub fn client_with(registry: Arc<dyn ModelRegistry>) -> RegistryClient {
    RegistryClient::new(registry, Arc::new(MemoryArtifactStore::new()))
}

/// Write train/test CSV files into `dir`; the test split always uses [`LABELS_CSV`]
pub async fn write_dataset(dir: &Path, train_labels: &str) -> DataFiles {
    for (file, contents) in [
        ("x_train.csv", FEATURES_CSV),
        ("y_train.csv", train_labels),
        ("x_test.csv", FEATURES_CSV),
        ("y_test.csv", LABELS_CSV),
    ] {
        tokio::fs::write(dir.join(file), contents).await.unwrap();
    }
    DataFiles::from_dir(dir)
}

/// Model that is always right on the test split
pub fn good_model() -> TrainedModel {
    let data = LabeledDataset::new(vec![vec![0.0], vec![1.0]], vec![0, 1]).unwrap();
    NearestCentroidTrainer::new().fit(&data).unwrap()
}

/// Model that is always wrong on the test split
pub fn bad_model() -> TrainedModel {
    let data = LabeledDataset::new(vec![vec![0.0], vec![1.0]], vec![1, 0]).unwrap();
    NearestCentroidTrainer::new().fit(&data).unwrap()
}

/// Store `model` under a fresh run and promote it
pub async fn seed_production(
    client: &RegistryClient,
    name: &ModelName,
    model: &TrainedModel,
) -> VersionRef {
    let run_id = RunId::new();
    client.store_artifact(run_id, &model_path(), model).await.unwrap();
    client.promote(run_id, &model_path(), name).await.unwrap()
}

/// Store `model` under a fresh run, record the run and return its payload
pub async fn stage_candidate(
    client: &RegistryClient,
    model: &TrainedModel,
) -> mlcd_core::TrainingOutput {
    let run_id = RunId::new();
    let uri = client.store_artifact(run_id, &model_path(), model).await.unwrap();
    client
        .record_run(RunRecord::new("test", uri.clone()))
        .await
        .unwrap();
    mlcd_core::TrainingOutput::new(uri)
}

#[derive(Debug, Default)]
struct Faults {
    /// Transitions into this stage fail while the counter is positive
    transition: Option<(Stage, usize)>,
    create: usize,
    unavailable: bool,
}

/// [`InMemoryRegistry`] with switchable failures
#[derive(Debug, Default)]
pub struct FaultyRegistry {
    inner: InMemoryRegistry,
    faults: Mutex<Faults>,
}

impl FaultyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` transitions into `stage`
    pub fn fail_transitions_to(&self, stage: Stage, times: usize) {
        self.faults.lock().transition = Some((stage, times));
    }

    /// Fail the next `times` version registrations
    pub fn fail_creates(&self, times: usize) {
        self.faults.lock().create = times;
    }

    /// Fail every call until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.faults.lock().unavailable {
            Err(RegistryError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }

    fn take_transition_fault(&self, stage: Stage) -> bool {
        let mut faults = self.faults.lock();
        match &mut faults.transition {
            Some((target, remaining)) if *target == stage && *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_create_fault(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.create > 0 {
            faults.create -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl ModelRegistry for FaultyRegistry {
    async fn list_versions_by_stage(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        self.check_available()?;
        self.inner.list_versions_by_stage(name, stage).await
    }

    async fn list_versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, RegistryError> {
        self.check_available()?;
        self.inner.list_versions(name).await
    }

    async fn get_version(
        &self,
        version: &VersionRef,
    ) -> Result<Option<ModelVersion>, RegistryError> {
        self.check_available()?;
        self.inner.get_version(version).await
    }

    async fn create_version(
        &self,
        name: &ModelName,
        run_id: RunId,
        artifact_path: &ArtifactPath,
    ) -> Result<ModelVersion, RegistryError> {
        self.check_available()?;
        if self.take_create_fault() {
            return Err(RegistryError::Unavailable("injected create failure".to_string()));
        }
        self.inner.create_version(name, run_id, artifact_path).await
    }

    async fn transition_stage(
        &self,
        version: &VersionRef,
        stage: Stage,
    ) -> Result<ModelVersion, RegistryError> {
        self.check_available()?;
        if self.take_transition_fault(stage) {
            return Err(RegistryError::Unavailable(format!(
                "injected transition failure to {stage}"
            )));
        }
        self.inner.transition_stage(version, stage).await
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), RegistryError> {
        self.check_available()?;
        self.inner.record_run(run).await
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, RegistryError> {
        self.check_available()?;
        self.inner.get_run(run_id).await
    }
}
