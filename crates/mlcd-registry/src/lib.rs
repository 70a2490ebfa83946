//! MLCD Model Registry
//!
//! Versioned model registry with lifecycle stages and the client handle the
//! promotion workflow is built on.
//!
//! # Core Concepts
//!
//! - [`Stage`]: Lifecycle state of a model version (None/Staging/Production/Archived)
//! - [`ModelVersion`]: Registry entry binding a [`ModelName`] to one artifact
//! - [`RunRecord`]: Immutable metadata of a training invocation
//! - [`ModelRegistry`]: Registry contract ("list versions by stage", "transition stage", ...)
//! - [`InMemoryRegistry`] / [`FileRegistry`]: Registry implementations
//! - [`RegistryClient`]: Explicitly constructed handle combining registry and artifact store
//!
//! # Example
//!
//! ```rust,ignore
//! use mlcd_registry::{InMemoryRegistry, ModelName, RegistryClient};
//! use mlcd_artifact::MemoryArtifactStore;
//!
//! let client = RegistryClient::new(
//!     Arc::new(InMemoryRegistry::new()),
//!     Arc::new(MemoryArtifactStore::new()),
//! );
//! let name = ModelName::new("my_model")?;
//! if client.get_production_version(&name).await?.is_none() {
//!     // cold start
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cache;
mod client;
mod error;
mod file;
mod registry;
mod types;

pub use cache::ArtifactCache;
pub use client::RegistryClient;
pub use error::RegistryError;
pub use file::FileRegistry;
pub use registry::{InMemoryRegistry, ModelRegistry};
pub use types::{
    ModelName, ModelVersion, RunRecord, Stage, VersionRef, GIT_REVISION_TAG, MODEL_TYPE_PARAM,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use mlcd_artifact::{FsArtifactStore, RunId};
    use std::sync::Arc;

    #[tokio::test]
    async fn file_backed_client_promotes_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let make_client = || {
            RegistryClient::new(
                Arc::new(FileRegistry::new(dir.path().join("registry"))),
                Arc::new(FsArtifactStore::new(dir.path().join("artifacts"))),
            )
        };
        let name = ModelName::new("my_model").unwrap();
        let run_id = RunId::new();
        let path = "model/model.json".parse().unwrap();

        let writer = make_client();
        writer.store_artifact(run_id, &path, &vec![1.0_f64, 2.0]).await.unwrap();
        let version = writer.promote(run_id, &path, &name).await.unwrap();

        let reader = make_client();
        assert_eq!(reader.get_production_version(&name).await.unwrap(), Some(version));
        let weights: Vec<f64> = reader.load_artifact(run_id, &path).await.unwrap();
        assert_eq!(weights, vec![1.0, 2.0]);
    }
}
