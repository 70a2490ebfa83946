//! MLCD Artifact Store
//!
//! Run-addressed, write-once storage for serialized models.
//!
//! # Core Concepts
//!
//! - [`RunId`]: Identifier of one training invocation
//! - [`ArtifactPath`]: Validated relative path of an artifact inside a run
//! - [`ModelArtifact`]: Immutable serialized predictor with its [`ContentHash`]
//! - [`ArtifactUri`]: `mlcd-artifacts:/<run_id>/<path>` reference passed between steps
//! - [`ArtifactStore`]: Write-once, read-many storage trait
//!
//! # Example
//!
//! ```rust,ignore
//! use mlcd_artifact::{ArtifactStore, MemoryArtifactStore, ModelArtifact, RunId};
//!
//! let store = MemoryArtifactStore::new();
//! let run_id = RunId::new();
//! let artifact = ModelArtifact::new(run_id, "model/model.json".parse()?, bytes);
//! store.put(artifact).await?;
//!
//! let loaded = store.get(run_id, &"model/model.json".parse()?).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod fs;
mod hash;
mod id;
mod path;
mod store;

pub use artifact::{ArtifactError, ArtifactUri, ModelArtifact, ARTIFACT_URI_SCHEME};
pub use fs::FsArtifactStore;
pub use hash::{ContentHash, HashError};
pub use id::{RunId, RunIdError};
pub use path::{ArtifactPath, PathError};
pub use store::{ArtifactStore, MemoryArtifactStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
