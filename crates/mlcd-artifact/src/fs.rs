//! Filesystem-backed artifact store
//!
//! Layout under the root directory:
//!
//! ```text
//! objects/<run_id>/<path>   artifact bytes
//! hashes/<run_id>/<path>    hex Blake3 digest of the bytes
//! ```
//!
//! Files are written to a temporary sibling and then hard-linked into place,
//! which both publishes them atomically and fails if the key already exists.
//! A key counts as written once its hash file exists.

use crate::artifact::{ArtifactError, ModelArtifact};
use crate::hash::ContentHash;
use crate::id::RunId;
use crate::path::ArtifactPath;
use crate::store::ArtifactStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const OBJECTS_DIR: &str = "objects";
const HASHES_DIR: &str = "hashes";
const TMP_SUFFIX: &str = ".tmp";

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create store rooted at `root` (created lazily on first write)
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, run_id: RunId, path: &ArtifactPath) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(run_id.to_string())
            .join(path.to_relative_path_buf())
    }

    fn hash_path(&self, run_id: RunId, path: &ArtifactPath) -> PathBuf {
        self.root
            .join(HASHES_DIR)
            .join(run_id.to_string())
            .join(path.to_relative_path_buf())
    }
}

/// Write `contents` to `target` only if it does not exist yet
///
/// Returns `Ok(false)` when `target` already exists.
async fn publish_new(target: &Path, contents: &[u8]) -> std::io::Result<bool> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{file_name}.{}{TMP_SUFFIX}", ulid::Ulid::new()));

    fs::write(&tmp, contents).await?;
    let linked = fs::hard_link(&tmp, target).await;
    let _ = fs::remove_file(&tmp).await;

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Replace whatever is at `target` with `contents`
async fn publish_replace(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{file_name}.{}{TMP_SUFFIX}", ulid::Ulid::new()));
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, target).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

async fn exists(path: &Path) -> std::io::Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    /// The hash sidecar is published last and marks the key as written; an
    /// object without a sidecar is left over from an interrupted put and gets
    /// replaced.
    async fn put(&self, artifact: ModelArtifact) -> Result<(), ArtifactError> {
        let run_id = artifact.run_id();
        let path = artifact.path().clone();
        let object_file = self.object_path(run_id, &path);
        let hash_file = self.hash_path(run_id, &path);

        if exists(&hash_file).await? {
            return Err(ArtifactError::AlreadyExists { run_id, path });
        }

        if !publish_new(&object_file, artifact.bytes()).await? {
            let stale = fs::read(&object_file).await?;
            if stale != artifact.bytes() {
                tracing::warn!(
                    run_id = %run_id,
                    path = %path,
                    "replacing object left by an interrupted write"
                );
                publish_replace(&object_file, artifact.bytes()).await?;
            }
        }

        if !publish_new(&hash_file, artifact.hash().to_string().as_bytes()).await? {
            return Err(ArtifactError::AlreadyExists { run_id, path });
        }

        tracing::debug!(
            run_id = %run_id,
            path = %path,
            hash = %artifact.hash().short(),
            "stored artifact"
        );
        Ok(())
    }

    async fn get(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
    ) -> Result<ModelArtifact, ArtifactError> {
        let not_found = || ArtifactError::NotFound {
            run_id,
            path: path.clone(),
        };
        let recorded = match fs::read_to_string(self.hash_path(run_id, path)).await {
            Ok(recorded) => recorded,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let expected: ContentHash = recorded.trim().parse().map_err(|e| {
            std::io::Error::new(ErrorKind::InvalidData, format!("bad hash record: {e}"))
        })?;

        let bytes = match fs::read(self.object_path(run_id, path)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        ModelArtifact::from_stored(run_id, path.clone(), bytes, expected)
    }

    async fn list(&self, run_id: RunId) -> Result<Vec<ArtifactPath>, ArtifactError> {
        let run_root = self.root.join(OBJECTS_DIR).join(run_id.to_string());
        let mut paths = Vec::new();
        let mut pending = vec![(run_root, Vec::<String>::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') && name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                let mut segments = prefix.clone();
                segments.push(name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), segments));
                } else {
                    let path = ArtifactPath::new(segments)?;
                    if exists(&self.hash_path(run_id, &path)).await? {
                        paths.push(path);
                    }
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}
