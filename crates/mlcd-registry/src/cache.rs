//! Artifact cache using moka
//!
//! Artifacts are immutable once written, so a fetched artifact can be reused
//! for the rest of the process (validation and promotion both load the
//! candidate).

use mlcd_artifact::{ArtifactPath, ModelArtifact, RunId};
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;

/// Cache of fetched artifacts keyed by `(run_id, path)`
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    inner: Cache<(RunId, ArtifactPath), Arc<ModelArtifact>>,
}

impl ArtifactCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Get artifact from cache
    pub async fn get(&self, run_id: RunId, path: &ArtifactPath) -> Option<Arc<ModelArtifact>> {
        self.inner.get(&(run_id, path.clone())).await
    }

    /// Get or fetch artifact; failures are not cached
    pub async fn try_get_or_insert_with<E, F, Fut>(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
        f: F,
    ) -> Result<Arc<ModelArtifact>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModelArtifact, E>>,
    {
        if let Some(cached) = self.get(run_id, path).await {
            tracing::trace!(run_id = %run_id, path = %path, "artifact cache hit");
            return Ok(cached);
        }

        let artifact = Arc::new(f().await?);
        self.inner
            .insert((run_id, path.clone()), Arc::clone(&artifact))
            .await;
        Ok(artifact)
    }
}

impl Default for ArtifactCache {
    /// Create cache with default capacity (256 artifacts)
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn path() -> ArtifactPath {
        "model/model.json".parse().unwrap()
    }

    #[tokio::test]
    async fn fetches_once() {
        let cache = ArtifactCache::default();
        let run_id = RunId::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let artifact = cache
                .try_get_or_insert_with::<(), _, _>(run_id, &path(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ModelArtifact::new(run_id, path(), b"bytes".to_vec()))
                })
                .await
                .unwrap();
            assert_eq!(artifact.bytes(), b"bytes");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ArtifactCache::default();
        let run_id = RunId::new();

        let first = cache
            .try_get_or_insert_with(run_id, &path(), || async { Err("unavailable") })
            .await;
        assert!(first.is_err());
        assert!(cache.get(run_id, &path()).await.is_none());

        let second = cache
            .try_get_or_insert_with::<&str, _, _>(run_id, &path(), || async {
                Ok(ModelArtifact::new(run_id, path(), b"ok".to_vec()))
            })
            .await
            .unwrap();
        assert_eq!(second.bytes(), b"ok");
    }
}
