//! Per-model promotion locks
//!
//! Two promotions of the same model name must not interleave their
//! "enumerate production, archive, promote" sequences. Locks are in-process
//! only; executors in separate processes need the scheduler to serialize them.

use dashmap::DashMap;
use mlcd_registry::ModelName;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while promoting one model name
#[derive(Debug)]
pub struct PromotionGuard {
    name: ModelName,
    _guard: OwnedMutexGuard<()>,
}

impl PromotionGuard {
    /// Locked model name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &ModelName {
        &self.name
    }
}

/// Async mutual exclusion keyed by model name; clones share the lock table
#[derive(Debug, Clone, Default)]
pub struct PromotionLocks {
    locks: Arc<DashMap<ModelName, Arc<Mutex<()>>>>,
}

impl PromotionLocks {
    /// Create empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, name: &ModelName) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(name.clone()).or_default().value())
    }

    /// Wait for the lock of `name`
    pub async fn acquire(&self, name: &ModelName) -> PromotionGuard {
        let lock = self.lock_for(name);
        tracing::debug!(model = %name, "waiting for promotion lock");
        PromotionGuard {
            name: name.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Take the lock of `name` if it is free
    #[must_use]
    pub fn try_acquire(&self, name: &ModelName) -> Option<PromotionGuard> {
        let guard = self.lock_for(name).try_lock_owned().ok()?;
        Some(PromotionGuard {
            name: name.clone(),
            _guard: guard,
        })
    }

    /// Number of model names seen
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no lock was ever requested
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn name(s: &str) -> ModelName {
        ModelName::new(s).unwrap()
    }

    #[tokio::test]
    async fn same_name_is_exclusive() {
        let locks = PromotionLocks::new();
        let guard = locks.acquire(&name("a")).await;
        assert_eq!(guard.name().as_str(), "a");
        assert!(locks.try_acquire(&name("a")).is_none());

        drop(guard);
        assert!(locks.try_acquire(&name("a")).is_some());
    }

    #[tokio::test]
    async fn different_names_are_independent() {
        let locks = PromotionLocks::new();
        let _a = locks.acquire(&name("a")).await;
        assert!(locks.try_acquire(&name("b")).is_some());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn clones_share_locks() {
        let locks = PromotionLocks::new();
        let other = locks.clone();
        let guard = locks.acquire(&name("a")).await;

        let waiter = tokio::spawn(async move {
            let _g = other.acquire(&name("a")).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
