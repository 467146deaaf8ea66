use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Key of a named mutex: the parent's resource type plus its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub resource_type: &'static str,
    pub name: String,
}

impl LockKey {
    #[must_use]
    pub fn new(resource_type: &'static str, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.name)
    }
}

/// Registry of named async mutexes.
///
/// Serializes mutations of a parent object's sub-collections (credentials,
/// owners, roles) within one process. Entries are created on first use and
/// kept for the lifetime of the registry.
#[derive(Default)]
pub struct NameLock {
    entries: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl NameLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the named mutex is free and takes it.
    pub async fn acquire(&self, key: LockKey) -> NameGuard {
        // Clone the mutex out so the map shard is not held across the await
        let mutex = Arc::clone(self.entries.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        tracing::trace!(lock = %key, "name lock acquired");
        NameGuard { key, _guard: guard }
    }

    /// Number of names that have ever been locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for NameLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameLock")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Held name lock. Dropping it releases the lock.
pub struct NameGuard {
    key: LockKey,
    _guard: OwnedMutexGuard<()>,
}

impl NameGuard {
    #[must_use]
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Releases the lock explicitly.
    pub fn release(self) {
        tracing::trace!(lock = %self.key, "name lock released");
    }
}

impl fmt::Debug for NameGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let locks = Arc::new(NameLock::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(LockKey::new("application", "app-1")).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let locks = NameLock::new();
        let first = locks.acquire(LockKey::new("application", "a")).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(LockKey::new("application", "b")),
        )
        .await;
        assert!(second.is_ok());
        assert_eq!(first.key().name, "a");
    }

    #[tokio::test]
    async fn test_release_frees_the_name() {
        let locks = NameLock::new();
        let key = LockKey::new("application", "a");
        let guard = locks.acquire(key.clone()).await;
        guard.release();
        let again = tokio::time::timeout(Duration::from_millis(100), locks.acquire(key)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_poison() {
        let locks = NameLock::new();
        let key = LockKey::new("application", "a");
        let held = locks.acquire(key.clone()).await;
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), locks.acquire(key.clone())).await;
        assert!(timed_out.is_err());
        drop(held);
        assert!(
            tokio::time::timeout(Duration::from_millis(100), locks.acquire(key))
                .await
                .is_ok()
        );
    }
}
