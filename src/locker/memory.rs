//! Process-local lock store.
//!
//! Used for single-node deployments and tests. Each operation runs under the
//! owning DashMap shard lock, so check-and-set is indivisible across tasks.
//! Expiry is evaluated lazily against tokio's clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::locker::{namespaced, ttl_millis, LockError, Locker, DEFAULT_KEY_PREFIX};

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Instant,
}

impl Lease {
    fn new(token: &str, ttl: Duration, now: Instant) -> Self {
        Self {
            token: token.to_string(),
            expires_at: now + Duration::from_millis(ttl_millis(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`Locker`] with the same fencing semantics as the networked store.
#[derive(Debug)]
pub struct InMemoryLocker {
    leases: DashMap<String, Lease>,
    prefix: String,
    reachable: AtomicBool,
}

impl InMemoryLocker {
    /// Create an empty store using [`DEFAULT_KEY_PREFIX`].
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_KEY_PREFIX)
    }

    /// Create an empty store with a custom key namespace.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            leases: DashMap::new(),
            prefix: prefix.into(),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    ///
    /// While unreachable every operation fails with [`LockError::Unavailable`]
    /// and leases keep expiring.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Token currently holding `key`, if the lease is still live.
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .get(&namespaced(&self.prefix, key))
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.token.clone())
    }

    fn ensure_reachable(&self) -> Result<(), LockError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::Unavailable("in-memory store marked unreachable".into()))
        }
    }
}

impl Default for InMemoryLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        self.ensure_reachable()?;
        let now = Instant::now();

        let acquired = match self.leases.entry(namespaced(&self.prefix, key)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    false
                } else {
                    entry.insert(Lease::new(token, ttl, now));
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Lease::new(token, ttl, now));
                true
            }
        };
        Ok(acquired)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        self.ensure_reachable()?;
        let now = Instant::now();

        let removed = self
            .leases
            .remove_if(&namespaced(&self.prefix, key), |_, lease| {
                lease.token == token && lease.is_live(now)
            });
        Ok(removed.is_some())
    }

    async fn extend_lease(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        self.ensure_reachable()?;
        let now = Instant::now();

        let Some(mut lease) = self.leases.get_mut(&namespaced(&self.prefix, key)) else {
            return Ok(false);
        };
        if lease.token != token || !lease.is_live(now) {
            return Ok(false);
        }
        lease.expires_at = now + Duration::from_millis(ttl_millis(ttl));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let locker = InMemoryLocker::new();
        assert!(locker.acquire("job", "a", TTL).await.unwrap());
        assert!(!locker.acquire("job", "b", TTL).await.unwrap());
        // Re-acquire by the same holder is still a collision: the key exists.
        assert!(!locker.acquire("job", "a", TTL).await.unwrap());
        assert_eq!(locker.holder("job").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let locker = Arc::new(InMemoryLocker::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let locker = locker.clone();
            handles.push(tokio::spawn(async move {
                locker.acquire("race", &format!("token-{i}"), TTL).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_release_and_extend_are_fenced() {
        let locker = InMemoryLocker::new();
        assert!(locker.acquire("job", "owner", TTL).await.unwrap());

        assert!(!locker.release("job", "intruder").await.unwrap());
        assert!(!locker.extend_lease("job", "intruder", TTL).await.unwrap());
        assert_eq!(locker.holder("job").as_deref(), Some("owner"));

        assert!(locker.extend_lease("job", "owner", TTL).await.unwrap());
        assert!(locker.release("job", "owner").await.unwrap());
        assert_eq!(locker.holder("job"), None);
        assert!(!locker.release("job", "owner").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_can_be_taken_over() {
        let locker = InMemoryLocker::new();
        assert!(locker.acquire("job", "old", Duration::from_secs(1)).await.unwrap());

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert_eq!(locker.holder("job"), None);
        assert!(!locker.extend_lease("job", "old", TTL).await.unwrap());
        assert!(locker.acquire("job", "new", TTL).await.unwrap());
        assert!(!locker.release("job", "old").await.unwrap());
        assert_eq!(locker.holder("job").as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_pushes_expiry() {
        let locker = InMemoryLocker::new();
        assert!(locker.acquire("job", "a", Duration::from_secs(2)).await.unwrap());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(locker.extend_lease("job", "a", Duration::from_secs(2)).await.unwrap());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(locker.holder("job").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let locker = InMemoryLocker::new();
        locker.set_reachable(false);
        assert!(matches!(
            locker.acquire("job", "a", TTL).await,
            Err(LockError::Unavailable(_))
        ));

        locker.set_reachable(true);
        assert!(locker.acquire("job", "a", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_isolates_namespaces() {
        let locker = InMemoryLocker::with_prefix("other:");
        assert!(locker.acquire("job", "a", TTL).await.unwrap());
        assert_eq!(locker.leases.len(), 1);
        assert!(locker.leases.contains_key("other:job"));
    }
}
