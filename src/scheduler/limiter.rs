//! Bounded concurrency for job executions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting semaphore shared by every job of one or more schedulers.
///
/// At most `capacity` executions hold a permit at any instant. Cloning shares
/// the same permits.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl RateLimiter {
    /// A limiter admitting `rate` concurrent executions; zero is raised to one.
    pub fn new(rate: usize) -> Self {
        let capacity = rate.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a slot, giving up with `None` once `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_rate_means_one() {
        assert_eq!(RateLimiter::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_permits_are_bounded_and_returned() {
        let limiter = RateLimiter::new(2);
        let cancel = CancellationToken::new();

        let a = limiter.acquire(&cancel).await.unwrap();
        let _b = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), limiter.acquire(&cancel)).await;
        assert!(blocked.is_err());

        drop(a);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_wait() {
        let limiter = RateLimiter::new(1);
        let holder = CancellationToken::new();
        let _held = limiter.acquire(&holder).await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await.is_none() })
        };
        cancel.cancel();
        assert!(waiter.await.unwrap());
    }
}
