//! Distributed lock subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(key, token, ttl):
//!     set key = token with expiry ttl, only if key is absent → true
//!     key present                                           → false
//!
//! release(key, token):
//!     stored == token → delete → true
//!     otherwise       → false (never touches another holder's lease)
//!
//! extend_lease(key, token, ttl):
//!     stored == token → reset expiry → true
//!     otherwise       → false
//! ```
//!
//! # Design Decisions
//! - Every operation is a single atomic step on the store side
//! - `Ok(false)` means "someone else holds it"; `Err(_)` means "store unreachable"
//! - Keys are namespaced so election names cannot collide with unrelated data

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryLocker;
#[cfg(feature = "redis")]
pub use self::redis::RedisLocker;

/// Namespace prepended to every lock key.
pub const DEFAULT_KEY_PREFIX: &str = "service-coordinator:lock:";

/// Errors surfaced when the backing store cannot answer.
///
/// These never mean "the lock is held by someone else"; that case is an
/// `Ok(false)` from the [`Locker`] operation.
#[derive(Debug, Error)]
pub enum LockError {
    /// The store could not be reached.
    #[error("lock store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the operation deadline.
    #[error("lock store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with something other than the expected integer reply.
    #[error("unexpected lock store reply: {0}")]
    Protocol(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Lock store operation, used to label errors and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOperation {
    Acquire,
    Release,
    ExtendLease,
}

impl LockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockOperation::Acquire => "acquire",
            LockOperation::Release => "release",
            LockOperation::ExtendLease => "extend_lease",
        }
    }
}

impl std::fmt::Display for LockOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic lease operations against a key-value store, fenced by a holder token.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Take the lease for `key` if nobody holds it.
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Drop the lease for `key` if `token` still holds it.
    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError>;

    /// Reset the lease expiry for `key` if `token` still holds it.
    async fn extend_lease(&self, key: &str, token: &str, ttl: Duration)
        -> Result<bool, LockError>;
}

/// Build the store key for an election name.
pub fn namespaced(prefix: &str, key: &str) -> String {
    let mut full = String::with_capacity(prefix.len() + key.len());
    full.push_str(prefix);
    full.push_str(key);
    full
}

/// Lease durations are stored with millisecond precision; anything shorter
/// would expire immediately.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
