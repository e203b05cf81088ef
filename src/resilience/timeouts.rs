//! Deadline enforcement for lock store calls.

use std::future::Future;
use std::time::Duration;

use crate::locker::LockError;

/// Run a store operation, turning an elapsed deadline into [`LockError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, op: F) -> Result<T, LockError>
where
    F: Future<Output = Result<T, LockError>>,
{
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(LockError::Timeout(deadline)),
    }
}
