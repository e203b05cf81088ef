//! Redis-backed lock store.
//!
//! Each operation is a server-side Lua script so the compare and the write
//! happen in one round trip.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::locker::{namespaced, ttl_millis, LockError, Locker, DEFAULT_KEY_PREFIX};

const ACQUIRE_SCRIPT: &str =
    r#"return redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2]) and 1 or 0"#;

const RELEASE_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then return redis.call("DEL", KEYS[1]) else return 0 end"#;

const EXTEND_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then return redis.call("PEXPIRE", KEYS[1], ARGV[2]) else return 0 end"#;

/// [`Locker`] over a Redis connection manager (reconnects transparently).
#[derive(Clone)]
pub struct RedisLocker {
    conn: ConnectionManager,
    prefix: String,
    acquire: Script,
    release: Script,
    extend: Script,
}

impl RedisLocker {
    /// Connect to `url` and use [`DEFAULT_KEY_PREFIX`] for keys.
    pub async fn connect(url: &str) -> Result<Self, LockError> {
        Self::connect_with_prefix(url, DEFAULT_KEY_PREFIX).await
    }

    /// Connect to `url` with a custom key namespace.
    pub async fn connect_with_prefix(
        url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, LockError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, "Connected to redis lock store");
        Ok(Self::from_connection(conn, prefix))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
        }
    }
}

fn is_one(reply: i64) -> Result<bool, LockError> {
    match reply {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LockError::Protocol(format!("expected 0 or 1, got {other}"))),
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .acquire
            .key(namespaced(&self.prefix, key))
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        is_one(reply)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .release
            .key(namespaced(&self.prefix, key))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        is_one(reply)
    }

    async fn extend_lease(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .extend
            .key(namespaced(&self.prefix, key))
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        is_one(reply)
    }
}
