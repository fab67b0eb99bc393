//! Redis-backed shared cache.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time;

use crate::cache::{CacheError, SharedCache};

/// INCR and set the TTL only on the first increment, in one round trip.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Shared cache backed by a Redis `ConnectionManager` (auto-reconnecting,
/// multiplexed, cheap to clone per operation).
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    incr_script: redis::Script,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connect to `url`, giving up after `connect_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(connect_timeout))??;

        tracing::info!(op_timeout_ms = op_timeout.as_millis() as u64, "Connected to Redis");

        Ok(Self {
            conn,
            incr_script: redis::Script::new(INCR_WITH_EXPIRY),
            op_timeout,
        })
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex(key, value, secs).await })
            .await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl_ms);
        self.bounded(async move { invocation.invoke_async(&mut conn).await })
            .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
