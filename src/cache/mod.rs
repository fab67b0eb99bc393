//! Shared key-value cache subsystem.
//!
//! # Data Flow
//! ```text
//! security/rate_limit.rs ──incr_with_expiry("ratelimit:{id}:{window}")──┐
//!                                                                      ├─→ SharedCache
//! security/auth.rs ───────get/set_ex("blacklist:{token}")──────────────┘     ├─ redis.rs  (multi-instance)
//!                                                                            └─ memory.rs (single node, tests)
//! ```
//!
//! # Design Decisions
//! - The cache is the single source of truth for counters and revocations;
//!   nothing above this layer keeps a copy
//! - Every operation is bounded by a timeout so a cache outage never hangs a request
//! - Increment-with-expiry is one atomic operation, never read-then-write

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cache value for {key} is not an integer")]
    NotAnInteger { key: String },
}

/// Minimal contract the gateway needs from its shared cache.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Read a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically increment a counter and return the new value.
    ///
    /// A missing counter is created with value 1 and an expiry of `ttl`;
    /// existing counters keep their original expiry.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short name for logs and status reports.
    fn backend_name(&self) -> &'static str;
}
