//! Process-local shared cache.
//!
//! Only correct when a single gateway instance serves traffic; used for local
//! development and tests.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::{CacheError, SharedCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// DashMap-backed cache with lazy expiry.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Reads already ignore them; this only bounds memory.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();

        // The entry guard holds the shard lock for the whole read-modify-write.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let entry = occupied.get_mut();
                let count = entry
                    .value
                    .parse::<u64>()
                    .map_err(|_| CacheError::NotAnInteger { key: key.to_string() })?
                    + 1;
                entry.value = count.to_string();
                Ok(count)
            }
            Entry::Occupied(mut stale) => {
                stale.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at: now + ttl,
                });
                Ok(1)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at: now + ttl,
                });
                Ok(1)
            }
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires_after_ttl() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.incr_with_expiry("k", ttl).await.unwrap(), 1);
        assert_eq!(cache.incr_with_expiry("k", ttl).await.unwrap(), 2);

        // The expiry is set on creation and not extended by later increments.
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.incr_with_expiry("k", ttl).await.unwrap(), 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.incr_with_expiry("k", ttl).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires() {
        let cache = InMemoryCache::new();
        cache.set_ex("blacklist:t", "true", Duration::from_secs(10)).await.unwrap();
        assert_eq!(cache.get("blacklist:t").await.unwrap().as_deref(), Some("true"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("blacklist:t").await.unwrap(), None);

        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    cache
                        .incr_with_expiry("shared", Duration::from_secs(60))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get("shared").await.unwrap().as_deref(), Some("800"));
    }

    #[tokio::test]
    async fn test_incr_on_non_integer_fails() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "true", Duration::from_secs(10)).await.unwrap();
        assert!(matches!(
            cache.incr_with_expiry("k", Duration::from_secs(10)).await,
            Err(CacheError::NotAnInteger { .. })
        ));
    }
}
