//! Fixed-window rate limiting against the shared cache.
//!
//! Each client gets one counter per window: `ratelimit:{identity}:{unix / window}`
//! for the gateway-wide ceiling, or `ratelimit:{service}:{identity}:{unix / window}`
//! when the service carries its own ceiling. The counter is created with the
//! window as its TTL, so stale windows clean themselves up. Across a window
//! boundary a client can get up to twice the ceiling through; that is accepted.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::SharedCache;
use crate::config::{CacheFailurePolicy, RateLimitConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::identity::ClientIdentity;

/// Which counter a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope<'a> {
    /// The gateway-wide ceiling, shared by every service without its own.
    Global,
    /// A service with its own ceiling and its own counter.
    Service { name: &'a str, limit: u64 },
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window closes.
    pub reset_after_secs: u64,
}

impl RateDecision {
    /// Turn a denial into the client-facing error.
    pub fn into_result(self) -> Result<Self, GatewayError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(GatewayError::TooManyRequests {
                limit: self.limit,
                retry_after_secs: self.reset_after_secs,
            })
        }
    }
}

pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    enabled: bool,
    limit: u64,
    window: Duration,
    on_cache_error: CacheFailurePolicy,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn SharedCache>, config: &RateLimitConfig) -> Self {
        Self {
            cache,
            enabled: config.enabled,
            limit: config.requests_per_window,
            window: Duration::from_secs(config.window_secs.max(1)),
            on_cache_error: config.on_cache_error,
        }
    }

    /// Count one request for `client` in the current window.
    pub async fn admit(&self, client: &ClientIdentity, scope: RateScope<'_>) -> RateDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.admit_at(client, scope, now).await
    }

    /// Count one request for `client` as if the clock read `unix_secs`.
    pub async fn admit_at(
        &self,
        client: &ClientIdentity,
        scope: RateScope<'_>,
        unix_secs: u64,
    ) -> RateDecision {
        let window_secs = self.window.as_secs();
        let reset_after_secs = window_secs - unix_secs % window_secs;
        let window = unix_secs / window_secs;

        let (limit, key) = match scope {
            RateScope::Global => (self.limit, format!("ratelimit:{}:{window}", client.rate_key())),
            RateScope::Service { name, limit } => {
                (limit, format!("ratelimit:{name}:{}:{window}", client.rate_key()))
            }
        };

        if !self.enabled {
            return RateDecision {
                allowed: true,
                limit,
                remaining: limit,
                reset_after_secs,
            };
        }

        match self.cache.incr_with_expiry(&key, self.window).await {
            Ok(count) => {
                let allowed = count <= limit;
                if !allowed {
                    tracing::warn!(client = %client, count, limit, "Rate limit exceeded");
                    metrics::record_rate_limited("limit_exceeded");
                }
                RateDecision {
                    allowed,
                    limit,
                    remaining: limit.saturating_sub(count),
                    reset_after_secs,
                }
            }
            Err(e) => {
                let allowed = self.on_cache_error == CacheFailurePolicy::FailOpen;
                tracing::warn!(
                    client = %client,
                    error = %e,
                    policy = ?self.on_cache_error,
                    "Rate limit check failed"
                );
                if !allowed {
                    metrics::record_rate_limited("cache_unavailable");
                }
                RateDecision {
                    allowed,
                    limit,
                    remaining: if allowed { limit } else { 0 },
                    reset_after_secs,
                }
            }
        }
    }
}
