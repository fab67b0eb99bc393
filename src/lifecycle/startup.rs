//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the shared cache
//! - Initialize all subsystems in dependency order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::io;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::cache::{CacheError, InMemoryCache, RedisCache, SharedCache};
use crate::config::loader::ConfigError;
use crate::config::{CacheBackend, CacheConfig, GatewayConfig};
use crate::http::forwarder::Forwarder;
use crate::http::server::AppState;
use crate::observability::logging::LoggingError;
use crate::registry::{RegistryError, ServiceRegistry};
use crate::security::{AuthError, CredentialValidator, RateLimiter};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("credential setup error: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

/// Connect the configured cache backend.
pub async fn connect_cache(config: &CacheConfig) -> Result<Arc<dyn SharedCache>, CacheError> {
    match config.backend {
        CacheBackend::Redis => {
            let cache = RedisCache::connect(
                &config.redis_url,
                std::time::Duration::from_secs(config.connect_timeout_secs),
                config.operation_timeout(),
            )
            .await?;
            Ok(Arc::new(cache))
        }
        CacheBackend::Memory => {
            tracing::warn!("Using in-process cache; counters and revocations are not shared across instances");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}

/// Wire every component around `cache`.
pub fn build_state(config: GatewayConfig, cache: Arc<dyn SharedCache>) -> Result<AppState, StartupError> {
    let registry = Arc::new(ServiceRegistry::from_config(
        &config.services,
        &config.circuit_breaker,
    )?);
    let validator = Arc::new(CredentialValidator::from_config(&config.auth, cache.clone())?);
    let limiter = Arc::new(RateLimiter::new(cache.clone(), &config.rate_limit));
    let forwarder = Arc::new(Forwarder::new(
        &config.listener.api_prefix,
        registry.clone(),
        validator.clone(),
        limiter,
        std::time::Duration::from_secs(config.timeouts.connect_secs),
    ));

    tracing::info!(
        services = registry.entries().len(),
        cache = cache.backend_name(),
        rate_limit = config.rate_limit.requests_per_window,
        window_secs = config.rate_limit.window_secs,
        "Gateway state initialized"
    );

    Ok(AppState {
        config: Arc::new(config),
        registry,
        forwarder,
        validator,
        cache,
        started_at: Utc::now(),
    })
}
