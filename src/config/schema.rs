//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, API prefix).
    pub listener: ListenerConfig,

    /// Backend service definitions. The route table is derived from these.
    pub services: Vec<ServiceConfig>,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Circuit breaker settings shared by every service.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Shared cache (rate counters, revocation list).
    pub cache: CacheConfig,

    /// Bearer credential validation.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Path prefix in front of every proxied service (e.g., "/api/v1").
    pub api_prefix: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
        }
    }
}

/// A single backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name; also the path segment after the API prefix.
    pub name: String,

    /// Base address (e.g., "http://auth-service:8001").
    pub url: String,

    /// Path probed by the health monitor.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Per-call timeout for forwarded requests and health probes.
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,

    /// Path prefix prepended on the backend side. Defaults to `/{name}`.
    #[serde(default)]
    pub upstream_prefix: Option<String>,

    /// Whether requests need a valid bearer credential.
    #[serde(default = "default_require_auth")]
    pub require_auth: bool,

    /// Service-relative path prefixes reachable without credentials.
    #[serde(default)]
    pub public_paths: Vec<String>,

    /// Requests per rate-limit window for this service, counted separately
    /// from other services. `None` uses `rate_limit.requests_per_window`.
    #[serde(default)]
    pub rate_limit_requests: Option<u64>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

fn default_require_auth() -> bool {
    true
}

impl ServiceConfig {
    /// Create a service with default probe path, auth and prefix.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            health_path: default_health_path(),
            timeout_secs,
            upstream_prefix: None,
            require_auth: default_require_auth(),
            public_paths: Vec::new(),
            rate_limit_requests: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The services of the default deployment.
pub fn default_services() -> Vec<ServiceConfig> {
    let mut auth = ServiceConfig::new("auth", "http://auth-service:8001", 10);
    auth.public_paths = vec![
        "/register".to_string(),
        "/login".to_string(),
        "/token".to_string(),
    ];
    auth.rate_limit_requests = Some(50);

    let mut jobs = ServiceConfig::new("jobs", "http://job-service:8002", 30);
    jobs.rate_limit_requests = Some(30);

    let mut notifications = ServiceConfig::new("notifications", "http://notification-service:8003", 15);
    notifications.rate_limit_requests = Some(20);

    vec![auth, jobs, notifications]
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background probe loop.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call is allowed.
    pub open_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }
}

/// What the rate limiter does when the shared cache cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheFailurePolicy {
    /// Admit the request.
    #[default]
    FailOpen,
    /// Reject the request.
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per identity per window.
    pub requests_per_window: u64,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Behaviour on cache errors.
    pub on_cache_error: CacheFailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 100,
            window_secs: 60,
            on_cache_error: CacheFailurePolicy::FailOpen,
        }
    }
}

/// Which shared cache implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Redis,
    /// Process-local cache; only correct for a single gateway instance.
    Memory,
}

/// Shared cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Redis connection URL.
    pub redis_url: String,

    /// Upper bound for a single cache operation in milliseconds.
    pub operation_timeout_ms: u64,

    /// Upper bound for the initial connection in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            operation_timeout_ms: 250,
            connect_timeout_secs: 5,
        }
    }
}

impl CacheConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Bearer credential configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret for HMAC algorithms.
    pub secret_key: String,

    /// PEM public key for RSA / EC algorithms.
    pub public_key_pem: Option<String>,

    /// Signing algorithm name (e.g., "HS256", "RS256").
    pub algorithm: String,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            secret_key: "your-gateway-secret-key".to_string(),
            public_key_pem: None,
            algorithm: "HS256".to_string(),
            leeway_secs: 0,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout for backend calls in seconds.
    pub connect_secs: u64,

    /// Total inbound request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl GatewayConfig {
    /// Defaults plus the services of the standard deployment.
    pub fn with_default_services() -> Self {
        Self {
            services: default_services(),
            ..Self::default()
        }
    }
}
