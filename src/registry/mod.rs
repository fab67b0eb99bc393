//! Service registry.
//!
//! # Responsibilities
//! - Hold one entry per configured backend service
//! - Pair each service with its circuit breaker and current health
//! - Gate traffic on health (the breaker is checked separately at call time)
//!
//! # Design Decisions
//! - Built once at startup and shared by `Arc`; the set of services never changes
//! - Health is an `ArcSwap` so the request path never waits on the probe loop
//! - `record_probe` is the only health mutator

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{CircuitBreakerConfig, ServiceConfig};
use crate::health::state::{HealthStatus, ProbeOutcome};
use crate::observability::metrics;
use crate::resilience::CircuitBreaker;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("service {0} is unhealthy")]
    Unavailable(String),

    #[error("service {service} has an invalid url '{url}'")]
    InvalidUrl { service: String, url: String },
}

/// Static description of a backend service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub base_url: Url,
    pub health_path: String,
    pub timeout: Duration,
    /// Path prepended to the forwarded remainder, e.g. `/jobs`.
    pub upstream_prefix: String,
    pub require_auth: bool,
    pub public_paths: Vec<String>,
    /// Own per-window ceiling; `None` shares the gateway-wide one.
    pub rate_limit: Option<u64>,
}

impl ServiceDescriptor {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&config.url).map_err(|_| RegistryError::InvalidUrl {
            service: config.name.clone(),
            url: config.url.clone(),
        })?;

        let upstream_prefix = config
            .upstream_prefix
            .clone()
            .unwrap_or_else(|| format!("/{}", config.name));

        Ok(Self {
            name: config.name.clone(),
            base_url,
            health_path: config.health_path.clone(),
            timeout: config.timeout(),
            upstream_prefix: normalize_prefix(&upstream_prefix),
            require_auth: config.require_auth,
            public_paths: config.public_paths.clone(),
            rate_limit: config.rate_limit_requests,
        })
    }

    /// Base URL without a trailing slash, e.g. `http://job-service:8002`.
    pub fn origin(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn probe_url(&self) -> String {
        format!("{}{}", self.origin(), self.health_path)
    }
}

/// `jobs/` and `/jobs` both become `/jobs`; an empty or `/` prefix becomes empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// A service with its breaker and live health.
#[derive(Debug)]
pub struct ServiceEntry {
    pub descriptor: ServiceDescriptor,
    pub breaker: Arc<CircuitBreaker>,
    health: ArcSwap<HealthStatus>,
}

impl ServiceEntry {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn health(&self) -> Arc<HealthStatus> {
        self.health.load_full()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.load().healthy
    }
}

/// Per-service line of the status report.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub url: String,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub circuit_state: &'static str,
}

#[derive(Debug)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn from_config(
        services: &[ServiceConfig],
        breaker_config: &CircuitBreakerConfig,
    ) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for config in services {
            let descriptor = ServiceDescriptor::from_config(config)?;
            let entry = ServiceEntry {
                breaker: Arc::new(CircuitBreaker::from_config(&descriptor.name, breaker_config)),
                health: ArcSwap::from_pointee(HealthStatus::initial(&descriptor.name)),
                descriptor,
            };
            map.insert(config.name.clone(), Arc::new(entry));
        }

        tracing::info!(services = map.len(), "Service registry initialized");
        Ok(Self { services: map })
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.get(name).cloned()
    }

    /// The entry for `name` if it is currently healthy.
    pub fn healthy_target(&self, name: &str) -> Result<Arc<ServiceEntry>, RegistryError> {
        let entry = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;

        if entry.is_healthy() {
            Ok(entry)
        } else {
            Err(RegistryError::Unavailable(name.to_string()))
        }
    }

    pub fn entries(&self) -> Vec<Arc<ServiceEntry>> {
        self.services.values().cloned().collect()
    }

    pub fn overall_status(&self) -> Vec<ServiceReport> {
        self.services
            .values()
            .map(|entry| {
                let health = entry.health();
                ServiceReport {
                    name: entry.descriptor.name.clone(),
                    url: entry.descriptor.origin().to_string(),
                    healthy: health.healthy,
                    last_checked: health.last_checked,
                    consecutive_failures: health.consecutive_failures,
                    last_error: health.last_error.clone(),
                    circuit_state: entry.breaker.state().as_str(),
                }
            })
            .collect()
    }

    pub fn all_healthy(&self) -> bool {
        self.services.values().all(|entry| entry.is_healthy())
    }

    /// Publish a probe result for `name`.
    pub fn record_probe(&self, name: &str, outcome: ProbeOutcome) -> Result<(), RegistryError> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;

        let previous = entry.health.load_full();
        let next = previous.next(&outcome, Utc::now());

        if previous.healthy != next.healthy {
            if next.healthy {
                tracing::info!(service = %name, "Service recovered");
            } else {
                tracing::warn!(
                    service = %name,
                    error = next.last_error.as_deref().unwrap_or_default(),
                    "Service marked unhealthy"
                );
            }
        }

        metrics::record_backend_health(name, next.healthy);
        entry.health.store(Arc::new(next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    fn registry() -> ServiceRegistry {
        let services = vec![
            ServiceConfig::new("jobs", "http://job-service:8002", 30),
            ServiceConfig::new("notifications", "http://notification-service:8003/", 15),
        ];
        ServiceRegistry::from_config(&services, &CircuitBreakerConfig::default()).unwrap()
    }

    #[test]
    fn test_one_entry_and_breaker_per_service() {
        let registry = registry();
        let entries = registry.entries();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.breaker.service(), entry.name());
            assert_eq!(entry.breaker.state(), CircuitState::Closed);
        }
        assert!(registry.all_healthy());
    }

    #[test]
    fn test_descriptor_defaults() {
        let entry = registry().get("notifications").unwrap();
        assert_eq!(entry.descriptor.origin(), "http://notification-service:8003");
        assert_eq!(entry.descriptor.upstream_prefix, "/notifications");
        assert_eq!(entry.descriptor.probe_url(), "http://notification-service:8003/health");
    }

    #[test]
    fn test_unknown_service() {
        assert_eq!(
            registry().healthy_target("billing").unwrap_err(),
            RegistryError::UnknownService("billing".into())
        );
    }

    #[test]
    fn test_unhealthy_service_is_unavailable_while_breaker_closed() {
        let registry = registry();
        registry
            .record_probe("jobs", ProbeOutcome::Unhealthy("timeout".into()))
            .unwrap();
        registry
            .record_probe("jobs", ProbeOutcome::Unhealthy("timeout".into()))
            .unwrap();

        assert_eq!(
            registry.healthy_target("jobs").unwrap_err(),
            RegistryError::Unavailable("jobs".into())
        );
        assert_eq!(registry.get("jobs").unwrap().breaker.state(), CircuitState::Closed);
        assert!(registry.healthy_target("notifications").is_ok());

        let report = registry.overall_status();
        let jobs = report.iter().find(|r| r.name == "jobs").unwrap();
        assert!(!jobs.healthy);
        assert_eq!(jobs.consecutive_failures, 2);
        assert_eq!(jobs.circuit_state, "closed");
        assert!(jobs.last_checked.is_some());

        registry.record_probe("jobs", ProbeOutcome::Healthy).unwrap();
        assert!(registry.healthy_target("jobs").is_ok());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let services = vec![ServiceConfig::new("jobs", "not a url", 30)];
        assert!(matches!(
            ServiceRegistry::from_config(&services, &CircuitBreakerConfig::default()),
            Err(RegistryError::InvalidUrl { .. })
        ));
    }
}
