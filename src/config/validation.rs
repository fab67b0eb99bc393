//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0)
//! - Check that service names are unique and addresses parse
//! - Check that the signing algorithm has matching key material
//! - Check that the inbound request timeout outlasts every service timeout,
//!   so upstream timeouts surface as gateway errors and reach the breaker
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no services configured")]
    NoServices,

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("invalid service name {0:?}: must be a single non-empty path segment")]
    InvalidServiceName(String),

    #[error("service {service}: invalid url {url:?}")]
    InvalidServiceUrl { service: String, url: String },

    #[error("service {0}: timeout must be greater than zero")]
    ZeroServiceTimeout(String),

    #[error("service {0}: rate_limit_requests must be greater than zero")]
    ZeroServiceRateLimit(String),

    #[error(
        "timeouts.request_secs ({request_secs}) must be greater than service {service}'s timeout ({service_timeout_secs})"
    )]
    RequestTimeoutTooShort {
        request_secs: u64,
        service: String,
        service_timeout_secs: u64,
    },

    #[error("api prefix {0:?} must start with '/' and not end with '/'")]
    InvalidApiPrefix(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("algorithm {0} requires auth.public_key_pem")]
    MissingPublicKey(String),

    #[error("auth.secret_key must not be empty")]
    EmptySecret,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let prefix = &config.listener.api_prefix;
    if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
        errors.push(ValidationError::InvalidApiPrefix(prefix.clone()));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::NoServices);
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        if service.name.is_empty() || service.name.contains('/') {
            errors.push(ValidationError::InvalidServiceName(service.name.clone()));
        }
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        let parsed = Url::parse(&service.url);
        if !matches!(&parsed, Ok(url) if url.scheme() == "http" && url.host().is_some()) {
            errors.push(ValidationError::InvalidServiceUrl {
                service: service.name.clone(),
                url: service.url.clone(),
            });
        }
        if service.timeout_secs == 0 {
            errors.push(ValidationError::ZeroServiceTimeout(service.name.clone()));
        }
        if service.rate_limit_requests == Some(0) {
            errors.push(ValidationError::ZeroServiceRateLimit(service.name.clone()));
        }
        if config.timeouts.request_secs <= service.timeout_secs {
            errors.push(ValidationError::RequestTimeoutTooShort {
                request_secs: config.timeouts.request_secs,
                service: service.name.clone(),
                service_timeout_secs: service.timeout_secs,
            });
        }
    }

    let positive: [(&'static str, u64); 5] = [
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.requests_per_window", config.rate_limit.requests_per_window),
        ("circuit_breaker.failure_threshold", u64::from(config.circuit_breaker.failure_threshold)),
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("cache.operation_timeout_ms", config.cache.operation_timeout_ms),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(name));
        }
    }

    match Algorithm::from_str(&config.auth.algorithm) {
        Ok(Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
            if config.auth.secret_key.is_empty() {
                errors.push(ValidationError::EmptySecret);
            }
        }
        Ok(_) => {
            if config.auth.public_key_pem.is_none() {
                errors.push(ValidationError::MissingPublicKey(config.auth.algorithm.clone()));
            }
        }
        Err(_) => errors.push(ValidationError::UnsupportedAlgorithm(config.auth.algorithm.clone())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
