//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, `GATEWAY_*`
//! environment variables.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{CacheBackend, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

const ENV_PREFIX: &str = "GATEWAY_";
const SERVICE_PREFIX: &str = "GATEWAY_SERVICE_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration.
///
/// Without a file the default deployment's services are used.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::with_default_services(),
    };

    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `GATEWAY_*` variables onto `config`.
///
/// Service variables (`GATEWAY_SERVICE_<NAME>_URL`, `_HEALTH_PATH`,
/// `_TIMEOUT_SECS`, `_RATE_LIMIT_REQUESTS`) only apply to services that already exist; the name is
/// matched case-insensitively with `-` written as `_`.
pub fn apply_env_overrides<I>(config: &mut GatewayConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(rest) = key.strip_prefix(SERVICE_PREFIX) {
            apply_service_override(config, &key, rest, value)?;
            continue;
        }

        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match name {
            "BIND_ADDRESS" => config.listener.bind_address = value,
            "API_PREFIX" => config.listener.api_prefix = value,
            "REDIS_URL" => config.cache.redis_url = value,
            "CACHE_BACKEND" => {
                config.cache.backend = match value.to_ascii_lowercase().as_str() {
                    "redis" => CacheBackend::Redis,
                    "memory" => CacheBackend::Memory,
                    _ => return Err(ConfigError::InvalidEnv { key: key.clone(), value }),
                }
            }
            "SECRET_KEY" => config.auth.secret_key = value,
            "PUBLIC_KEY_PEM" => config.auth.public_key_pem = Some(value),
            "JWT_ALGORITHM" => config.auth.algorithm = value,
            "RATE_LIMIT_REQUESTS" => config.rate_limit.requests_per_window = parse(&key, value)?,
            "RATE_LIMIT_WINDOW_SECS" => config.rate_limit.window_secs = parse(&key, value)?,
            "RATE_LIMIT_ENABLED" => config.rate_limit.enabled = parse(&key, value)?,
            "CIRCUIT_BREAKER_FAILURE_THRESHOLD" => {
                config.circuit_breaker.failure_threshold = parse(&key, value)?
            }
            "CIRCUIT_BREAKER_OPEN_SECS" => config.circuit_breaker.open_secs = parse(&key, value)?,
            "HEALTH_CHECK_INTERVAL_SECS" => config.health_check.interval_secs = parse(&key, value)?,
            "HEALTH_CHECK_ENABLED" => config.health_check.enabled = parse(&key, value)?,
            "LOG_LEVEL" => config.observability.log_level = value,
            "METRICS_ENABLED" => config.observability.metrics_enabled = parse(&key, value)?,
            "ADMIN_API_KEY" => {
                config.admin.api_key = value;
                config.admin.enabled = true;
            }
            _ => {}
        }
    }

    Ok(())
}

fn apply_service_override(
    config: &mut GatewayConfig,
    key: &str,
    rest: &str,
    value: String,
) -> Result<(), ConfigError> {
    const FIELDS: [&str; 4] = ["_HEALTH_PATH", "_TIMEOUT_SECS", "_RATE_LIMIT_REQUESTS", "_URL"];

    let Some((service_key, field)) = FIELDS
        .iter()
        .find_map(|field| rest.strip_suffix(*field).map(|name| (name, *field)))
    else {
        return Ok(());
    };

    let Some(service) = config
        .services
        .iter_mut()
        .find(|s| s.name.replace('-', "_").eq_ignore_ascii_case(service_key))
    else {
        tracing::debug!(variable = %key, "Ignoring override for unknown service");
        return Ok(());
    };

    match field {
        "_URL" => service.url = value,
        "_HEALTH_PATH" => service.health_path = value,
        "_RATE_LIMIT_REQUESTS" => service.rate_limit_requests = Some(parse(key, value)?),
        _ => service.timeout_secs = parse(key, value)?,
    }

    Ok(())
}

fn parse<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value,
    })
}
