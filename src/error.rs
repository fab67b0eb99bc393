//! Client-facing error taxonomy.
//!
//! Every failure the gateway itself produces is one of these variants. The
//! HTTP mapping lives in `http::response`.

use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced a failure, reported in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Auth,
    RateLimit,
    Routing,
    Upstream,
    Internal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::RateLimit => "rate-limit",
            Stage::Routing => "routing",
            Stage::Upstream => "upstream",
            Stage::Internal => "internal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, invalid, expired or revoked credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Window ceiling exceeded.
    #[error("Rate limit exceeded. Please try again later.")]
    TooManyRequests { limit: u64, retry_after_secs: u64 },

    /// Unhealthy backend, open circuit, or an unavailable dependency.
    #[error("Service {service} is unavailable")]
    ServiceUnavailable { service: String, stage: Stage },

    /// The backend was tried and failed or timed out.
    #[error("Failed to communicate with {service} service")]
    BadGateway { service: String },

    /// No service is registered under the requested name.
    #[error("Service {0} not found")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    pub fn stage(&self) -> Stage {
        match self {
            GatewayError::Unauthorized(_) => Stage::Auth,
            GatewayError::TooManyRequests { .. } => Stage::RateLimit,
            GatewayError::ServiceUnavailable { stage, .. } => *stage,
            GatewayError::BadGateway { .. } => Stage::Upstream,
            GatewayError::NotFound(_) => Stage::Routing,
            GatewayError::Internal(_) => Stage::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_do_not_leak_internal_detail() {
        let err = GatewayError::Internal("pool exhausted at 10.0.0.3".into());
        assert_eq!(err.to_string(), "Internal server error");
        assert_eq!(err.stage(), Stage::Internal);
    }

    #[test]
    fn test_unavailable_keeps_its_stage() {
        let err = GatewayError::ServiceUnavailable {
            service: "jobs".into(),
            stage: Stage::Upstream,
        };
        assert_eq!(err.stage().as_str(), "upstream");
        assert_eq!(err.to_string(), "Service jobs is unavailable");
    }
}
