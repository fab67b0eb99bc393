//! Response handling.
//!
//! # Responsibilities
//! - Map gateway errors to status codes and JSON bodies
//! - Add rate-limit, process-time and gateway marker headers
//!
//! # Design Decisions
//! - Error bodies are `{"detail": ..., "stage": ...}` and never carry
//!   internal addresses
//! - Backend responses are streamed, never buffered

use std::time::Instant;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;
use crate::security::RateDecision;

pub const X_PROCESS_TIME: &str = "x-process-time";
pub const X_GATEWAY: &str = "x-gateway";
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Value of the `X-Gateway` marker header.
pub const GATEWAY_NAME: &str = "api-gateway";

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "detail": self.to_string(),
            "stage": self.stage().as_str(),
        }));
        let mut response = (self.status_code(), body).into_response();

        let headers = response.headers_mut();
        match &self {
            GatewayError::Unauthorized(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::TooManyRequests {
                limit,
                retry_after_secs,
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(*limit));
                headers.insert(HeaderName::from_static(X_RATELIMIT_REMAINING), HeaderValue::from(0u64));
            }
            _ => {}
        }

        response
    }
}

/// Advertise the caller's remaining budget.
pub fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(decision.limit));
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(decision.remaining),
    );
}

/// Stamp headers every gateway response carries.
pub fn finalize(mut response: Response, start: Instant) -> Response {
    let elapsed = format!("{:.6}", start.elapsed().as_secs_f64());
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        headers.insert(HeaderName::from_static(X_PROCESS_TIME), value);
    }
    headers.insert(HeaderName::from_static(X_GATEWAY), HeaderValue::from_static(GATEWAY_NAME));
    response
}
