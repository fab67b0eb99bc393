use std::collections::BTreeMap;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::forwarder::GATEWAY_VERSION;
use crate::http::response::GATEWAY_NAME;
use crate::http::server::AppState;
use crate::registry::ServiceReport;
use crate::security::AuthError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: i64,
    pub version: &'static str,
    /// Component name → healthy. The shared cache is listed as `cache`.
    pub services: BTreeMap<String, bool>,
}

#[derive(Serialize)]
pub struct GatewayStatus {
    pub gateway: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub cache_backend: &'static str,
    pub services: Vec<ServiceReport>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    /// Explicit TTL, never shorter than the token's remaining lifetime.
    /// Defaults to the remaining lifetime.
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
    pub ttl_secs: u64,
}

pub async fn root() -> Json<SystemStatus> {
    Json(SystemStatus {
        service: GATEWAY_NAME,
        version: GATEWAY_VERSION,
        status: "running",
    })
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let cache_healthy = match state.cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Cache ping failed");
            false
        }
    };

    let mut services: BTreeMap<String, bool> = state
        .registry
        .overall_status()
        .into_iter()
        .map(|report| (report.name, report.healthy))
        .collect();
    services.insert("cache".to_string(), cache_healthy);

    let healthy = services.values().all(|ok| *ok);
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" },
            timestamp: Utc::now().timestamp(),
            version: GATEWAY_VERSION,
            services,
        }),
    )
}

pub async fn readiness() -> Json<serde_json::Value> {
    Json(json!({ "status": "ready" }))
}

pub async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive" }))
}

pub async fn gateway_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(GatewayStatus {
        gateway: GATEWAY_NAME,
        version: GATEWAY_VERSION,
        started_at: state.started_at,
        cache_backend: state.cache.backend_name(),
        services: state.registry.overall_status(),
    })
}

pub async fn revoke(
    State(state): State<AppState>,
    Json(body): Json<RevokeRequest>,
) -> Result<Json<RevokeResponse>, (StatusCode, Json<serde_json::Value>)> {
    let result = match body.ttl_secs {
        Some(secs) => state
            .validator
            .revoke(&body.token, Duration::from_secs(secs.max(1)))
            .await
            .map(Some),
        None => state.validator.revoke_for_remaining_lifetime(&body.token).await,
    };

    match result {
        Ok(ttl) => Ok(Json(RevokeResponse {
            revoked: ttl.is_some(),
            ttl_secs: ttl.map_or(0, |t| t.as_secs()),
        })),
        Err(e @ (AuthError::InvalidToken(_) | AuthError::Expired)) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": e.to_string() })),
        )),
        Err(e) => {
            tracing::error!(error = %e, "Revocation failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Revocation list unavailable" })),
            ))
        }
    }
}
