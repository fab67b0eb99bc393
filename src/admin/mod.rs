//! Operational endpoints and the admin API.
//!
//! `/`, `/health`, `/readiness`, `/liveness` and `/gateway/status` are open.
//! `/admin/*` is mounted only when the admin API is enabled and requires the
//! admin API key as a bearer credential.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/readiness", get(readiness))
        .route("/liveness", get(liveness))
        .route("/gateway/status", get(gateway_status));

    if !state.config.admin.enabled {
        return open;
    }

    let admin = Router::new()
        .route("/admin/revoke", post(revoke))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    open.merge(admin)
}
