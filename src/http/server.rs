//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: proxy routes, operational endpoints, admin API
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Run the probe loop alongside the listener
//! - Drain in-flight requests on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::Request;
use axum::response::Response;
use axum::routing::{get, MethodRouter};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::cache::SharedCache;
use crate::config::GatewayConfig;
use crate::health::HealthMonitor;
use crate::http::forwarder::Forwarder;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::registry::ServiceRegistry;
use crate::security::CredentialValidator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ServiceRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub validator: Arc<CredentialValidator>,
    pub cache: Arc<dyn SharedCache>,
    pub started_at: DateTime<Utc>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

/// The service segment; the remainder is taken undecoded from the request URI.
#[derive(Debug, Deserialize)]
struct ProxyPath {
    service: String,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();
        let prefix = config.listener.api_prefix.trim_end_matches('/');

        Router::new()
            .route(&format!("{prefix}/{{service}}"), proxy_methods())
            .route(&format!("{prefix}/{{service}}/{{*rest}}"), proxy_methods())
            .merge(admin::routes(state.clone()))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        make_request_span(request)
                    }))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The fully layered router, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then stop the probe loop.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            api_prefix = %self.state.config.listener.api_prefix,
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(self.state.registry.clone(), &self.state.config.health_check)
            .spawn(shutdown.child_token());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await;

        // Stop background work even when serving failed.
        shutdown.trigger();
        if let Err(e) = monitor.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn proxy_methods() -> MethodRouter<AppState> {
    get(proxy_handler)
        .post(proxy_handler)
        .put(proxy_handler)
        .delete(proxy_handler)
        .patch(proxy_handler)
}

/// Hand the request to the forwarding pipeline.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<ProxyPath>,
    request: Request<Body>,
) -> Response {
    state
        .forwarder
        .forward(request, &path.service, peer)
        .await
}
