//! Request forwarding pipeline.
//!
//! # Data Flow
//! ```text
//! resolve    → route table (404 for unknown services)
//! auth       → bearer credential (required or opportunistic)
//! rate-limit → fixed window per identity
//! routing    → registry health gate
//! upstream   → breaker-wrapped call with the service timeout
//! relay      → backend status, headers and streamed body
//! ```
//!
//! # Design Decisions
//! - Stages run in a fixed order; the first error ends the request
//! - Only transport errors and timeouts count against the breaker; a 5xx
//!   from the backend is relayed as-is
//! - Nothing is retried

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time;

use crate::error::{GatewayError, Stage};
use crate::http::request::RequestIdExt;
use crate::http::response::{apply_rate_headers, finalize};
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceEntry, ServiceRegistry};
use crate::resilience::{CallError, TripsBreaker};
use crate::routing::{AuthPolicy, RouteMatch, RouteTable};
use crate::security::auth::{bearer_token, AuthError};
use crate::security::headers::{prepare_upstream_headers, strip_hop_by_hop, ForwardingContext};
use crate::security::{ClientIdentity, CredentialValidator, RateDecision, RateLimiter, RateScope};

pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported when the revocation list cannot be reached.
const REVOCATION_LIST: &str = "revocation-list";

/// The listener only speaks plain HTTP, so `X-Forwarded-Proto` is fixed.
/// Inbound request URIs carry no scheme to read it from.
const FORWARDED_PROTO: &str = "http";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TripsBreaker for UpstreamError {
    fn trips_breaker(&self) -> bool {
        match self {
            UpstreamError::Transport(_) | UpstreamError::Timeout(_) => true,
        }
    }
}

/// What the pipeline has learned about a request so far.
#[derive(Debug)]
struct RequestContext {
    request_id: String,
    method: Method,
    path: String,
    peer: SocketAddr,
    client: Option<ClientIdentity>,
    rate: Option<RateDecision>,
}

pub struct Forwarder {
    /// API prefix without a trailing slash; empty when mounted at `/`.
    api_prefix: String,
    routes: RouteTable,
    registry: Arc<ServiceRegistry>,
    validator: Arc<CredentialValidator>,
    limiter: Arc<RateLimiter>,
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new(
        api_prefix: &str,
        registry: Arc<ServiceRegistry>,
        validator: Arc<CredentialValidator>,
        limiter: Arc<RateLimiter>,
        connect_timeout: Duration,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let descriptors: Vec<_> = registry
            .entries()
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect();

        Self {
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
            routes: RouteTable::from_descriptors(&descriptors),
            registry,
            validator,
            limiter,
            client,
        }
    }

    /// Run `request` for `service` through every stage and produce the response.
    pub async fn forward(&self, request: Request<Body>, service: &str, peer: SocketAddr) -> Response {
        let start = Instant::now();
        let mut ctx = RequestContext {
            request_id: request.request_id().to_string(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            peer,
            client: None,
            rate: None,
        };

        let mut response = match self.pipeline(request, service, &mut ctx).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    service = %service,
                    stage = %e.stage(),
                    error = %e,
                    "Request rejected"
                );
                e.into_response()
            }
        };

        if let Some(decision) = &ctx.rate {
            apply_rate_headers(response.headers_mut(), decision);
        }

        let status = response.status();
        metrics::record_request(ctx.method.as_str(), status.as_u16(), service, start);
        tracing::info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            service = %service,
            client = %ctx.client.as_ref().map(|c| c.to_string()).unwrap_or_default(),
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );

        finalize(response, start)
    }

    async fn pipeline(
        &self,
        request: Request<Body>,
        service: &str,
        ctx: &mut RequestContext,
    ) -> Result<Response, GatewayError> {
        // The path is forwarded exactly as received, percent-encoding included.
        let rest = raw_remainder(request.uri().path(), &self.api_prefix)
            .ok_or_else(|| GatewayError::NotFound(service.to_string()))?;
        let route = self
            .routes
            .resolve(service, rest)
            .ok_or_else(|| GatewayError::NotFound(service.to_string()))?;

        let client = self.authenticate(request.headers(), &route, ctx.peer).await?;
        ctx.client = Some(client.clone());

        let scope = match route.rate_limit {
            Some(limit) => RateScope::Service {
                name: &route.service,
                limit,
            },
            None => RateScope::Global,
        };
        let decision = self.limiter.admit(&client, scope).await.into_result()?;
        ctx.rate = Some(decision);

        let entry = self.registry.healthy_target(&route.service).map_err(|e| match e {
            RegistryError::UnknownService(name) => GatewayError::NotFound(name),
            RegistryError::Unavailable(name) => GatewayError::ServiceUnavailable {
                service: name,
                stage: Stage::Routing,
            },
            other => GatewayError::Internal(other.to_string()),
        })?;

        self.call_upstream(request, &entry, &route, &client, ctx).await
    }

    async fn authenticate(
        &self,
        headers: &HeaderMap,
        route: &RouteMatch,
        peer: SocketAddr,
    ) -> Result<ClientIdentity, GatewayError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        let Some(token) = token else {
            return match route.auth {
                AuthPolicy::Optional => Ok(ClientIdentity::Address(peer.ip())),
                AuthPolicy::Required => {
                    metrics::record_auth_failure(AuthError::Missing.reason());
                    Err(GatewayError::Unauthorized("Authentication required".to_string()))
                }
            };
        };

        match self.validator.validate(token).await {
            Ok(identity) => Ok(ClientIdentity::User(identity)),
            Err(e) if route.auth == AuthPolicy::Optional => {
                tracing::debug!(error = %e, "Ignoring unusable credential on public route");
                Ok(ClientIdentity::Address(peer.ip()))
            }
            Err(AuthError::RevocationCheck(e)) => {
                tracing::error!(error = %e, "Revocation list unavailable");
                metrics::record_auth_failure("cache_error");
                Err(GatewayError::ServiceUnavailable {
                    service: REVOCATION_LIST.to_string(),
                    stage: Stage::Auth,
                })
            }
            Err(e) => {
                metrics::record_auth_failure(e.reason());
                Err(GatewayError::Unauthorized("Invalid or expired token".to_string()))
            }
        }
    }

    async fn call_upstream(
        &self,
        request: Request<Body>,
        entry: &ServiceEntry,
        route: &RouteMatch,
        client: &ClientIdentity,
        ctx: &RequestContext,
    ) -> Result<Response, GatewayError> {
        let descriptor = &entry.descriptor;
        let uri = upstream_uri(descriptor.origin(), &route.upstream_path, request.uri().query())
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        let (mut parts, body) = request.into_parts();
        prepare_upstream_headers(
            &mut parts.headers,
            &ForwardingContext {
                client_ip: ctx.peer.ip(),
                scheme: FORWARDED_PROTO,
                gateway_version: GATEWAY_VERSION,
                request_id: &ctx.request_id,
                identity: client.identity(),
            },
        );

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = parts.headers;

        tracing::debug!(
            request_id = %ctx.request_id,
            service = %descriptor.name,
            upstream_path = %route.upstream_path,
            "Forwarding request"
        );

        let timeout = descriptor.timeout;
        let http = self.client.clone();
        let result = entry
            .breaker
            .call(|| async move {
                match time::timeout(timeout, http.request(outbound)).await {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(UpstreamError::Transport(e)),
                    Err(_) => Err(UpstreamError::Timeout(timeout)),
                }
            })
            .await;

        match result {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(CallError::CircuitOpen { service }) => Err(GatewayError::ServiceUnavailable {
                service,
                stage: Stage::Upstream,
            }),
            Err(CallError::UpstreamFailure(e)) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    service = %descriptor.name,
                    error = %e,
                    "Upstream call failed"
                );
                Err(GatewayError::BadGateway {
                    service: descriptor.name.clone(),
                })
            }
            Err(CallError::Operation(e)) => Err(GatewayError::Internal(e.to_string())),
        }
    }
}

/// The still-encoded path after `{api_prefix}/{service}`, without its leading slash.
fn raw_remainder<'a>(path: &'a str, api_prefix: &str) -> Option<&'a str> {
    let after_prefix = path.strip_prefix(api_prefix)?.strip_prefix('/')?;
    Some(after_prefix.split_once('/').map_or("", |(_, rest)| rest))
}

fn upstream_uri(origin: &str, path: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
    match query {
        Some(q) if !q.is_empty() => format!("{origin}{path}?{q}").parse(),
        _ => format!("{origin}{path}").parse(),
    }
}
