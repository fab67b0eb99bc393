//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every service's health path
//! - Publish results to the registry

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use futures_util::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::HealthCheckConfig;
use crate::health::state::ProbeOutcome;
use crate::registry::{ServiceEntry, ServiceRegistry};

const PROBE_USER_AGENT: &str = "api-gateway-health-check";

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    client: Client<HttpConnector, Body>,
    enabled: bool,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, config: &HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry,
            client,
            enabled: config.enabled,
            interval: config.interval(),
        }
    }

    /// Run the probe loop on its own task until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    pub async fn run(self, token: CancellationToken) {
        if !self.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            services = self.registry.entries().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    // In-flight probes are dropped if shutdown arrives mid-cycle.
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = self.probe_all() => {}
                    }
                }
            }
        }

        tracing::info!("Health monitor stopped");
    }

    /// Probe every service once, concurrently.
    pub async fn probe_all(&self) {
        let entries = self.registry.entries();
        let outcomes = join_all(entries.iter().map(|entry| self.probe(entry))).await;

        for (entry, outcome) in entries.iter().zip(outcomes) {
            if let Err(e) = self.registry.record_probe(entry.name(), outcome) {
                tracing::error!(service = %entry.name(), error = %e, "Failed to record probe");
            }
        }
    }

    async fn probe(&self, entry: &ServiceEntry) -> ProbeOutcome {
        let url = entry.descriptor.probe_url();
        let request = match Request::builder()
            .method(Method::GET)
            .uri(&url)
            .header(header::USER_AGENT, PROBE_USER_AGENT)
            .body(Body::empty())
        {
            Ok(request) => request,
            Err(e) => return ProbeOutcome::Unhealthy(format!("invalid probe request: {e}")),
        };

        let timeout = entry.descriptor.timeout;
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(service = %entry.name(), status = %response.status(), "Probe succeeded");
                ProbeOutcome::Healthy
            }
            Ok(Ok(response)) => {
                tracing::warn!(service = %entry.name(), status = %response.status(), "Probe failed: non-success status");
                ProbeOutcome::Unhealthy(format!("status {}", response.status().as_u16()))
            }
            Ok(Err(e)) => {
                tracing::warn!(service = %entry.name(), error = %e, "Probe failed: connection error");
                ProbeOutcome::Unhealthy("connection error".to_string())
            }
            Err(_) => {
                tracing::warn!(service = %entry.name(), timeout_secs = timeout.as_secs(), "Probe failed: timeout");
                ProbeOutcome::Unhealthy("timeout".to_string())
            }
        }
    }
}
