//! API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                       API GATEWAY                         │
//!                     │                                                           │
//!   Client Request    │  ┌────────┐   ┌────────┐   ┌────────────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│  http  │──▶│  auth  │──▶│ rate_limit │──▶│ registry │  │
//!                     │  │ server │   │ (JWT)  │   │  (cache)   │   │ (health) │  │
//!                     │  └────────┘   └────────┘   └────────────┘   └────┬─────┘  │
//!                     │                                                  │        │
//!                     │                                                  ▼        │
//!   Client Response   │  ┌──────────┐                            ┌──────────────┐ │
//!   ◀─────────────────┼──│ response │◀───────────────────────────│   circuit    │─┼──▶ Backend
//!                     │  │ headers  │                            │   breaker    │ │    Service
//!                     │  └──────────┘                            └──────────────┘ │
//!                     │                                                           │
//!                     │  Background: health monitor probes every service          │
//!                     │  Shared: cache (Redis or in-process) for counters and     │
//!                     │          revoked credentials                              │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use api_gateway::config::loader::load_config;
use api_gateway::lifecycle::signals::spawn_signal_handler;
use api_gateway::lifecycle::startup::{build_state, connect_cache, StartupError};
use api_gateway::observability::{logging, metrics};
use api_gateway::{GatewayServer, Shutdown};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "API gateway traffic core")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        api_prefix = %config.listener.api_prefix,
        services = config.services.len(),
        cache_backend = ?config.cache.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: std::net::SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e| StartupError::Metrics(format!("{}: {e}", config.observability.metrics_address)))?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let cache = connect_cache(&config.cache).await?;

    let bind_address = config.listener.bind_address.clone();
    let state = build_state(config, cache)?;

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: bind_address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    GatewayServer::new(state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
