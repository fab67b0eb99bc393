//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route table)
//!     → request.rs (request id, tracing span)
//!     → forwarder.rs (auth → rate-limit → routing → upstream → relay)
//!     → response.rs (error mapping, gateway headers)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{Forwarder, UpstreamError, GATEWAY_VERSION};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
