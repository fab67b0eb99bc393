//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (reject fast if open, admit one trial if half-open)
//!     → outbound call bounded by the service timeout (http::forwarder)
//!     → outcome recorded on the breaker (timeouts and connect errors count)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Nothing is retried here: fast, correct failure signalling only
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;

pub use circuit_breaker::{CallError, CircuitBreaker, CircuitState, Permit, TripsBreaker};
