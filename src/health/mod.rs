//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every service concurrently
//!     → ServiceRegistry::record_probe
//!     → state.rs value swapped in
//!
//! Request path:
//!     ServiceRegistry::healthy_target reads the current state.rs value
//! ```
//!
//! # Design Decisions
//! - Probe failures only change health; they never reach a caller
//! - Health and the circuit breaker are independent gates

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthStatus, ProbeOutcome};
