//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! /{api_prefix}/{service}/{rest}
//!     → router.rs (service lookup, upstream path)
//!     → matcher.rs (public path check → auth policy)
//!     → Return: RouteMatch or no-match (404)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup from the service descriptors, immutable at runtime
//! - No regex in hot path (prefix matching only)

pub mod matcher;
pub mod router;

pub use router::{AuthPolicy, RouteMatch, RouteTable};
