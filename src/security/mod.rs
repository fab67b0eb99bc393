//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (bearer credential, revocation list)
//!     → identity.rs (subject or client address)
//!     → rate_limit.rs (fixed window per identity)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-* and identity)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - Caller-supplied identity headers are never trusted
//! - Credential checks fail closed; the rate limiter's cache policy is configurable

pub mod auth;
pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use auth::{AuthError, Claims, CredentialValidator};
pub use identity::{ClientIdentity, Identity};
pub use rate_limit::{RateDecision, RateLimiter, RateScope};
