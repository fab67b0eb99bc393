//! Backend health state.
//!
//! # States
//! - Healthy: service receives traffic
//! - Unhealthy: requests are rejected before any outbound attempt
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: a probe fails (error status, connection error, timeout)
//! Unhealthy → Healthy: a probe returns 2xx
//! ```
//!
//! # Design Decisions
//! - Services start healthy so traffic flows before the first probe completes
//! - Values are immutable; each probe produces a new one that is swapped in

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub service: String,
    pub healthy: bool,
    /// Absent until the first probe completes.
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl HealthStatus {
    pub fn initial(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            healthy: true,
            last_checked: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Status after applying `outcome` observed at `at`.
    pub fn next(&self, outcome: &ProbeOutcome, at: DateTime<Utc>) -> Self {
        match outcome {
            ProbeOutcome::Healthy => Self {
                service: self.service.clone(),
                healthy: true,
                last_checked: Some(at),
                consecutive_failures: 0,
                last_error: None,
            },
            ProbeOutcome::Unhealthy(reason) => Self {
                service: self.service.clone(),
                healthy: false,
                last_checked: Some(at),
                consecutive_failures: self.consecutive_failures.saturating_add(1),
                last_error: Some(reason.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_healthy_and_unchecked() {
        let status = HealthStatus::initial("jobs");
        assert!(status.healthy);
        assert!(status.last_checked.is_none());
    }

    #[test]
    fn test_failures_accumulate_and_reset() {
        let now = Utc::now();
        let down = HealthStatus::initial("jobs")
            .next(&ProbeOutcome::Unhealthy("timeout".into()), now)
            .next(&ProbeOutcome::Unhealthy("timeout".into()), now);
        assert!(!down.healthy);
        assert_eq!(down.consecutive_failures, 2);
        assert_eq!(down.last_error.as_deref(), Some("timeout"));

        let up = down.next(&ProbeOutcome::Healthy, now);
        assert!(up.healthy);
        assert_eq!(up.consecutive_failures, 0);
        assert!(up.last_error.is_none());
        assert_eq!(up.last_checked, Some(now));
    }
}
