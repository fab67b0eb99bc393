//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call after the open duration elapsed
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open; every transition happens under one mutex, so
//!   concurrent callers cannot both become the trial
//! - A trial abandoned mid-flight (caller went away) frees its slot on drop

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an operation error: does it mean the backend failed?
pub trait TripsBreaker {
    fn trips_breaker(&self) -> bool;
}

/// Outcome of a call that did not produce a value.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Rejected without attempting the operation.
    #[error("circuit open for {service}")]
    CircuitOpen { service: String },

    /// The operation ran and failed; counted against the breaker.
    #[error("upstream failure: {0}")]
    UpstreamFailure(E),

    /// The operation's own error; not a backend failure.
    #[error("{0}")]
    Operation(E),
}

#[derive(Debug)]
struct BreakerState {
    mode: CircuitState,
    consecutive_failures: u32,
    last_transition: Option<Instant>,
    trial_in_flight: bool,
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Per-service failure-counting state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    open_duration: Duration,
    state: Mutex<BreakerState>,
}

/// Permission to make one call. Report the outcome with
/// [`Permit::record_success`] or [`Permit::record_failure`]; dropping an
/// unreported trial permit returns the breaker to a state where the next
/// caller becomes the trial.
#[must_use = "report the call outcome on the permit"]
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    reported: bool,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            service: service.into(),
            failure_threshold: failure_threshold.max(1),
            open_duration,
            state: Mutex::new(BreakerState {
                mode: CircuitState::Closed,
                consecutive_failures: 0,
                last_transition: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn from_config(service: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(service, config.failure_threshold, config.open_duration())
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current mode, without triggering the Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().mode
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            state: state.mode,
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Ask to make a call. `None` means the circuit rejects it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = self.lock();
        let trial = match state.mode {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = state
                    .last_transition
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed <= self.open_duration {
                    return None;
                }
                self.transition(&mut state, CircuitState::HalfOpen);
                state.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    return None;
                }
                state.trial_in_flight = true;
                true
            }
        };
        drop(state);

        Some(Permit {
            breaker: self.clone(),
            trial,
            reported: false,
        })
    }

    /// Run `operation` under the breaker.
    pub async fn call<F, Fut, T, E>(self: &Arc<Self>, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: TripsBreaker,
    {
        let Some(permit) = self.try_acquire() else {
            tracing::debug!(service = %self.service, "Circuit open, rejecting call");
            return Err(CallError::CircuitOpen {
                service: self.service.clone(),
            });
        };

        match operation().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(e) if e.trips_breaker() => {
                permit.record_failure();
                Err(CallError::UpstreamFailure(e))
            }
            Err(e) => {
                // Not a verdict on the backend: neither success nor failure.
                permit.release();
                Err(CallError::Operation(e))
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut state = self.lock();
        match state.mode {
            CircuitState::Closed => state.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                state.consecutive_failures = 0;
                state.trial_in_flight = false;
                self.transition(&mut state, CircuitState::Closed);
            }
            // A call admitted before the circuit opened says nothing about now.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut state = self.lock();
        match state.mode {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                state.last_transition = Some(Instant::now());
                if state.consecutive_failures >= self.failure_threshold {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                state.consecutive_failures = self.failure_threshold;
                state.trial_in_flight = false;
                self.transition(&mut state, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn on_release(&self, trial: bool) {
        if trial {
            let mut state = self.lock();
            if state.mode == CircuitState::HalfOpen {
                state.trial_in_flight = false;
            }
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.mode;
        state.mode = to;
        state.last_transition = Some(Instant::now());

        match to {
            CircuitState::Open => tracing::warn!(
                service = %self.service,
                from = %from,
                failures = state.consecutive_failures,
                open_secs = self.open_duration.as_secs(),
                "Circuit breaker opened"
            ),
            _ => tracing::info!(service = %self.service, from = %from, to = %to, "Circuit breaker transition"),
        }
        metrics::record_circuit_state(&self.service, to);
    }
}

impl Permit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.trial);
    }

    pub fn record_failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.trial);
    }

    /// Give the permit back without a verdict.
    pub fn release(mut self) {
        self.reported = true;
        self.breaker.on_release(self.trial);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_release(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Boom {
        counts: bool,
    }

    impl TripsBreaker for Boom {
        fn trips_breaker(&self) -> bool {
            self.counts
        }
    }

    fn breaker(threshold: u32, open_secs: u64) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("x", threshold, Duration::from_secs(open_secs)))
    }

    async fn fail(cb: &Arc<CircuitBreaker>, attempts: &AtomicU32) -> Result<(), CallError<Boom>> {
        cb.call(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Boom { counts: true })
        })
        .await
    }

    async fn succeed(cb: &Arc<CircuitBreaker>, attempts: &AtomicU32) -> Result<(), CallError<Boom>> {
        cb.call(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_rejects_without_attempt() {
        let cb = breaker(3, 30);
        let attempts = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(matches!(fail(&cb, &attempts).await, Err(CallError::UpstreamFailure(_))));
        }
        assert_eq!(cb.state(), CircuitState::Open);

        for _ in 0..10 {
            assert!(matches!(fail(&cb, &attempts).await, Err(CallError::CircuitOpen { .. })));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 30);
        let attempts = AtomicU32::new(0);

        let _ = fail(&cb, &attempts).await;
        let _ = fail(&cb, &attempts).await;
        succeed(&cb, &attempts).await.unwrap();
        let _ = fail(&cb, &attempts).await;
        let _ = fail(&cb, &attempts).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_for_open_duration() {
        let cb = breaker(1, 30);
        let attempts = AtomicU32::new(0);
        let _ = fail(&cb, &attempts).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.try_acquire().is_none());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(2)).await;
        let permit = cb.try_acquire().expect("trial permit");
        assert!(permit.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        permit.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_half_open_trial() {
        let cb = breaker(1, 5);
        let attempts = AtomicU32::new(0);
        let _ = fail(&cb, &attempts).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let first = cb.try_acquire();
        let second = cb.try_acquire();
        assert!(first.is_some());
        assert!(second.is_none());

        // Still rejected while the trial is outstanding.
        assert!(matches!(succeed(&cb, &attempts).await, Err(CallError::CircuitOpen { .. })));
        drop(first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_race_for_trial() {
        let cb = breaker(1, 5);
        let attempts = Arc::new(AtomicU32::new(0));
        let _ = fail(&cb, &attempts).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cb = cb.clone();
            let attempts = attempts.clone();
            handles.push(tokio::spawn(async move {
                cb.call(|| async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, Boom>(())
                })
                .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens() {
        let cb = breaker(2, 5);
        let attempts = AtomicU32::new(0);
        let _ = fail(&cb, &attempts).await;
        let _ = fail(&cb, &attempts).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(fail(&cb, &attempts).await, Err(CallError::UpstreamFailure(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().consecutive_failures, 2);

        // The open period restarts from the failed trial.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cb.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_frees_slot() {
        let cb = breaker(1, 5);
        let attempts = AtomicU32::new(0);
        let _ = fail(&cb, &attempts).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let trial = cb.try_acquire().unwrap();
        drop(trial);

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let next = cb.try_acquire().expect("slot released");
        assert!(next.is_trial());
        next.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_errors_do_not_count() {
        let cb = breaker(1, 5);
        let result = cb
            .call(|| async { Err::<(), _>(Boom { counts: false }) })
            .await;

        assert!(matches!(result, Err(CallError::Operation(_))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_open_circuit() {
        let cb = breaker(1, 5);
        let slow = cb.try_acquire().unwrap();
        let failing = cb.try_acquire().unwrap();

        failing.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        slow.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
