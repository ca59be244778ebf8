//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one trial call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: counted failures >= failure_threshold
//! Open → Half-Open: recovery timeout elapsed and a call arrives
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (fresh recovery window)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency name (see `registry.rs`)
//! - Fail fast in Open state; the wrapped operation is never invoked
//! - Single trial call in Half-Open, admitted under the state lock
//! - Failures matching `expected_errors` are invisible to the breaker
//! - The lock is never held across an `.await`

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerSettings;
use crate::observability::metrics;

/// Longest recovery window a trip will schedule; longer configured timeouts are clamped.
const MAX_RECOVERY_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric code used for the state gauge.
    pub fn code(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Configuration for a single breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Counted failures that trip the breaker.
    pub failure_threshold: u32,
    /// Time spent Open before a trial call is admitted.
    pub recovery_timeout: Duration,
    /// Maximum gap between failures that still accumulate into one count.
    /// `None` keeps a plain cumulative counter.
    pub monitoring_period: Option<Duration>,
    /// Substrings marking failures that must not count against the dependency.
    pub expected_errors: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: settings.recovery_timeout(),
            monitoring_period: settings.monitoring_period(),
            expected_errors: settings.expected_errors.clone(),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call; the operation was not attempted.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String, retry_after: Duration },

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker, for admin endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    total_requests: u64,
    rejected_requests: u64,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    // Both set iff state == Open.
    next_attempt: Option<Instant>,
    next_attempt_time: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            rejected_requests: 0,
            last_failure: None,
            last_failure_time: None,
            next_attempt: None,
            next_attempt_time: None,
            trial_in_flight: false,
        }
    }
}

/// Guards one dependency by failing fast while it is known to be down.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed.code());
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` through the breaker.
    ///
    /// # Errors
    /// [`CircuitBreakerError::Open`] when the call was rejected without running,
    /// [`CircuitBreakerError::Inner`] carrying the operation's own failure otherwise.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                metrics::record_circuit_rejection(&self.name);
                tracing::debug!(breaker = %self.name, ?retry_after, "Call rejected by open circuit");
                return Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after,
                });
            }
        };

        match operation().await {
            Ok(value) => {
                admission.succeeded();
                Ok(value)
            }
            Err(e) => {
                admission.failed(&e.to_string());
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// Trip immediately with a fresh recovery window.
    pub fn force_open(&self) {
        let mut s = self.lock();
        self.trip(&mut s, Instant::now());
        tracing::warn!(breaker = %self.name, "Circuit breaker forced open");
    }

    /// Reset counters and close the breaker.
    pub fn force_close(&self) {
        let mut s = self.lock();
        *s = BreakerState::new();
        metrics::record_circuit_state(&self.name, CircuitState::Closed.code());
        tracing::info!(breaker = %self.name, "Circuit breaker forced closed");
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let s = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: s.state,
            failure_count: s.failure_count,
            success_count: s.success_count,
            total_requests: s.total_requests,
            rejected_requests: s.rejected_requests,
            last_failure_time: s.last_failure_time,
            next_attempt_time: s.next_attempt_time,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Critical sections never panic midway, so a poisoned lock still holds consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may run. `Err` carries the remaining wait.
    fn admit(&self) -> Result<Admission<'_>, Duration> {
        let now = Instant::now();
        let mut s = self.lock();

        match s.state {
            CircuitState::Closed => Ok(Admission::new(self, false)),
            CircuitState::Open => {
                let due = s.next_attempt.unwrap_or(now);
                if now < due {
                    s.rejected_requests += 1;
                    return Err(due - now);
                }
                s.state = CircuitState::HalfOpen;
                s.next_attempt = None;
                s.next_attempt_time = None;
                s.trial_in_flight = true;
                metrics::record_circuit_state(&self.name, CircuitState::HalfOpen.code());
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                Ok(Admission::new(self, true))
            }
            CircuitState::HalfOpen => {
                if s.trial_in_flight {
                    s.rejected_requests += 1;
                    Err(Duration::ZERO)
                } else {
                    s.trial_in_flight = true;
                    Ok(Admission::new(self, true))
                }
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut s = self.lock();
        s.success_count += 1;
        s.total_requests += 1;
        if trial {
            s.trial_in_flight = false;
        }

        if s.state == CircuitState::HalfOpen {
            s.state = CircuitState::Closed;
            s.failure_count = 0;
            s.next_attempt = None;
            s.next_attempt_time = None;
            s.trial_in_flight = false;
            metrics::record_circuit_state(&self.name, CircuitState::Closed.code());
            tracing::info!(breaker = %self.name, "Circuit breaker closed, dependency recovered");
        }
    }

    fn on_failure(&self, message: &str, trial: bool) {
        let now = Instant::now();
        let mut s = self.lock();
        s.total_requests += 1;
        if trial {
            s.trial_in_flight = false;
        }

        if self.is_expected(message) {
            tracing::debug!(breaker = %self.name, error = %message, "Expected error, not counted");
            return;
        }

        if let (Some(period), Some(last)) = (self.config.monitoring_period, s.last_failure) {
            if now.duration_since(last) > period {
                s.failure_count = 0;
            }
        }

        s.failure_count += 1;
        s.last_failure = Some(now);
        s.last_failure_time = Some(Utc::now());

        let should_trip = match s.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => s.failure_count >= u64::from(self.config.failure_threshold),
            // Already tripped by a concurrent call; keep its recovery window.
            CircuitState::Open => false,
        };

        if should_trip {
            self.trip(&mut s, now);
            tracing::warn!(
                breaker = %self.name,
                failures = s.failure_count,
                error = %message,
                recovery = ?self.config.recovery_timeout,
                "Circuit breaker opened"
            );
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn trip(&self, s: &mut BreakerState, now: Instant) {
        let window = self.config.recovery_timeout.min(MAX_RECOVERY_WINDOW);
        s.state = CircuitState::Open;
        s.next_attempt = Some(now + window);
        s.next_attempt_time = Some(wall_clock_after(window));
        s.trial_in_flight = false;
        metrics::record_circuit_state(&self.name, CircuitState::Open.code());
    }

    fn is_expected(&self, message: &str) -> bool {
        self.config
            .expected_errors
            .iter()
            .any(|expected| message.contains(expected.as_str()))
    }
}

/// Wall-clock time `delay` from now, saturating at the latest representable instant.
fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A call admitted by the breaker. Releases the trial slot if dropped unsettled,
/// which happens when the caller cancels the future mid-call.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn failed(mut self, message: &str) {
        self.settled = true;
        self.breaker.on_failure(message, self.trial);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}
