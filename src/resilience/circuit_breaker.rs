//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, operations execute
//! - Open: dependency assumed down, calls fail fast without running the operation
//! - Half-Open: a single trial call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: first call after reset timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Fail fast in Open state (operation never invoked)
//! - Single trial in Half-Open (prevents hammering recovering dependency)
//! - State lives behind one mutex per breaker; it is never held across an await
//! - Transitions are published on a broadcast channel

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Predicate classifying an error as expected (not counted toward the threshold).
pub type ExpectedErrors = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// State transition notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerEvent {
    /// Threshold crossed or trial failed; carries the triggering error.
    Opened { name: String, error: String },
    HalfOpen { name: String },
    Closed { name: String },
    ForceOpened { name: String },
    ForceClosed { name: String },
}

impl BreakerEvent {
    pub fn name(&self) -> &str {
        match self {
            BreakerEvent::Opened { name, .. }
            | BreakerEvent::HalfOpen { name }
            | BreakerEvent::Closed { name }
            | BreakerEvent::ForceOpened { name }
            | BreakerEvent::ForceClosed { name } => name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BreakerEvent::Opened { .. } => "opened",
            BreakerEvent::HalfOpen { .. } => "half_open",
            BreakerEvent::Closed { .. } => "closed",
            BreakerEvent::ForceOpened { .. } => "force_opened",
            BreakerEvent::ForceClosed { .. } => "force_closed",
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit breaker for '{name}' is open")]
    Open { name: String },
    /// The operation ran and failed; the original error is preserved.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker. Taking one never mutates the breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Configured stats window.
    pub monitoring_period_ms: u64,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    rejected_requests: u64,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
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
            last_failure_at: None,
            trial_in_flight: false,
        }
    }

    fn mark_failure_time(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.last_failure_at = Some(Utc::now());
    }
}

/// Whether a permitted call is the half-open trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// Releases the half-open trial slot if the trial is dropped or unwinds before it settles.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

/// Per-dependency failure detector wrapping fallible operations.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    monitoring_period: Duration,
    expected_errors: Option<ExpectedErrors>,
    inner: Mutex<BreakerState>,
    events: broadcast::Sender<BreakerEvent>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker in the CLOSED state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            monitoring_period: config.monitoring_period(),
            expected_errors: None,
            inner: Mutex::new(BreakerState::new()),
            events,
        }
    }

    /// Classify some errors as expected: they are recorded but never count toward opening.
    pub fn with_expected_errors(
        mut self,
        predicate: impl Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.expected_errors = Some(Arc::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Subscribe to state transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Run an async operation under the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let permit = self.acquire::<E>()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: permit == Permit::Trial,
        };
        let result = operation().await;
        guard.armed = false;
        match result {
            Ok(value) => {
                self.on_success(permit);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(permit, &e);
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Run a synchronous operation under the breaker.
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        let permit = self.acquire::<E>()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: permit == Permit::Trial,
        };
        let result = operation();
        guard.armed = false;
        match result {
            Ok(value) => {
                self.on_success(permit);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(permit, &e);
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            rejected_requests: inner.rejected_requests,
            last_failure_time: inner.last_failure_at,
            monitoring_period_ms: self.monitoring_period.as_millis() as u64,
        }
    }

    /// Force CLOSED with zeroed counters.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            *inner = BreakerState::new();
        }
        tracing::info!(name = %self.name, "Circuit breaker reset");
        self.emit(BreakerEvent::Closed { name: self.name.clone() });
    }

    /// Operational override: open the circuit without counting failures.
    pub fn force_open(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            inner.mark_failure_time(Instant::now());
        }
        tracing::warn!(name = %self.name, "Circuit breaker forced open");
        self.emit(BreakerEvent::ForceOpened { name: self.name.clone() });
    }

    /// Operational override: close the circuit and clear the failure streak.
    pub fn force_closed(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
        }
        tracing::info!(name = %self.name, "Circuit breaker forced closed");
        self.emit(BreakerEvent::ForceClosed { name: self.name.clone() });
    }

    fn acquire<E>(&self) -> Result<Permit, BreakerError<E>> {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;

        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::Open => {
                let elapsed = inner.last_failure.map(|t| t.elapsed());
                if elapsed.map_or(true, |e| e >= self.reset_timeout) {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    drop(inner);
                    tracing::info!(name = %self.name, "Circuit breaker OPEN -> HALF_OPEN");
                    self.emit(BreakerEvent::HalfOpen { name: self.name.clone() });
                    Ok(Permit::Trial)
                } else {
                    inner.rejected_requests += 1;
                    Err(BreakerError::Open { name: self.name.clone() })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.rejected_requests += 1;
                    Err(BreakerError::Open { name: self.name.clone() })
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit::Trial)
                }
            }
        }
    }

    fn on_success(&self, permit: Permit) {
        let closed = {
            let mut inner = self.inner.lock();
            inner.success_count += 1;
            match (permit, inner.state) {
                (Permit::Trial, CircuitState::HalfOpen) => {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.trial_in_flight = false;
                    true
                }
                (Permit::Normal, CircuitState::Closed) => {
                    inner.failure_count = 0;
                    false
                }
                _ => false,
            }
        };

        if closed {
            tracing::info!(name = %self.name, "Circuit breaker HALF_OPEN -> CLOSED");
            self.emit(BreakerEvent::Closed { name: self.name.clone() });
        }
    }

    fn on_failure(&self, permit: Permit, error: &(dyn StdError + 'static)) {
        if self.expected_errors.as_ref().is_some_and(|is_expected| is_expected(error)) {
            let mut inner = self.inner.lock();
            if permit == Permit::Trial {
                inner.trial_in_flight = false;
            }
            tracing::debug!(name = %self.name, error = %error, "Expected error, not counted");
            return;
        }

        let now = Instant::now();
        let opened = {
            let mut inner = self.inner.lock();
            match (permit, inner.state) {
                (Permit::Trial, CircuitState::HalfOpen) => {
                    inner.state = CircuitState::Open;
                    inner.trial_in_flight = false;
                    inner.mark_failure_time(now);
                    true
                }
                (Permit::Normal, CircuitState::Closed) => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.mark_failure_time(now);
                    if inner.failure_count >= self.failure_threshold {
                        inner.state = CircuitState::Open;
                        true
                    } else {
                        false
                    }
                }
                // A forced transition happened while the call was in flight.
                _ => {
                    inner.mark_failure_time(now);
                    false
                }
            }
        };

        if opened {
            tracing::warn!(
                name = %self.name,
                threshold = self.failure_threshold,
                error = %error,
                "Circuit breaker opened"
            );
            self.emit(BreakerEvent::Opened {
                name: self.name.clone(),
                error: error.to_string(),
            });
        }
    }

    fn emit(&self, event: BreakerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
