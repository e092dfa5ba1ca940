//! Named circuit breakers.
//!
//! # Responsibilities
//! - Hold one breaker per dependency name
//! - Watch every registered breaker's transitions for logging and metrics
//! - Expose aggregate status and bulk reset
//!
//! # Design Decisions
//! - Owned by the server's composition root and injected, never a global
//! - Last registration for a name wins
//! - Lookups of unknown names return `None` rather than failing

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerEvent, BreakerSnapshot, CircuitBreaker};

/// Collection of circuit breakers keyed by dependency name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a breaker under its name, replacing any previous one.
    pub fn register(&self, breaker: CircuitBreaker) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(breaker);
        watch_transitions(breaker.subscribe());

        if self
            .breakers
            .insert(breaker.name().to_string(), breaker.clone())
            .is_some()
        {
            tracing::debug!(name = %breaker.name(), "Replaced existing circuit breaker");
        } else {
            tracing::info!(name = %breaker.name(), "Circuit breaker registered");
        }
        breaker
    }

    /// Fetch a breaker, creating and registering one with `config` if absent.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        self.register(CircuitBreaker::new(name, config))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot for one breaker, or `None` if it is not registered.
    pub fn status(&self, name: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(name).map(|entry| entry.value().stats())
    }

    /// Snapshots for every registered breaker, ordered by name.
    pub fn all_statuses(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Reset one breaker. Returns false if it is not registered.
    pub fn reset(&self, name: &str) -> bool {
        self.with_breaker(name, CircuitBreaker::reset)
    }

    pub fn reset_all(&self) {
        for breaker in self.snapshot_breakers() {
            breaker.reset();
        }
        tracing::info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    pub fn force_open(&self, name: &str) -> bool {
        self.with_breaker(name, CircuitBreaker::force_open)
    }

    pub fn force_closed(&self, name: &str) -> bool {
        self.with_breaker(name, CircuitBreaker::force_closed)
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn with_breaker(&self, name: &str, f: impl FnOnce(&CircuitBreaker)) -> bool {
        // Clone out of the map so breaker callbacks never run under a shard lock.
        match self.get(name) {
            Some(breaker) => {
                f(&breaker);
                true
            }
            None => false,
        }
    }

    fn snapshot_breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|e| e.value().clone()).collect()
    }
}

/// Log and count a breaker's transitions until the breaker is dropped.
fn watch_transitions(mut events: broadcast::Receiver<BreakerEvent>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No runtime available, breaker transitions will not be logged");
        return;
    };

    handle.spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    metrics::record_breaker_event(event.name(), event.label());
                    match &event {
                        BreakerEvent::Opened { name, error } => {
                            tracing::warn!(dependency = %name, error = %error, "Dependency circuit opened");
                        }
                        other => {
                            tracing::info!(dependency = %other.name(), event = other.label(), "Dependency circuit transition");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Breaker event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
