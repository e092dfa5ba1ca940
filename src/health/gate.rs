//! Health check gate over critical dependencies.
//!
//! A dependency with no registered breaker counts as healthy.

use std::sync::Arc;

use crate::error::AppError;
use crate::resilience::{CircuitBreakerRegistry, CircuitState};

#[derive(Debug, Clone)]
pub struct HealthGate {
    registry: Arc<CircuitBreakerRegistry>,
}

impl HealthGate {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    /// Critical dependencies whose circuits are open, in input order.
    pub fn open_dependencies<S: AsRef<str>>(&self, critical: &[S]) -> Vec<String> {
        critical
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| {
                self.registry
                    .status(name)
                    .is_some_and(|snapshot| snapshot.state == CircuitState::Open)
            })
            .map(str::to_owned)
            .collect()
    }

    /// Fail with a circuit-breaker error naming every open dependency.
    pub fn check<S: AsRef<str>>(&self, critical: &[S]) -> Result<(), AppError> {
        let open = self.open_dependencies(critical);
        if open.is_empty() {
            return Ok(());
        }
        tracing::warn!(dependencies = ?open, "Health gate failed");
        Err(AppError::circuit_open(&open))
    }
}
