//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request enters the pipeline:
//!     → recovery.rs (buffer body, run the rest of the pipeline)
//!     → On classified, retryable error: wait fixed delay, replay with RetryContext
//!     → Final error rendered with request ID, outcome reported to the sink
//!
//! Call to a dependency:
//!     → registry.rs (breaker for the dependency name)
//!     → circuit_breaker.rs (fail fast while open, count failures, probe after reset timeout)
//! ```
//!
//! # Design Decisions
//! - Breakers are per dependency and shared through the registry
//! - Retries never bypass admission control; replays re-enter below the recovery layer
//! - Breaker transitions are broadcast events, consumed for logs and metrics

pub mod circuit_breaker;
pub mod recovery;
pub mod registry;

pub use circuit_breaker::{BreakerError, BreakerEvent, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use recovery::{recovery_middleware, RecoveryState, RetryContext};
pub use registry::CircuitBreakerRegistry;
