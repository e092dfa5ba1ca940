//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps runtime-tunable settings (recovery, critical deps)
//! ```
//!
//! # Design Decisions
//! - Admission limits and breaker parameters are fixed at construction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, AdmissionConfig, CircuitBreakerConfig, CorrelationConfig, DependencyConfig,
    GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, PriorityConfig, RecoveryConfig,
};
