//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health:
//!     → critical dependency names (hot-reloadable)
//!     → gate.rs (query registry, collect open circuits)
//!     → 200 with breaker snapshots, or CIRCUIT_BREAKER_ERROR naming every open one
//!
//! GET /health/load:
//!     → admission controller load stats
//!     → 200 when healthy, 503 otherwise
//! ```
//!
//! # Design Decisions
//! - Health is derived from breaker state; no active probing
//! - Unregistered dependencies are healthy by absence

pub mod endpoints;
pub mod gate;

pub use gate::HealthGate;
