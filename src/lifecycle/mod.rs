//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → stop accepting → drain in-flight → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Startup ordering lives in main: config, logging, metrics, server, listener
//! - In-flight requests (queued ones included) finish before exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
