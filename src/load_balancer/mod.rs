//! Load balancing subsystem (admission control).
//!
//! # Data Flow
//! ```text
//! Request arrives:
//!     → priority.rs (score from identity and path)
//!     → admission.rs
//!         - slot free: take a permit, process now
//!         - queue full: 503 with Retry-After
//!         - otherwise: queue.rs entry, wait for a permit or the deadline
//!     → Response gets queue/processing time and load headers
//!     → Permit dropped: slot freed, next drain pass scheduled
//! ```
//!
//! # Design Decisions
//! - Controller is constructed by the server and injected, one per process
//! - Overload rejection is synchronous and never blocks
//! - Queue timeouts answer 408 and never consume capacity

pub mod admission;
pub mod priority;
pub mod queue;

pub use admission::{
    admission_middleware, AdmissionController, AdmissionError, AdmissionPermit, LoadStats, Ticket,
};
pub use priority::PriorityPolicy;
