//! Upstream dependency subsystem.
//!
//! # Data Flow
//! ```text
//! ANY /upstream/{dependency}/{*path}
//!     → handlers.rs (extract method, path, query, headers, body)
//!     → pool.rs (resolve dependency, build target URI)
//!     → circuit breaker (fail fast while open)
//!     → hyper-util client with per-dependency timeout
//!     → response, or a classified error for the recovery layer
//! ```

pub mod handlers;
pub mod pool;

pub use pool::{Upstream, UpstreamError, UpstreamPool};
