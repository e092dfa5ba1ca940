//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, pipeline composition)
//!     → request.rs (request ID, correlation ID, caller identity)
//!     → [recovery and admission layers] → handler
//!     → response.rs (error body, timing and load headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{CorrelationId, Principal, Role, X_CORRELATION_ID, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
