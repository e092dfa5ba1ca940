//! Manuscript gateway library: the request resilience core of the
//! manuscript submission service, embedded in an axum pipeline.

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{AppError, ErrorKind};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
