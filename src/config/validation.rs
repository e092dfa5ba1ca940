//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Detect duplicate dependency names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} has invalid address '{value}'")]
    InvalidAddress { field: String, value: String },
    #[error("dependency '{0}' is defined more than once")]
    DuplicateDependency(String),
    #[error("dependency name must not be empty")]
    EmptyDependencyName,
    #[error("correlation header '{0}' is not a valid header name")]
    InvalidHeader(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address".to_string(),
            value: config.listener.bind_address.clone(),
        });
    }

    let admission = &config.admission;
    if admission.max_concurrent_requests == 0 {
        errors.push(ValidationError::Zero { field: "admission.max_concurrent_requests" });
    }
    if admission.request_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "admission.request_timeout_ms" });
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.failure_threshold" });
    }

    if HeaderName::from_bytes(config.correlation.header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader(config.correlation.header.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address".to_string(),
            value: config.observability.metrics_address.clone(),
        });
    }

    let mut seen = HashSet::new();
    for dep in &config.dependencies {
        if dep.name.is_empty() {
            errors.push(ValidationError::EmptyDependencyName);
        } else if !seen.insert(dep.name.as_str()) {
            errors.push(ValidationError::DuplicateDependency(dep.name.clone()));
        }
        if Url::parse(&dep.address).is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: format!("dependencies.{}.address", dep.name),
                value: dep.address.clone(),
            });
        }
        if dep.failure_threshold == Some(0) {
            errors.push(ValidationError::Zero { field: "dependencies.failure_threshold" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
