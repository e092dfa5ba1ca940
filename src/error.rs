//! Classified errors.
//!
//! # Responsibilities
//! - Define the error taxonomy tags used for retry eligibility and status mapping
//! - Carry a classified error through the axum pipeline so middleware can inspect it
//!
//! # Design Decisions
//! - Handlers return `AppError`; its response carries the error as an extension
//! - The final body (with request id) is rendered by the recovery middleware
//! - Tags serialize exactly as they appear on the wire

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::http::response::error_response;

/// Taxonomy tag attached to every classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    #[serde(rename = "AUTHORIZATION_ERROR")]
    Authorization,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "CONFLICT")]
    Conflict,
    #[serde(rename = "PAYLOAD_TOO_LARGE")]
    PayloadTooLarge,
    #[serde(rename = "RATE_LIMIT_EXCEEDED")]
    RateLimit,
    #[serde(rename = "FILE_UPLOAD_ERROR")]
    FileUpload,
    #[serde(rename = "DATABASE_ERROR")]
    Database,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalService,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "CIRCUIT_BREAKER_ERROR")]
    CircuitBreaker,
    #[serde(rename = "SERVICE_UNAVAILABLE")]
    ServiceUnavailable,
    #[serde(rename = "REQUEST_TIMEOUT")]
    RequestTimeout,
}

impl ErrorKind {
    /// Wire name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::RateLimit => "RATE_LIMIT_EXCEEDED",
            ErrorKind::FileUpload => "FILE_UPLOAD_ERROR",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::ExternalService => "EXTERNAL_SERVICE_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::CircuitBreaker => "CIRCUIT_BREAKER_ERROR",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::RequestTimeout => "REQUEST_TIMEOUT",
        }
    }

    /// HTTP status the error-response layer maps this tag to.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::FileUpload => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Database | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ExternalService | ErrorKind::Network => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::CircuitBreaker | ErrorKind::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error carrying a taxonomy tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Error raised when one or more critical dependencies have open circuits.
    pub fn circuit_open<S: AsRef<str>>(dependencies: &[S]) -> Self {
        let names: Vec<&str> = dependencies.iter().map(AsRef::as_ref).collect();
        Self::new(
            ErrorKind::CircuitBreaker,
            format!("Service temporarily unavailable: {}", names.join(", ")),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status(), self.kind, &self.message, None);
        response.extensions_mut().insert(self);
        response
    }
}
