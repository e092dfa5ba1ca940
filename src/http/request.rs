//! Request identity and correlation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4) when the client sent none
//! - Resolve the correlation ID (inbound header, else the request ID)
//! - Carry the caller's identity for priority scoring
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Correlation ID mirrored onto the response unconditionally

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Mints a UUID v4 request ID for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the request ID assigned by the request-id layer.
pub fn request_id_of<B>(request: &axum::http::Request<B>) -> Option<String> {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
        })
        .map(str::to_owned)
}

/// Correlation ID resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Settings for the correlation middleware.
#[derive(Debug, Clone)]
pub struct CorrelationState {
    pub header: HeaderName,
}

impl Default for CorrelationState {
    fn default() -> Self {
        Self {
            header: X_CORRELATION_ID,
        }
    }
}

/// Attach a correlation ID to the request context and mirror it on the response.
pub async fn correlation_middleware(
    State(state): State<CorrelationState>,
    mut request: Request,
    next: Next,
) -> Response {
    let inbound = request
        .headers()
        .get(&state.header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let correlation_id = inbound
        .or_else(|| request_id_of(&request))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(state.header.clone(), value);
    }
    response
}

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Author,
    Reviewer,
    Editor,
    Admin,
}

/// Identity attached by the authentication layer.
///
/// The gateway does not authenticate callers itself. A token-verifying layer
/// mounted outside `admission_middleware` inserts this into request
/// extensions; anonymous requests carry none and get no priority bonus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}
