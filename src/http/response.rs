//! Response handling and transformation.
//!
//! # Responsibilities
//! - Render classified errors as `{ error: { type, message, requestId } }`
//! - Add observability headers (queue time, processing time, load counters)
//!
//! # Design Decisions
//! - One body shape for every terminal error the client can see
//! - Durations rendered as human-readable milliseconds, e.g. "12.34ms"

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

use crate::error::ErrorKind;

pub const X_QUEUE_TIME: HeaderName = HeaderName::from_static("x-queue-time");
pub const X_PROCESSING_TIME: HeaderName = HeaderName::from_static("x-processing-time");
pub const X_ACTIVE_REQUESTS: HeaderName = HeaderName::from_static("x-active-requests");
pub const X_QUEUE_LENGTH: HeaderName = HeaderName::from_static("x-queue-length");

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: ErrorKind,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

/// Build the JSON error response for a classified error.
pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    message: &str,
    request_id: Option<&str>,
) -> Response {
    let body = ErrorEnvelope {
        error: ErrorDetail {
            kind,
            message,
            retry_after: None,
            request_id,
        },
    };
    (status, Json(body)).into_response()
}

/// Build a 503 response that tells the client when to come back.
pub fn unavailable_response(message: &str, retry_after_secs: u64, request_id: Option<&str>) -> Response {
    let body = ErrorEnvelope {
        error: ErrorDetail {
            kind: ErrorKind::ServiceUnavailable,
            message,
            retry_after: Some(retry_after_secs),
            request_id,
        },
    };
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

/// Format a duration the way the timing headers expect.
pub fn format_millis(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}

/// Insert a header value, skipping values that are not valid header text.
pub fn set_header(response: &mut Response, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}
