//! Error recovery (bounded retries).
//!
//! # Responsibilities
//! - Inspect the classified error carried by a pipeline response
//! - Replay the request through the rest of the pipeline for retryable tags
//! - Report every retry attempt to the monitoring sink
//! - Render the final error body with the request ID
//!
//! # Design Decisions
//! - Fixed delay between attempts, no backoff
//! - Retries re-enter the pipeline below this layer, so admission control re-evaluates them
//! - `RetryContext` only appears on replayed requests; first attempts never carry one
//! - Request bodies are buffered once (bounded) so every attempt sees the same bytes

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RecoveryConfig;
use crate::error::{AppError, ErrorKind};
use crate::http::request::request_id_of;
use crate::http::response::error_response;
use crate::observability::{metrics, ErrorRecord, MonitoringSink, RequestRecord};

/// Per-request retry bookkeeping, visible to handlers on replayed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryContext {
    pub retry_count: u32,
}

/// Shared state for [`recovery_middleware`].
#[derive(Clone)]
pub struct RecoveryState {
    pub policy: Arc<ArcSwap<RecoveryConfig>>,
    pub sink: Arc<dyn MonitoringSink>,
}

impl RecoveryState {
    pub fn new(policy: RecoveryConfig, sink: Arc<dyn MonitoringSink>) -> Self {
        Self {
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            sink,
        }
    }
}

pub async fn recovery_middleware(
    State(state): State<RecoveryState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let policy = state.policy.load_full();
    let request_id = request_id_of(&request);
    let url = request.uri().to_string();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, policy.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Request body rejected");
            let error = AppError::new(
                ErrorKind::PayloadTooLarge,
                format!("Request body exceeds {} bytes", policy.max_body_bytes),
            );
            return finish(&state, error.into_response(), &method, &url, request_id, 0, started);
        }
    };

    let mut retry_count = 0u32;
    let response = loop {
        let mut attempt = rebuild(&parts, body.clone());
        if retry_count > 0 {
            attempt.extensions_mut().insert(RetryContext { retry_count });
        }

        let response = next.clone().run(attempt).await;

        let Some(error) = response.extensions().get::<AppError>() else {
            break response;
        };
        if !policy.is_retryable(error.kind) || retry_count >= policy.max_retries {
            break response;
        }

        retry_count += 1;
        tracing::info!(
            request_id = request_id.as_deref().unwrap_or("unknown"),
            attempt = retry_count,
            error_type = %error.kind,
            delay_ms = policy.retry_delay_ms,
            "Retrying request"
        );
        metrics::record_retry(error.kind.as_str());
        state.sink.record_error(ErrorRecord {
            timestamp: Utc::now(),
            kind: error.kind,
            message: format!("Retry attempt {}: {}", retry_count, error.message),
            request_id: request_id.clone(),
            url: url.clone(),
        });

        drop(response);
        tokio::time::sleep(policy.retry_delay()).await;
    };

    finish(&state, response, &method, &url, request_id, retry_count, started)
}

/// Record the outcome and render classified errors with the request ID.
fn finish(
    state: &RecoveryState,
    response: Response,
    method: &str,
    url: &str,
    request_id: Option<String>,
    retries: u32,
    started: Instant,
) -> Response {
    let response = match response.extensions().get::<AppError>().cloned() {
        Some(error) => {
            state.sink.record_error(ErrorRecord {
                timestamp: Utc::now(),
                kind: error.kind,
                message: error.message.clone(),
                request_id: request_id.clone(),
                url: url.to_string(),
            });
            render_with_request_id(response, error, request_id.as_deref())
        }
        None => response,
    };

    state.sink.record_request(RequestRecord {
        timestamp: Utc::now(),
        method: method.to_string(),
        url: url.to_string(),
        status: response.status().as_u16(),
        duration_ms: started.elapsed().as_millis() as u64,
        retries,
        request_id,
    });
    response
}

fn render_with_request_id(response: Response, error: AppError, request_id: Option<&str>) -> Response {
    let (parts, _) = response.into_parts();
    let mut rendered = error_response(error.status(), error.kind, &error.message, request_id);

    // Keep headers added further down the pipeline (timing, load counters).
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }
    rendered.extensions_mut().insert(error);
    rendered
}

fn rebuild(parts: &Parts, body: Bytes) -> Request {
    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    *request.extensions_mut() = parts.extensions.clone();
    request
}
