use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::{AppError, ErrorKind};

/// Expected bearer token for the admin API.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    api_key: Arc<str>,
}

impl AdminAuth {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Arc::from(api_key),
        }
    }
}

pub async fn admin_auth_middleware(
    State(auth): State<AdminAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let rejection = match token {
        Some(token) if token == &*auth.api_key => None,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Admin request with invalid API key");
            Some("Invalid API key")
        }
        None => Some("Missing bearer token"),
    };

    match rejection {
        None => Ok(next.run(request).await),
        Some(message) => Err(AppError::new(ErrorKind::Authentication, message)),
    }
}
