use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, Uri},
    response::Response,
};

use crate::error::AppError;
use crate::http::server::AppState;

/// `ANY /upstream/{dependency}`
pub async fn forward_root(
    State(state): State<AppState>,
    Path(dependency): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    state
        .upstreams
        .forward(&dependency, method, "/", uri.query(), &headers, body)
        .await
}

/// `ANY /upstream/{dependency}/{*path}`
pub async fn forward_path(
    State(state): State<AppState>,
    Path((dependency, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    state
        .upstreams
        .forward(&dependency, method, &path, uri.query(), &headers, body)
        .await
}
