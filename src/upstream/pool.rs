//! Named downstream dependencies.
//!
//! # Responsibilities
//! - Resolve a dependency name to its base URL, timeout and breaker
//! - Forward a buffered request through the dependency's breaker
//! - Classify transport failures for the recovery layer
//!
//! # Design Decisions
//! - 502, 503 and 504 from a dependency count as breaker failures; other
//!   statuses, 500 included, are passed through untouched
//! - Every call has a deadline

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{CircuitBreakerConfig, DependencyConfig};
use crate::error::{AppError, ErrorKind};
use crate::resilience::{BreakerError, CircuitBreaker, CircuitBreakerRegistry};

/// Failure talking to a dependency.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid address for dependency '{name}': {source}")]
    InvalidAddress {
        name: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid target URI '{0}'")]
    InvalidUri(String),

    #[error("dependency '{name}' did not respond within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("dependency '{name}' unreachable: {source}")]
    Connect {
        name: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("dependency '{name}' answered {status}")]
    Status { name: String, status: StatusCode },
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        let kind = match &err {
            UpstreamError::InvalidAddress { .. } | UpstreamError::InvalidUri(_) => ErrorKind::Internal,
            UpstreamError::Timeout { .. } => ErrorKind::Timeout,
            UpstreamError::Connect { .. } => ErrorKind::Network,
            UpstreamError::Status { .. } => ErrorKind::ExternalService,
        };
        AppError::new(kind, err.to_string())
    }
}

/// One configured dependency.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub name: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub breaker: Arc<CircuitBreaker>,
}

impl Upstream {
    /// Absolute URI for `path` (relative to the base URL) and `query`.
    pub fn target(&self, path: &str, query: Option<&str>) -> Result<Uri, UpstreamError> {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(query);
        url.as_str()
            .parse::<Uri>()
            .map_err(|_| UpstreamError::InvalidUri(url.to_string()))
    }
}

/// All dependencies, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct UpstreamPool {
    client: Client<HttpConnector, Body>,
    upstreams: HashMap<String, Upstream>,
}

impl UpstreamPool {
    /// Build the pool and register one breaker per dependency.
    pub fn from_config(
        dependencies: &[DependencyConfig],
        defaults: &CircuitBreakerConfig,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let mut upstreams = HashMap::with_capacity(dependencies.len());
        for dep in dependencies {
            let base_url = Url::parse(&dep.address).map_err(|source| UpstreamError::InvalidAddress {
                name: dep.name.clone(),
                source,
            })?;
            let breaker =
                registry.register(CircuitBreaker::new(dep.name.clone(), dep.breaker_config(defaults)));
            tracing::info!(
                dependency = %dep.name,
                address = %base_url,
                critical = dep.critical,
                "Dependency configured"
            );
            upstreams.insert(
                dep.name.clone(),
                Upstream {
                    name: dep.name.clone(),
                    base_url,
                    timeout: dep.timeout(),
                    breaker,
                },
            );
        }

        Ok(Self { client, upstreams })
    }

    pub fn get(&self, name: &str) -> Option<&Upstream> {
        self.upstreams.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.upstreams.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forward a request to `dependency` under its circuit breaker.
    pub async fn forward(
        &self,
        dependency: &str,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let upstream = self
            .get(dependency)
            .ok_or_else(|| AppError::not_found(format!("Unknown dependency: {}", dependency)))?;
        let uri = upstream.target(path, query)?;

        tracing::debug!(dependency = %upstream.name, method = %method, uri = %uri, "Forwarding to dependency");

        let outcome = upstream
            .breaker
            .execute(|| self.send(upstream, method, uri, headers, body))
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(BreakerError::Open { name }) => Err(AppError::circuit_open(&[name])),
            Err(BreakerError::Operation(e)) => Err(e.into()),
        }
    }

    async fn send(
        &self,
        upstream: &Upstream,
        method: Method,
        uri: Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, UpstreamError> {
        let mut request = Request::new(Body::from(body));
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.headers_mut() = forwardable_headers(headers);

        let response = tokio::time::timeout(upstream.timeout, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout {
                name: upstream.name.clone(),
                timeout: upstream.timeout,
            })?
            .map_err(|source| UpstreamError::Connect {
                name: upstream.name.clone(),
                source,
            })?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(UpstreamError::Status {
                name: upstream.name.clone(),
                status,
            });
        }

        Ok(response.map(Body::new))
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in [
        header::HOST,
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::TE,
        header::TRAILER,
        header::PROXY_AUTHORIZATION,
    ] {
        out.remove(name);
    }
    out
}
