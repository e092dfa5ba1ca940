//! HTTP server setup and pipeline composition.
//!
//! # Responsibilities
//! - Own the shared state: breaker registry, admission controller, dependencies
//! - Create the Axum router (health, upstream, admin) with its fallback
//! - Wire the middleware pipeline in order
//! - Serve until shutdown, applying hot-reloaded settings meanwhile
//!
//! # Pipeline (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → correlation → recovery → admission → routes
//! ```
//! Recovery sits above admission so every replayed attempt is re-admitted.

use arc_swap::ArcSwap;
use axum::{
    http::{HeaderName, Uri},
    middleware,
    routing::{any, get},
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::{GatewayConfig, RecoveryConfig};
use crate::error::AppError;
use crate::health::endpoints;
use crate::http::request::{correlation_middleware, CorrelationState, UuidRequestId, X_REQUEST_ID};
use crate::load_balancer::{admission_middleware, AdmissionController};
use crate::observability::{MetricsSink, MonitoringSink};
use crate::resilience::{recovery_middleware, CircuitBreakerRegistry, RecoveryState};
use crate::upstream::{handlers, UpstreamError, UpstreamPool};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CircuitBreakerRegistry>,
    pub admission: AdmissionController,
    pub upstreams: Arc<UpstreamPool>,
    /// Critical dependency names for the health gate. Hot-reloadable.
    pub critical: Arc<ArcSwap<Vec<String>>>,
    pub started_at: DateTime<Utc>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
    recovery: Arc<ArcSwap<RecoveryConfig>>,
}

impl HttpServer {
    /// Create a server reporting to the default metrics sink.
    pub fn new(config: GatewayConfig) -> Result<Self, UpstreamError> {
        Self::with_sink(config, Arc::new(MetricsSink))
    }

    /// Create a server reporting errors and requests to `sink`.
    pub fn with_sink(config: GatewayConfig, sink: Arc<dyn MonitoringSink>) -> Result<Self, UpstreamError> {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let upstreams = UpstreamPool::from_config(&config.dependencies, &config.circuit_breaker, &registry)?;
        let admission = AdmissionController::new(config.admission.clone(), config.priority.clone());

        let state = AppState {
            registry,
            admission,
            upstreams: Arc::new(upstreams),
            critical: Arc::new(ArcSwap::from_pointee(config.critical_dependencies())),
            started_at: Utc::now(),
        };

        let recovery = RecoveryState::new(config.recovery.clone(), sink);
        let policy = recovery.policy.clone();
        let router = Self::build_router(&config, state.clone(), recovery);

        Ok(Self {
            router,
            config,
            state,
            recovery: policy,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState, recovery: RecoveryState) -> Router {
        let correlation = match HeaderName::from_bytes(config.correlation.header.as_bytes()) {
            Ok(header) => CorrelationState { header },
            Err(_) => {
                tracing::warn!(header = %config.correlation.header, "Invalid correlation header, using default");
                CorrelationState::default()
            }
        };

        let mut routes = Router::new()
            .route("/health", get(endpoints::health))
            .route("/health/load", get(endpoints::load_health))
            .route("/upstream/{dependency}", any(handlers::forward_root))
            .route("/upstream/{dependency}/{*path}", any(handlers::forward_path));

        if config.admin.enabled {
            routes = routes.merge(setup_admin_router(&config.admin));
        }

        routes
            .fallback(not_found)
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state.admission, admission_middleware))
            .layer(middleware::from_fn_with_state(recovery, recovery_middleware))
            .layer(middleware::from_fn_with_state(correlation, correlation_middleware))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// The fully layered router, for driving the pipeline without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires. Config updates received on
    /// `config_updates` are applied while serving.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            dependencies = self.config.dependencies.len(),
            max_concurrent_requests = self.config.admission.max_concurrent_requests,
            max_queue_size = self.config.admission.max_queue_size,
            admin_enabled = self.config.admin.enabled,
            "HTTP server starting"
        );

        let reloader = Reloader {
            current: self.config.clone(),
            critical: self.state.critical.clone(),
            recovery: self.recovery.clone(),
        };
        let reload_task = tokio::spawn(reloader.run(config_updates, shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        reload_task.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("Route {} not found", uri.path()))
}

/// Applies hot-reloaded configuration to the running server.
struct Reloader {
    current: GatewayConfig,
    critical: Arc<ArcSwap<Vec<String>>>,
    recovery: Arc<ArcSwap<RecoveryConfig>>,
}

impl Reloader {
    async fn run(
        mut self,
        mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => self.apply(config),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }

    fn apply(&mut self, new: GatewayConfig) {
        if new == self.current {
            tracing::debug!("Configuration unchanged");
            return;
        }

        for section in restart_required(&self.current, &new) {
            tracing::warn!(section, "Configuration change requires a restart to take effect");
        }

        if new.recovery != self.current.recovery {
            self.recovery.store(Arc::new(new.recovery.clone()));
            tracing::info!(
                max_retries = new.recovery.max_retries,
                retry_delay_ms = new.recovery.retry_delay_ms,
                "Recovery policy updated"
            );
        }

        let critical = new.critical_dependencies();
        if critical != self.current.critical_dependencies() {
            tracing::info!(critical = ?critical, "Critical dependencies updated");
            self.critical.store(Arc::new(critical));
        }

        self.current = new;
    }
}

fn restart_required(old: &GatewayConfig, new: &GatewayConfig) -> Vec<&'static str> {
    let mut sections = Vec::new();
    if old.listener != new.listener {
        sections.push("listener");
    }
    if old.admission != new.admission {
        sections.push("admission");
    }
    if old.priority != new.priority {
        sections.push("priority");
    }
    if old.circuit_breaker != new.circuit_breaker {
        sections.push("circuit_breaker");
    }
    let addresses = |c: &GatewayConfig| {
        c.dependencies
            .iter()
            .map(|d| (d.name.clone(), d.address.clone(), d.timeout_ms, d.breaker_config(&c.circuit_breaker)))
            .collect::<Vec<_>>()
    };
    if addresses(old) != addresses(new) {
        sections.push("dependencies");
    }
    if old.correlation != new.correlation {
        sections.push("correlation");
    }
    if old.admin != new.admin {
        sections.push("admin");
    }
    if old.observability != new.observability {
        sections.push("observability");
    }
    sections
}
