//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ErrorKind;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Admission control limits.
    pub admission: AdmissionConfig,

    /// Priority scoring for queued requests.
    pub priority: PriorityConfig,

    /// Error recovery (retry) policy.
    pub recovery: RecoveryConfig,

    /// Defaults applied to every dependency's circuit breaker.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Downstream dependencies reached over HTTP.
    pub dependencies: Vec<DependencyConfig>,

    /// Correlation ID propagation.
    pub correlation: CorrelationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Names of dependencies flagged as critical for the health gate.
    pub fn critical_dependencies(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.critical)
            .map(|d| d.name.clone())
            .collect()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Admission control limits. Fixed for the lifetime of the server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum requests processed concurrently.
    pub max_concurrent_requests: usize,

    /// Maximum requests waiting for a slot.
    pub max_queue_size: usize,

    /// How long a request may wait in the queue, in milliseconds.
    pub request_timeout_ms: u64,

    /// Seconds advertised to clients rejected for overload.
    pub retry_after_secs: u64,
}

impl AdmissionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            max_queue_size: 500,
            request_timeout_ms: 30_000,
            retry_after_secs: 30,
        }
    }
}

/// Additive priority scoring. Higher scores leave the queue first.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PriorityConfig {
    pub authenticated_bonus: i32,
    pub admin_bonus: i32,
    pub high_priority_bonus: i32,
    pub upload_penalty: i32,
    pub search_penalty: i32,

    /// Path prefixes served ahead of ordinary traffic.
    pub high_priority_prefixes: Vec<String>,

    /// Path fragment identifying upload requests.
    pub upload_marker: String,

    /// Path fragment identifying search requests.
    pub search_marker: String,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            authenticated_bonus: 10,
            admin_bonus: 20,
            high_priority_bonus: 15,
            upload_penalty: -5,
            search_penalty: -3,
            high_priority_prefixes: vec![
                "/api/auth".to_string(),
                "/api/health".to_string(),
                "/health".to_string(),
            ],
            upload_marker: "/upload".to_string(),
            search_marker: "/search".to_string(),
        }
    }
}

/// Retry policy for classified errors.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Maximum retries per request (attempts = retries + 1).
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Error classifications eligible for retry.
    pub retryable_errors: Vec<ErrorKind>,

    /// Largest request body buffered for replay.
    pub max_body_bytes: usize,
}

impl RecoveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_errors.contains(&kind)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            retryable_errors: vec![
                ErrorKind::Network,
                ErrorKind::Timeout,
                ErrorKind::ExternalService,
                ErrorKind::Database,
            ],
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before allowing a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Window in which failures accumulate, in milliseconds.
    pub monitoring_period_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
        }
    }
}

/// A downstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DependencyConfig {
    /// Unique dependency name (breaker key).
    pub name: String,

    /// Base URL (e.g., "http://127.0.0.1:5432").
    pub address: String,

    /// Whether the health gate fails when this dependency's circuit is open.
    #[serde(default)]
    pub critical: bool,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_dependency_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub failure_threshold: Option<u32>,

    #[serde(default)]
    pub reset_timeout_ms: Option<u64>,

    #[serde(default)]
    pub monitoring_period_ms: Option<u64>,
}

impl DependencyConfig {
    /// Breaker parameters for this dependency, falling back to `defaults`.
    pub fn breaker_config(&self, defaults: &CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            reset_timeout_ms: self.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
            monitoring_period_ms: self
                .monitoring_period_ms
                .unwrap_or(defaults.monitoring_period_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_dependency_timeout_ms() -> u64 {
    5_000
}

/// Correlation ID propagation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Header read from the request and mirrored on the response.
    pub header: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            header: "x-correlation-id".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
