//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): completed requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_admission_total` (counter): admission outcomes
//! - `gateway_active_requests` / `gateway_queue_length` (gauges): live load
//! - `gateway_retries_total` (counter): recovery retries by error type
//! - `gateway_errors_total` (counter): reported errors by type
//! - `gateway_breaker_transitions_total` (counter): breaker events by dependency

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, duration: Duration) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(duration.as_secs_f64());
}

/// Admission outcome: `immediate`, `queued`, `rejected`, `timed_out`.
pub fn record_admission(outcome: &'static str) {
    counter!("gateway_admission_total", "outcome" => outcome).increment(1);
}

pub fn set_load(active: usize, queued: usize) {
    gauge!("gateway_active_requests").set(active as f64);
    gauge!("gateway_queue_length").set(queued as f64);
}

pub fn record_retry(kind: &'static str) {
    counter!("gateway_retries_total", "type" => kind).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("gateway_errors_total", "type" => kind).increment(1);
}

pub fn record_breaker_event(dependency: &str, event: &'static str) {
    counter!(
        "gateway_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "event" => event
    )
    .increment(1);
}
