//! Monitoring sink.
//!
//! The resilience core reports errors and completed requests here; where
//! the records end up (logs, metrics, an external store) is up to the sink.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::observability::metrics;

/// An error or retry attempt worth recording.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: Option<String>,
    pub url: String,
}

/// A completed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub retries: u32,
    pub request_id: Option<String>,
}

/// Destination for error and request records.
pub trait MonitoringSink: Send + Sync {
    fn record_error(&self, record: ErrorRecord);
    fn record_request(&self, record: RequestRecord);
}

/// Default sink: structured log events plus Prometheus counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl MonitoringSink for MetricsSink {
    fn record_error(&self, record: ErrorRecord) {
        tracing::warn!(
            error_type = %record.kind,
            request_id = record.request_id.as_deref().unwrap_or("unknown"),
            url = %record.url,
            "{}",
            record.message
        );
        metrics::record_error(record.kind.as_str());
    }

    fn record_request(&self, record: RequestRecord) {
        tracing::debug!(
            method = %record.method,
            url = %record.url,
            status = record.status,
            duration_ms = record.duration_ms,
            retries = record.retries,
            request_id = record.request_id.as_deref().unwrap_or("unknown"),
            "Request completed"
        );
        metrics::record_request(
            &record.method,
            record.status,
            std::time::Duration::from_millis(record.duration_ms),
        );
    }
}
