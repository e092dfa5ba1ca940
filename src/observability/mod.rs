//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → monitor.rs (error/request records for the monitoring sink)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Monitoring sink (pluggable, injected at the composition root)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all subsystems
//! - Metrics are cheap (atomic increments)
//! - The core never persists data; it only reports to the sink

pub mod logging;
pub mod metrics;
pub mod monitor;

pub use monitor::{ErrorRecord, MetricsSink, MonitoringSink, RequestRecord};
