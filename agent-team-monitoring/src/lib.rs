//! Observability for the agent team coordinator
//!
//! - Structured logging setup on top of `tracing-subscriber`
//! - Aggregated health reports over pluggable check providers
//! - Export of service and registry metrics through the `metrics` facade,
//!   with an optional Prometheus listener

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use config::{HealthConfig, LogFormat, LoggingConfig, MetricsConfig, MonitoringConfig};
pub use error::{MonitoringError, Result};
pub use health::{HealthCheckProvider, HealthChecker, HealthReport, HealthStatus};
pub use metrics::MetricsExporter;
pub use tracing_setup::TracingSetup;
