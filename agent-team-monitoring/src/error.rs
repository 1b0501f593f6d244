//! Error types for monitoring and observability

use thiserror::Error;

/// Result type for monitoring operations
pub type Result<T> = std::result::Result<T, MonitoringError>;

/// Monitoring and observability error types
#[derive(Error, Debug)]
pub enum MonitoringError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics exporter error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Tracing setup error
    #[error("Tracing setup error: {0}")]
    Tracing(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
