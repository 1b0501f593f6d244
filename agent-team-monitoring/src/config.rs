//! Configuration for monitoring and observability

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{MonitoringError, Result};

/// Complete monitoring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub health: HealthConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines for terminals
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

/// Metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and listener
    pub enabled: bool,
    pub listen_address: String,
    pub collection_interval_secs: u64,
}

/// Health reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Upper bound for a single provider
    pub check_timeout_secs: u64,
    pub report_interval_secs: u64,
    /// Host memory usage above which the memory check degrades
    pub memory_threshold_percent: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "127.0.0.1:9090".to_string(),
            collection_interval_secs: 15,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 5,
            report_interval_secs: 30,
            memory_threshold_percent: 85.0,
        }
    }
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            MonitoringError::Config(format!(
                "Invalid metrics address {}: {}",
                self.listen_address, e
            ))
        })
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(MonitoringError::Config("Log level cannot be empty".into()));
        }
        if self.metrics.enabled {
            self.metrics.socket_addr()?;
        }
        if self.metrics.collection_interval_secs == 0 || self.health.report_interval_secs == 0 {
            return Err(MonitoringError::Config(
                "Collection and report intervals must be at least one second".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.health.memory_threshold_percent) {
            return Err(MonitoringError::Config(format!(
                "Memory threshold must be a percentage, got {}",
                self.health.memory_threshold_percent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitoringConfig::default();
        config.validate().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_invalid_metrics_address_is_rejected_when_enabled() {
        let mut config = MonitoringConfig::default();
        config.metrics.listen_address = "not an address".to_string();
        config.validate().unwrap();

        config.metrics.enabled = true;
        assert!(matches!(config.validate(), Err(MonitoringError::Config(_))));
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: MonitoringConfig =
            serde_json::from_str(r#"{"logging": {"format": "json"}}"#).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.health, HealthConfig::default());
    }
}
