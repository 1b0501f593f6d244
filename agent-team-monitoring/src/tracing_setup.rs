//! Logging setup

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::{MonitoringError, Result};

/// Installs the global `tracing` subscriber
pub struct TracingSetup {
    config: LoggingConfig,
}

impl TracingSetup {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// `RUST_LOG` when set and valid, otherwise the configured level
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.config.level).map_err(|e| {
            MonitoringError::Tracing(format!("Invalid log level {}: {}", self.config.level, e))
        })
    }

    /// Install the subscriber; fails if one is already installed
    pub fn initialize(&self) -> Result<()> {
        let registry = Registry::default().with(self.env_filter()?);

        let installed = match self.config.format {
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(self.config.with_target),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(self.config.with_target)
                        .with_thread_ids(true),
                )
                .try_init(),
        };
        installed.map_err(|e| MonitoringError::Tracing(format!("Failed to init subscriber: {}", e)))?;

        info!(
            level = %self.config.level,
            format = ?self.config.format,
            "Logging initialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let setup = TracingSetup::new(LoggingConfig {
            level: "agent_team=loud".to_string(),
            ..LoggingConfig::default()
        });
        assert!(matches!(setup.env_filter(), Err(MonitoringError::Tracing(_))));
    }

    #[test]
    fn test_directive_levels_are_accepted() {
        let setup = TracingSetup::new(LoggingConfig {
            level: "warn,agent_team_core=debug".to_string(),
            ..LoggingConfig::default()
        });
        assert!(setup.env_filter().is_ok());
    }

    #[test]
    fn test_second_initialization_fails() {
        let setup = TracingSetup::new(LoggingConfig {
            format: LogFormat::Json,
            ..LoggingConfig::default()
        });
        // Another test in this binary may have installed a subscriber first
        let _ = setup.initialize();
        assert!(setup.initialize().is_err());
    }
}
