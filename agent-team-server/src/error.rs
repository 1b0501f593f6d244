//! Error types for the coordinator process

use thiserror::Error;

/// Server application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] agent_team_storage::Error),

    #[error("Monitoring error: {0}")]
    Monitoring(#[from] agent_team_monitoring::MonitoringError),

    #[error("Core domain error: {0}")]
    Core(#[from] agent_team_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for server operations
pub type Result<T> = std::result::Result<T, Error>;
