//! Error types for the agent-service executable

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Environment error: {0}")]
    Environment(#[from] config::ConfigError),

    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
