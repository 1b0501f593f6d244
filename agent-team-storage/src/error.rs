//! Error types for storage operations

use thiserror::Error;

/// Storage layer error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row cannot be turned back into a domain record
    #[error("Invalid {entity} record {id}: {message}")]
    InvalidRecord {
        entity: &'static str,
        id: String,
        message: String,
    },
}

impl Error {
    pub(crate) fn invalid_record<S: Into<String>>(
        entity: &'static str,
        id: &str,
        message: S,
    ) -> Self {
        Error::InvalidRecord {
            entity,
            id: id.to_string(),
            message: message.into(),
        }
    }
}

impl From<Error> for agent_team_core::Error {
    fn from(err: Error) -> Self {
        agent_team_core::Error::Storage(err.to_string())
    }
}

/// Convenience result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_core_storage_error() {
        let err = Error::invalid_record("agent", "a1", "bad status");
        let core: agent_team_core::Error = err.into();
        assert_eq!(core.code(), "STORAGE_ERROR");
        assert!(core.to_string().contains("Invalid agent record a1"));
    }
}
