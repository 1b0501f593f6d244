//! Error types for supervision and coordination operations
//!
//! Every public operation of the supervisor and the coordinator returns one of
//! these variants. Each variant carries a stable code (see [`Error::code`]) so
//! that callers can branch on the failure without parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for supervision and coordination operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Service not found: {id}")]
    ServiceNotFound { id: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Service already exists: {id}")]
    ServiceAlreadyExists { id: String },

    #[error("No available ports: {message}")]
    NoAvailablePorts { message: String },

    #[error("No available agent for task {task_id}")]
    NoAvailableAgent { task_id: String },

    #[error("Failed to start service {id}: {message}")]
    ServiceStart { id: String, message: String },

    #[error("Failed to stop service {id}: {message}")]
    ServiceStop { id: String, message: String },

    #[error("Health check failed for service {id}: {message}")]
    HealthCheck { id: String, message: String },

    #[error("Failed to assign task {task_id}: {message}")]
    TaskAssignment { task_id: String, message: String },

    #[error("Failed to complete task {task_id}: {message}")]
    TaskCompletion { task_id: String, message: String },

    #[error("Failed to escalate task {task_id}: {message}")]
    Escalation { task_id: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", err))
    }
}

impl Error {
    pub fn service_not_found<S: Into<String>>(id: S) -> Self {
        Self::ServiceNotFound { id: id.into() }
    }

    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn agent_not_found<S: Into<String>>(id: S) -> Self {
        Self::AgentNotFound { id: id.into() }
    }

    /// Create a validation error with a formatted message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn service_start<S1: Into<String>, S2: Into<String>>(id: S1, message: S2) -> Self {
        Self::ServiceStart {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn service_stop<S1: Into<String>, S2: Into<String>>(id: S1, message: S2) -> Self {
        Self::ServiceStop {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn task_assignment<S1: Into<String>, S2: Into<String>>(task_id: S1, message: S2) -> Self {
        Self::TaskAssignment {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn task_completion<S1: Into<String>, S2: Into<String>>(task_id: S1, message: S2) -> Self {
        Self::TaskCompletion {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn escalation<S1: Into<String>, S2: Into<String>>(task_id: S1, message: S2) -> Self {
        Self::Escalation {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            Error::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Error::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Error::ServiceAlreadyExists { .. } => "SERVICE_ALREADY_EXISTS",
            Error::NoAvailablePorts { .. } => "NO_AVAILABLE_PORTS",
            Error::NoAvailableAgent { .. } => "NO_AVAILABLE_AGENT",
            Error::ServiceStart { .. } => "SERVICE_START_ERROR",
            Error::ServiceStop { .. } => "SERVICE_STOP_ERROR",
            Error::HealthCheck { .. } => "HEALTH_CHECK_ERROR",
            Error::TaskAssignment { .. } => "TASK_ASSIGNMENT_ERROR",
            Error::TaskCompletion { .. } => "TASK_COMPLETION_ERROR",
            Error::Escalation { .. } => "ESCALATION_ERROR",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Configuration { .. } => "CONFIGURATION_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::ServiceNotFound { .. }
            | Error::TaskNotFound { .. }
            | Error::AgentNotFound { .. } => "not_found",
            Error::ServiceAlreadyExists { .. } => "conflict",
            Error::NoAvailablePorts { .. } | Error::NoAvailableAgent { .. } => {
                "resource_exhaustion"
            }
            Error::ServiceStart { .. } | Error::ServiceStop { .. } | Error::HealthCheck { .. } => {
                "infrastructure"
            }
            Error::TaskAssignment { .. }
            | Error::TaskCompletion { .. }
            | Error::Escalation { .. } => "coordination",
            Error::Validation { .. } => "validation",
            Error::Configuration { .. } => "configuration",
            Error::Storage(_) => "storage",
            Error::Internal(_) => "internal",
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        self.category() == "not_found"
    }

    /// Check if this error is transient (client can retry later)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoAvailablePorts { .. } | Error::NoAvailableAgent { .. }
        )
    }

    /// Structured view handed to consumers of the public API
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable error payload with a stable code and a human-readable message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        err.to_body()
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::service_not_found("svc").code(), "SERVICE_NOT_FOUND");
        assert_eq!(Error::task_not_found("t1").code(), "TASK_NOT_FOUND");
        assert_eq!(Error::agent_not_found("a1").code(), "AGENT_NOT_FOUND");
        assert_eq!(
            Error::ServiceAlreadyExists { id: "svc".into() }.code(),
            "SERVICE_ALREADY_EXISTS"
        );
        assert_eq!(
            Error::NoAvailableAgent {
                task_id: "t1".into()
            }
            .code(),
            "NO_AVAILABLE_AGENT"
        );
        assert_eq!(
            Error::service_start("svc", "boom").code(),
            "SERVICE_START_ERROR"
        );
        assert_eq!(Error::escalation("t1", "boom").code(), "ESCALATION_ERROR");
    }

    #[test]
    fn test_error_categories() {
        assert!(Error::task_not_found("t1").is_not_found());
        assert!(!Error::task_not_found("t1").is_recoverable());
        assert_eq!(Error::service_stop("svc", "x").category(), "infrastructure");
        assert_eq!(Error::task_completion("t1", "x").category(), "coordination");

        let exhausted = Error::NoAvailablePorts {
            message: "range 3001-3002 exhausted".into(),
        };
        assert!(exhausted.is_recoverable());
        assert_eq!(exhausted.category(), "resource_exhaustion");
    }

    #[test]
    fn test_error_body() {
        let err = Error::service_not_found("svc-9");
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, "SERVICE_NOT_FOUND");
        assert!(body.message.contains("svc-9"));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "SERVICE_NOT_FOUND");
    }

    #[test]
    fn test_error_from_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: Error = json_err.into();
        assert_eq!(core_err.category(), "internal");
    }
}
