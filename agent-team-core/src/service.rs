//! Service instance model
//!
//! A service instance is one OS-process-backed deployment of an agent type.
//! The supervisor owns the lifecycle; these types are the durable and
//! queryable view of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::agent::validate_identifier;
use crate::{Error, Result};

/// Default delay before an auto-restart attempt, in seconds
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 5;

/// Lifecycle status of a service instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ServiceStatus {
    /// Whether a process is (or is about to be) attached to the instance
    pub fn is_active(&self) -> bool {
        matches!(self, ServiceStatus::Starting | ServiceStatus::Running)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Starting => write!(f, "starting"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopping => write!(f, "stopping"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ServiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "starting" => Ok(ServiceStatus::Starting),
            "running" => Ok(ServiceStatus::Running),
            "stopping" => Ok(ServiceStatus::Stopping),
            "stopped" => Ok(ServiceStatus::Stopped),
            "error" => Ok(ServiceStatus::Error),
            other => Err(Error::validation(format!(
                "Unknown service status: {}",
                other
            ))),
        }
    }
}

/// One OS-process-backed deployment of an agent type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    pub id: String,
    pub agent_type: String,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub status: ServiceStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceInstance {
    /// New instance in `starting` state for the given config and port
    pub fn starting(config: &ServiceConfig, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: config.id.clone(),
            agent_type: config.agent_type.clone(),
            port: Some(port),
            pid: None,
            status: ServiceStatus::Starting,
            error_count: 0,
            last_error: None,
            last_health_check: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: ServiceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record a process-level error without touching the process itself
    pub fn record_error<S: Into<String>>(&mut self, message: S) {
        self.error_count += 1;
        self.last_error = Some(message.into());
        self.set_status(ServiceStatus::Error);
    }

    pub fn uptime_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }
}

/// Start request for one agent service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub id: String,
    pub agent_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
    /// Extra environment passed to the child process
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_restart_delay_secs() -> u64 {
    DEFAULT_RESTART_DELAY_SECS
}

impl ServiceConfig {
    /// Create a builder for constructing a ServiceConfig
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validate ids and type tags
    pub fn validate(&self) -> Result<()> {
        validate_identifier("Service id", &self.id)?;
        validate_identifier("Agent type", &self.agent_type)?;
        if self.port == Some(0) {
            return Err(Error::validation("Service port cannot be 0"));
        }
        Ok(())
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }

    pub fn restart_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.restart_delay_secs)
    }
}

/// Builder for ServiceConfig
#[derive(Debug, Clone)]
pub struct ServiceConfigBuilder {
    id: Option<String>,
    agent_type: Option<String>,
    name: Option<String>,
    port: Option<u16>,
    capabilities: BTreeSet<String>,
    auto_restart: bool,
    restart_delay_secs: u64,
    environment: BTreeMap<String, String>,
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self {
            id: None,
            agent_type: None,
            name: None,
            port: None,
            capabilities: BTreeSet::new(),
            auto_restart: false,
            restart_delay_secs: DEFAULT_RESTART_DELAY_SECS,
            environment: BTreeMap::new(),
        }
    }
}

impl ServiceConfigBuilder {
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn agent_type<S: Into<String>>(mut self, agent_type: S) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn capability<S: Into<String>>(mut self, capability: S) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(|c| c.into()));
        self
    }

    pub fn auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn restart_delay_secs(mut self, secs: u64) -> Self {
        self.restart_delay_secs = secs;
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ServiceConfig> {
        let config = ServiceConfig {
            id: self
                .id
                .ok_or_else(|| Error::validation("Service id is required"))?,
            agent_type: self
                .agent_type
                .ok_or_else(|| Error::validation("Agent type is required"))?,
            name: self.name,
            port: self.port,
            capabilities: self.capabilities,
            auto_restart: self.auto_restart,
            restart_delay_secs: self.restart_delay_secs,
            environment: self.environment,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Snapshot of a service's running counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceMetrics {
    pub service_id: String,
    pub request_count: u64,
    pub error_count: u64,
    pub average_response_time_ms: f64,
    pub peak_memory_bytes: u64,
    pub peak_cpu_percent: f32,
    pub uptime_seconds: u64,
    pub computed_at: DateTime<Utc>,
}
