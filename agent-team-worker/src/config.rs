//! Identity handed to the worker by the supervisor through its environment

use serde::Deserialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use crate::error::{Result, WorkerError};

/// Values read from `AGENT_SERVICE_ID`, `AGENT_TYPE`, `AGENT_PORT` and
/// `DATABASE_URL`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WorkerConfig {
    #[serde(rename = "agent_service_id")]
    pub service_id: String,
    pub agent_type: String,
    #[serde(rename = "agent_port")]
    pub port: u16,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl WorkerConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::default())
    }

    /// Read from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(config::Environment::default().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self> {
        let config: WorkerConfig = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service_id.trim().is_empty() {
            return Err(WorkerError::InvalidEnvironment(
                "service id cannot be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(WorkerError::InvalidEnvironment("port cannot be 0".into()));
        }
        Ok(())
    }

    /// Loopback address the supervisor probes
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}
