//! Layered configuration for the coordinator
//!
//! Sources, lowest precedence first: built-in defaults, `config/default`,
//! `config/local`, an explicit file, then `AGENT_TEAM_*` environment
//! variables with `__` separating nested keys
//! (`AGENT_TEAM_SUPERVISOR__PORT_RANGE_START=5000`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use agent_team_core::config::{CoordinationSettings, SupervisorSettings};
use agent_team_core::service::ServiceConfig;
use agent_team_monitoring::MonitoringConfig;
use agent_team_storage::DatabaseConfig;

use crate::{Error, Result};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "AGENT_TEAM";

/// Coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub supervisor: SupervisorSettings,
    pub coordination: CoordinationSettings,
    pub monitoring: MonitoringConfig,
    /// Services started when the coordinator boots
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Load configuration from the default files and the environment
    pub fn load() -> Result<Self> {
        Self::load_layers(None)
    }

    /// Like [`load`](Self::load), with `path` layered above the default files
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_layers(Some(path.as_ref()))
    }

    fn load_layers(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_derived();
        Ok(config)
    }

    /// Fill values that follow from other sections
    pub fn apply_derived(&mut self) {
        if self.supervisor.database_url.is_none() {
            self.supervisor.database_url = Some(self.database.url.clone());
        }
    }

    /// Check every section; the first problem wins
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Configuration("Database URL cannot be empty".into()));
        }
        self.supervisor.validate()?;
        self.coordination.validate()?;
        self.monitoring.validate()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !seen.insert(service.id.as_str()) {
                return Err(Error::Configuration(format!(
                    "Service {} is configured more than once",
                    service.id
                )));
            }
        }
        Ok(())
    }
}
