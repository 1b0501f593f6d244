//! Settings for the supervisor and the coordinator
//!
//! Both settings types deserialize with defaults for every field, so a
//! configuration file only needs to name what it overrides.
//!
//! ```rust
//! use agent_team_core::config::*;
//!
//! let settings = SupervisorSettings::builder()
//!     .port_range(4100, 4110)
//!     .grace_period_secs(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(settings.port_range_start, 4100);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::event::DEFAULT_EVENT_LOG_CAPACITY;
use crate::orchestration::launcher::LaunchTarget;
use crate::{Error, Result};

/// Process supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorSettings {
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Time between the graceful signal and the forced kill on stop
    pub grace_period_secs: u64,
    pub health_check_interval_secs: u64,
    /// Perform an HTTP round trip against the service port during health checks
    pub http_probe: bool,
    pub probe_timeout_ms: u64,
    /// Number of latency samples kept per service
    pub metrics_window: usize,
    /// Compiled agent-service executable used for every type without an override
    pub worker_binary: PathBuf,
    /// Per-type program overrides
    pub agent_programs: BTreeMap<String, LaunchTarget>,
    /// Connection string handed to children as `DATABASE_URL`
    pub database_url: Option<String>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            port_range_start: 3001,
            port_range_end: 4000,
            grace_period_secs: 10,
            health_check_interval_secs: 30,
            http_probe: true,
            probe_timeout_ms: 2000,
            metrics_window: 100,
            worker_binary: PathBuf::from("agent-team-worker"),
            agent_programs: BTreeMap::new(),
            database_url: None,
        }
    }
}

impl SupervisorSettings {
    pub fn builder() -> SupervisorSettingsBuilder {
        SupervisorSettingsBuilder {
            settings: Self::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(Error::configuration(format!(
                "Invalid port range {}-{}",
                self.port_range_start, self.port_range_end
            )));
        }
        if self.health_check_interval_secs == 0 {
            return Err(Error::configuration(
                "Health check interval must be at least one second",
            ));
        }
        if self.metrics_window == 0 {
            return Err(Error::configuration("Metrics window cannot be empty"));
        }
        if self.worker_binary.as_os_str().is_empty() {
            return Err(Error::configuration("Worker binary path cannot be empty"));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Builder for SupervisorSettings
#[derive(Debug, Clone)]
pub struct SupervisorSettingsBuilder {
    settings: SupervisorSettings,
}

impl SupervisorSettingsBuilder {
    pub fn port_range(mut self, start: u16, end: u16) -> Self {
        self.settings.port_range_start = start;
        self.settings.port_range_end = end;
        self
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.settings.grace_period_secs = secs;
        self
    }

    pub fn health_check_interval_secs(mut self, secs: u64) -> Self {
        self.settings.health_check_interval_secs = secs;
        self
    }

    pub fn http_probe(mut self, enabled: bool) -> Self {
        self.settings.http_probe = enabled;
        self
    }

    pub fn metrics_window(mut self, window: usize) -> Self {
        self.settings.metrics_window = window;
        self
    }

    pub fn worker_binary<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings.worker_binary = path.into();
        self
    }

    pub fn agent_program<S: Into<String>>(mut self, agent_type: S, target: LaunchTarget) -> Self {
        self.settings
            .agent_programs
            .insert(agent_type.into(), target);
        self
    }

    pub fn database_url<S: Into<String>>(mut self, url: S) -> Self {
        self.settings.database_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<SupervisorSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Coordination registry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinationSettings {
    /// Concurrency ceiling per agent
    pub max_workload: u32,
    pub staleness_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub event_log_capacity: usize,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            max_workload: 3,
            staleness_timeout_secs: 300,
            sweep_interval_secs: 60,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

impl CoordinationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_workload == 0 {
            return Err(Error::configuration("Max workload must be at least 1"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::configuration(
                "Sweep interval must be at least one second",
            ));
        }
        if self.event_log_capacity == 0 {
            return Err(Error::configuration("Event log capacity cannot be 0"));
        }
        Ok(())
    }

    pub fn staleness_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_timeout_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_defaults() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.port_range_start, 3001);
        assert_eq!(settings.port_range_end, 4000);
        assert_eq!(settings.grace_period(), Duration::from_secs(10));
        assert_eq!(settings.health_check_interval(), Duration::from_secs(30));
        assert_eq!(settings.metrics_window, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_supervisor_validation() {
        assert!(SupervisorSettings::builder()
            .port_range(4000, 3000)
            .build()
            .is_err());
        assert!(SupervisorSettings::builder()
            .port_range(0, 10)
            .build()
            .is_err());
        assert!(SupervisorSettings::builder()
            .metrics_window(0)
            .build()
            .is_err());
        assert!(SupervisorSettings::builder()
            .health_check_interval_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let settings: SupervisorSettings =
            serde_json::from_str(r#"{"port_range_start": 5000, "port_range_end": 5010}"#).unwrap();
        assert_eq!(settings.port_range_start, 5000);
        assert_eq!(settings.grace_period_secs, 10);

        let coordination: CoordinationSettings =
            serde_json::from_str(r#"{"max_workload": 5}"#).unwrap();
        assert_eq!(coordination.max_workload, 5);
        assert_eq!(coordination.staleness_timeout_secs, 300);
    }

    #[test]
    fn test_coordination_validation() {
        assert!(CoordinationSettings::default().validate().is_ok());
        let zero = CoordinationSettings {
            max_workload: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        assert_eq!(
            CoordinationSettings::default().staleness_timeout(),
            chrono::Duration::minutes(5)
        );
    }
}
