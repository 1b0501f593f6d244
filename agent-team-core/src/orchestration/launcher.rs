//! Agent type to executable mapping
//!
//! Every agent type runs as a fixed, compiled program. Configuration reaches the
//! child only through its environment; nothing is generated on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::SupervisorSettings;
use crate::Result;

/// Environment variable carrying the service id
pub const ENV_SERVICE_ID: &str = "AGENT_SERVICE_ID";
/// Environment variable carrying the agent type tag
pub const ENV_AGENT_TYPE: &str = "AGENT_TYPE";
/// Environment variable carrying the allocated port
pub const ENV_PORT: &str = "AGENT_PORT";
/// Environment variable carrying the record store connection string
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Program and fixed arguments used to launch one agent type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchTarget {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchTarget {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Everything a launcher needs to know about the instance being started
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub service_id: String,
    pub agent_type: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub environment: BTreeMap<String, String>,
}

/// Builds the command for a service instance
pub trait Launcher: Send + Sync {
    fn command(&self, spec: &LaunchSpec) -> Result<Command>;
}

/// Launches the worker binary, or a per-type override when one is configured
#[derive(Debug, Clone)]
pub struct BinaryLauncher {
    worker: LaunchTarget,
    programs: BTreeMap<String, LaunchTarget>,
}

impl BinaryLauncher {
    pub fn new(worker: LaunchTarget) -> Self {
        Self {
            worker,
            programs: BTreeMap::new(),
        }
    }

    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            worker: LaunchTarget::new(settings.worker_binary.clone()),
            programs: settings.agent_programs.clone(),
        }
    }

    pub fn with_program<S: Into<String>>(mut self, agent_type: S, target: LaunchTarget) -> Self {
        self.programs.insert(agent_type.into(), target);
        self
    }

    /// Resolved program for an agent type
    pub fn target_for(&self, agent_type: &str) -> &LaunchTarget {
        self.programs.get(agent_type).unwrap_or(&self.worker)
    }
}

impl Launcher for BinaryLauncher {
    fn command(&self, spec: &LaunchSpec) -> Result<Command> {
        let target = self.target_for(&spec.agent_type);

        let mut cmd = Command::new(&target.program);
        cmd.args(&target.args)
            .envs(&spec.environment)
            .env(ENV_SERVICE_ID, &spec.service_id)
            .env(ENV_AGENT_TYPE, &spec.agent_type)
            .env(ENV_PORT, spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(url) = &spec.database_url {
            cmd.env(ENV_DATABASE_URL, url);
        }

        Ok(cmd)
    }
}
