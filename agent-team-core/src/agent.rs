//! Agent domain model and related types
//!
//! An agent is a logical worker identified by id, type and capability tags. It
//! may be backed by a supervised OS process or live entirely in-process; the
//! coordinator treats both the same way.
//!
//! # Examples
//!
//! Registering information for a new agent:
//!
//! ```rust
//! use agent_team_core::agent::*;
//!
//! let info = AgentInfo::builder()
//!     .id("qa-1")
//!     .name("QA engineer")
//!     .agent_type("qa_engineer")
//!     .capability("testing")
//!     .build()
//!     .unwrap();
//!
//! let agent = AgentRecord::from_info(info);
//! assert_eq!(agent.status, AgentStatus::Idle);
//! assert_eq!(agent.workload, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Error, Result};

/// Identity and liveness of one logical worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub capabilities: BTreeSet<String>,
    /// Number of in-flight assignments
    pub workload: u32,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Current status of an agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "error" => Ok(AgentStatus::Error),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(Error::validation(format!(
                "Unknown agent status: {}",
                other
            ))),
        }
    }
}

/// Registration input for an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub capabilities: BTreeSet<String>,
}

impl AgentInfo {
    /// Create a builder for constructing AgentInfo
    pub fn builder() -> AgentInfoBuilder {
        AgentInfoBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        validate_identifier("Agent id", &self.id)?;
        validate_identifier("Agent type", &self.agent_type)?;
        if self.name.trim().is_empty() {
            return Err(Error::validation("Agent name cannot be empty"));
        }
        if self.name.len() > 100 {
            return Err(Error::validation("Agent name cannot exceed 100 characters"));
        }
        for capability in &self.capabilities {
            if capability.trim().is_empty() {
                return Err(Error::validation("Capability cannot be empty"));
            }
            if capability.len() > 50 {
                return Err(Error::validation(
                    "Capability name cannot exceed 50 characters",
                ));
            }
        }
        Ok(())
    }
}

/// Validate ids and type tags: non-empty, bounded, restricted charset
pub(crate) fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", what)));
    }
    if value.len() > 100 {
        return Err(Error::validation(format!(
            "{} cannot exceed 100 characters",
            what
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(Error::validation(format!(
            "{} can only contain alphanumeric characters, dots, hyphens, and underscores",
            what
        )));
    }
    Ok(())
}

impl AgentRecord {
    /// Create a fresh idle record from registration info
    pub fn from_info(info: AgentInfo) -> Self {
        let now = Utc::now();
        Self {
            id: info.id,
            name: info.name,
            agent_type: info.agent_type,
            status: AgentStatus::Idle,
            capabilities: info.capabilities,
            workload: 0,
            last_seen: now,
            created_at: now,
        }
    }

    /// Re-apply registration info, keeping workload and creation time
    ///
    /// Registering again means the agent is back, so an offline or failed
    /// agent returns to the status implied by its workload.
    pub fn refresh(&mut self, info: AgentInfo) {
        self.name = info.name;
        self.agent_type = info.agent_type;
        self.capabilities = info.capabilities;
        if matches!(self.status, AgentStatus::Offline | AgentStatus::Error) {
            self.status = self.status_for_workload();
        }
        self.touch();
    }

    /// Update the agent's last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Whether the agent can take one more assignment under `max_workload`
    pub fn has_capacity(&self, max_workload: u32) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::Busy) && self.workload < max_workload
    }

    /// Check if the agent advertises at least one of the given capabilities
    pub fn has_any_capability(&self, capabilities: &[String]) -> bool {
        capabilities
            .iter()
            .any(|cap| self.capabilities.contains(cap))
    }

    /// Record a new in-flight assignment
    pub fn begin_assignment(&mut self) {
        self.workload += 1;
        if self.status == AgentStatus::Idle {
            self.status = AgentStatus::Busy;
        }
        self.touch();
    }

    /// Record a finished assignment; the counter never goes below zero
    pub fn finish_assignment(&mut self) {
        self.workload = self.workload.saturating_sub(1);
        if self.workload == 0 && self.status == AgentStatus::Busy {
            self.status = AgentStatus::Idle;
        }
        self.touch();
    }

    /// Status implied by the current workload for a healthy agent
    pub fn status_for_workload(&self) -> AgentStatus {
        if self.workload == 0 {
            AgentStatus::Idle
        } else {
            AgentStatus::Busy
        }
    }

    /// Whether `last_seen` is older than `timeout` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > timeout
    }
}

/// Builder for constructing AgentInfo instances with validation
#[derive(Debug, Clone, Default)]
pub struct AgentInfoBuilder {
    id: Option<String>,
    name: Option<String>,
    agent_type: Option<String>,
    capabilities: BTreeSet<String>,
}

impl AgentInfoBuilder {
    /// Set the agent id
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the display name (defaults to the id)
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the agent type tag
    pub fn agent_type<S: Into<String>>(mut self, agent_type: S) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// Add a capability
    pub fn capability<S: Into<String>>(mut self, capability: S) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Add multiple capabilities
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(|c| c.into()));
        self
    }

    /// Build the AgentInfo instance
    pub fn build(self) -> Result<AgentInfo> {
        let id = self
            .id
            .ok_or_else(|| Error::validation("Agent id is required"))?;
        let agent_type = self
            .agent_type
            .ok_or_else(|| Error::validation("Agent type is required"))?;
        let info = AgentInfo {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            agent_type,
            capabilities: self.capabilities,
        };
        info.validate()?;
        Ok(info)
    }
}
