//! Coordinator process for the agent team
//!
//! Wires the record store, the process supervisor, the coordination registry
//! and the monitoring stack together, starts the configured services and
//! shuts everything down on a termination signal.

pub mod config;
pub mod error;
pub mod server;

#[cfg(test)]
mod config_tests;

pub use error::{Error, Result};

/// Re-export member crates for convenience
pub use agent_team_core as core;
pub use agent_team_monitoring as monitoring;
pub use agent_team_storage as storage;
