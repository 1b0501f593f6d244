//! SQLite persistence for agent team records
//!
//! [`StorageManager`] owns the connection pool and the per-entity
//! repositories, and implements the core
//! [`RecordStore`](agent_team_core::store::RecordStore) contract so the
//! supervisor and the coordinator can mirror their state into SQLite.

pub mod error;
pub mod manager;
pub mod repositories;
pub mod schema;
mod store;

pub use error::{Error, Result};
pub use manager::{DatabaseConfig, DatabaseStats, StorageManager};

/// Re-export core types for convenience
pub use agent_team_core as core;
