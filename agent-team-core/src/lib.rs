//! Core of the agent team coordinator
//!
//! This crate holds the domain model, the process supervisor for agent
//! services, the health and metrics collector, and the coordination registry
//! that routes tasks to agents. Durable state goes through the
//! [`store::RecordStore`] contract; `agent-team-storage` provides the SQLite
//! implementation.

pub mod agent;
pub mod config;
pub mod coordination;
pub mod error;
pub mod event;
pub mod orchestration;
pub mod service;
pub mod store;
pub mod task;

pub use coordination::AgentCoordinator;
pub use error::{Error, ErrorBody, Result};
pub use orchestration::{AgentServiceManager, ServiceEvent, ServiceObserver};
