//! Agent registry and task routing
//!
//! The registry is the live directory of agents, whether or not a supervised
//! process backs them. Tasks are routed to the least busy agent that has
//! capacity, narrowed by preferred type and capability tags when that does not
//! leave the task stranded.

pub mod registry;
pub mod selection;

pub use registry::AgentCoordinator;
pub use selection::select_agent;
