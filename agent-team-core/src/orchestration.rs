//! Process supervision for agent services
//!
//! One OS process is launched per service instance. The supervisor allocates a
//! port for it from a bounded pool, watches the process until it exits, and
//! applies the restart policy of the instance's configuration. The health
//! collector probes running instances on a fixed interval and feeds the
//! per-service metrics window.
//!
//! ```text
//! ServiceConfig
//!     |
//!     v
//! AgentServiceManager::start ---> PortPool (lowest free port)
//!     |
//!     v
//! Launcher (type -> compiled program) ---> child process
//!     |                                         |
//!     v                                         v
//! ServiceEvent channel <------------- exit watcher / health checks
//!     |
//!     v
//! ServiceObserver (e.g. the agent coordinator)
//! ```

pub mod health;
pub mod launcher;
pub mod metrics;
pub mod ports;
pub mod probe;
pub mod supervisor;

pub use launcher::{BinaryLauncher, LaunchSpec, LaunchTarget, Launcher};
pub use metrics::{MetricsTracker, ProcessSampler};
pub use ports::PortPool;
pub use probe::{HttpProbe, LivenessProbe};
pub use supervisor::{AgentServiceManager, ServiceEvent, ServiceObserver};
