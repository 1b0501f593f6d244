//! Coordinator process wiring

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use agent_team_core::store::RecordStore;
use agent_team_core::{AgentCoordinator, AgentServiceManager};
use agent_team_monitoring::{HealthChecker, MetricsExporter};
use agent_team_storage::StorageManager;

use crate::{config::Config, Result};

/// Owns every long-lived component of the coordinator
pub struct Server {
    config: Config,
    storage: Arc<StorageManager>,
    manager: AgentServiceManager,
    coordinator: Arc<AgentCoordinator>,
    health: Arc<HealthChecker>,
    metrics: Arc<MetricsExporter>,
}

impl Server {
    /// Open the store, recover state left by a previous run and connect the
    /// supervisor to the coordination registry
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        info!("Initializing coordinator components");

        let storage = Arc::new(StorageManager::new(&config.database).await?);
        let store: Arc<dyn RecordStore> = storage.clone();

        let manager = AgentServiceManager::new(config.supervisor.clone(), store.clone())?;
        let reconciled = manager.reconcile().await?;

        let coordinator = Arc::new(AgentCoordinator::new(
            config.coordination.clone(),
            store.clone(),
        )?);
        let reloaded = coordinator.reload().await?;
        manager.add_observer(coordinator.clone());

        let health = Arc::new(
            HealthChecker::new(config.monitoring.health.clone()).with_defaults(store, manager.clone()),
        );
        let metrics = Arc::new(MetricsExporter::install(config.monitoring.metrics.clone())?);

        info!(reconciled, reloaded, "Coordinator state recovered");
        Ok(Self {
            config,
            storage,
            manager,
            coordinator,
            health,
            metrics,
        })
    }

    pub fn manager(&self) -> &AgentServiceManager {
        &self.manager
    }

    pub fn coordinator(&self) -> &Arc<AgentCoordinator> {
        &self.coordinator
    }

    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Start every configured service, returning how many came up
    ///
    /// A service that fails to start is logged and skipped.
    pub async fn start_boot_services(&self) -> usize {
        let mut started = 0;
        for service in &self.config.services {
            match self.manager.start(service.clone()).await {
                Ok(instance) => {
                    info!(
                        service_id = %instance.id,
                        port = ?instance.port,
                        pid = ?instance.pid,
                        "Boot service started"
                    );
                    started += 1;
                }
                Err(e) => {
                    error!(service_id = %service.id, code = e.code(), error = %e, "Boot service failed to start");
                }
            }
        }
        started
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Run the background loops until `shutdown` resolves, then stop every
    /// service and close the store
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            services = self.config.services.len(),
            ports = %format!(
                "{}-{}",
                self.config.supervisor.port_range_start, self.config.supervisor.port_range_end
            ),
            "Agent team coordinator running"
        );

        let background: Vec<JoinHandle<()>> = vec![
            self.manager.spawn_health_monitor(),
            self.coordinator.spawn_staleness_sweep(),
            self.health.spawn_periodic_checks(),
            self.metrics
                .spawn_collection(self.manager.clone(), self.coordinator.clone()),
        ];

        shutdown.await;
        info!("Shutting down coordinator");

        for handle in background {
            handle.abort();
        }

        if let Err(e) = self.manager.shutdown_all().await {
            warn!(error = %e, "Service shutdown finished with errors");
        }
        self.storage.close().await;

        info!("Coordinator shutdown complete");
        Ok(())
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use agent_team_core::agent::AgentStatus;
    use agent_team_core::orchestration::LaunchTarget;
    use agent_team_core::service::{ServiceConfig, ServiceStatus};
    use agent_team_storage::DatabaseConfig;
    use tokio::sync::oneshot;

    fn test_config() -> Config {
        let mut config = Config {
            database: DatabaseConfig::in_memory(),
            ..Default::default()
        };
        config.supervisor.http_probe = false;
        config.supervisor.grace_period_secs = 2;
        config.supervisor.worker_binary = "/nonexistent/agent-team-worker".into();
        config
            .supervisor
            .agent_programs
            .insert("developer".to_string(), LaunchTarget::new("sleep").arg("30"));
        config.services = vec![
            ServiceConfig::builder()
                .id("dev-1")
                .agent_type("developer")
                .capability("rust")
                .build()
                .unwrap(),
            ServiceConfig::builder()
                .id("ghost-1")
                .agent_type("ghost")
                .build()
                .unwrap(),
        ];
        config
    }

    #[tokio::test]
    async fn test_boot_services_register_agents() {
        let server = Server::new(test_config()).await.unwrap();

        // ghost has no program override and the worker binary does not exist
        assert_eq!(server.start_boot_services().await, 1);

        let agent = server.coordinator().get_agent("dev-1").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.capabilities.contains("rust"));

        let ghost = server.manager().get_service_status("ghost-1").await.unwrap();
        assert_eq!(ghost.status, ServiceStatus::Error);

        let report = server.health().check_health().await;
        assert_eq!(report.checks.len(), 3);
        assert!(report.checks.contains_key("record_store"));

        server.manager().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_until_stops_services() {
        let server = Server::new(test_config()).await.unwrap();
        server.start_boot_services().await;
        let manager = server.manager().clone();
        let coordinator = server.coordinator().clone();

        let (tx, rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        running.await.unwrap().unwrap();

        assert!(manager.get_all_services_status().await.is_empty());
        assert_eq!(manager.held_port_count(), 0);
        assert!(coordinator.get_active_agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = test_config();
        config.coordination.max_workload = 0;
        assert!(Server::new(config).await.is_err());
    }
}
