//! Metrics export through the `metrics` facade
//!
//! Per-service counters come from the supervisor's metrics tracker, registry
//! gauges from the coordinator. With export enabled a Prometheus recorder and
//! HTTP listener are installed globally; otherwise the facade calls are no-ops.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use agent_team_core::agent::{AgentRecord, AgentStatus};
use agent_team_core::service::ServiceMetrics;
use agent_team_core::{AgentCoordinator, AgentServiceManager};

use crate::config::MetricsConfig;
use crate::{MonitoringError, Result};

/// Publishes supervisor and registry figures as metrics
pub struct MetricsExporter {
    config: MetricsConfig,
}

impl MetricsExporter {
    /// Install the Prometheus recorder and listener when enabled
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install(config: MetricsConfig) -> Result<Self> {
        if config.enabled {
            let address = config.socket_addr()?;
            PrometheusBuilder::new()
                .with_http_listener(address)
                .install()
                .map_err(|e| {
                    MonitoringError::Metrics(format!("Failed to setup Prometheus: {}", e))
                })?;
            info!(%address, "Prometheus metrics listener started");
        } else {
            info!("Metrics export disabled");
        }

        let exporter = Self { config };
        exporter.describe();
        Ok(exporter)
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn describe(&self) {
        describe_counter!("agent_service_requests_total", "Requests observed per service");
        describe_counter!("agent_service_errors_total", "Errors observed per service");
        describe_gauge!(
            "agent_service_response_time_ms",
            Unit::Milliseconds,
            "Average response time over the sample window"
        );
        describe_gauge!("agent_service_uptime_seconds", Unit::Seconds, "Service uptime");
        describe_gauge!(
            "agent_service_peak_memory_bytes",
            Unit::Bytes,
            "Peak resident memory per service"
        );
        describe_gauge!("agent_services_tracked", "Number of supervised services");
        describe_gauge!("agents_active", "Agents in the live registry by status");
        describe_gauge!("agents_total_workload", "Sum of in-flight assignments");
    }

    /// Publish one snapshot per service
    pub fn record_services(&self, snapshots: &[ServiceMetrics]) {
        gauge!("agent_services_tracked").set(snapshots.len() as f64);
        for snapshot in snapshots {
            let id = snapshot.service_id.clone();
            counter!("agent_service_requests_total", "service_id" => id.clone())
                .absolute(snapshot.request_count);
            counter!("agent_service_errors_total", "service_id" => id.clone())
                .absolute(snapshot.error_count);
            gauge!("agent_service_response_time_ms", "service_id" => id.clone())
                .set(snapshot.average_response_time_ms);
            gauge!("agent_service_uptime_seconds", "service_id" => id.clone())
                .set(snapshot.uptime_seconds as f64);
            gauge!("agent_service_peak_memory_bytes", "service_id" => id)
                .set(snapshot.peak_memory_bytes as f64);
        }
    }

    /// Publish registry gauges for the live agents
    pub fn record_registry(&self, agents: &[AgentRecord]) {
        for status in [AgentStatus::Idle, AgentStatus::Busy, AgentStatus::Error] {
            let count = agents.iter().filter(|a| a.status == status).count();
            gauge!("agents_active", "status" => status.to_string()).set(count as f64);
        }
        let workload: u64 = agents.iter().map(|a| u64::from(a.workload)).sum();
        gauge!("agents_total_workload").set(workload as f64);
    }

    /// Collect from the supervisor and the coordinator once
    pub async fn collect(&self, manager: &AgentServiceManager, coordinator: &AgentCoordinator) {
        let snapshots: Vec<ServiceMetrics> = manager
            .get_all_services_status()
            .await
            .iter()
            .filter_map(|instance| manager.get_service_metrics(&instance.id).ok())
            .collect();
        self.record_services(&snapshots);

        let agents = coordinator.get_active_agents().await;
        self.record_registry(&agents);
        debug!(services = snapshots.len(), agents = agents.len(), "Metrics collected");
    }

    /// Collect on the configured interval until aborted
    pub fn spawn_collection(
        self: &Arc<Self>,
        manager: AgentServiceManager,
        coordinator: Arc<AgentCoordinator>,
    ) -> JoinHandle<()> {
        let exporter = self.clone();
        let period = Duration::from_secs(self.config.collection_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                exporter.collect(&manager, &coordinator).await;
            }
        })
    }
}
