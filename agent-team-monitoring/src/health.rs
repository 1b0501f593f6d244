//! Aggregated health reporting
//!
//! A [`HealthChecker`] runs every registered [`HealthCheckProvider`]
//! concurrently and folds the results into one [`HealthReport`]. Critical
//! checks decide the overall status; a failing non-critical check can only
//! degrade it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use agent_team_core::service::ServiceStatus;
use agent_team_core::store::RecordStore;
use agent_team_core::AgentServiceManager;

use crate::config::HealthConfig;
use crate::Result;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but functional
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub critical: bool,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl HealthCheckResult {
    pub fn new<S: Into<String>>(name: S, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            duration_ms: 0,
            critical: true,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Overall health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Results keyed by check name
    pub checks: BTreeMap<String, HealthCheckResult>,
    pub total_duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
}

impl HealthReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One named health check
#[async_trait]
pub trait HealthCheckProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> HealthCheckResult;

    /// Whether a failure makes the whole report unhealthy
    fn is_critical(&self) -> bool {
        true
    }
}

/// Round trip to the record store
pub struct StoreHealthCheck {
    store: Arc<dyn RecordStore>,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheckProvider for StoreHealthCheck {
    fn name(&self) -> &str {
        "record_store"
    }

    async fn check(&self) -> HealthCheckResult {
        match self.store.health_check().await {
            Ok(()) => HealthCheckResult::new(self.name(), HealthStatus::Healthy)
                .message("Record store reachable"),
            Err(e) => HealthCheckResult::new(self.name(), HealthStatus::Unhealthy)
                .message(format!("Record store error: {}", e)),
        }
    }
}

/// Status breakdown of supervised services
pub struct ServiceFleetHealthCheck {
    manager: AgentServiceManager,
}

impl ServiceFleetHealthCheck {
    pub fn new(manager: AgentServiceManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl HealthCheckProvider for ServiceFleetHealthCheck {
    fn name(&self) -> &str {
        "services"
    }

    async fn check(&self) -> HealthCheckResult {
        let services = self.manager.get_all_services_status().await;
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        for service in &services {
            *by_status.entry(service.status.to_string()).or_default() += 1;
        }
        let failed: Vec<&str> = services
            .iter()
            .filter(|s| s.status == ServiceStatus::Error)
            .map(|s| s.id.as_str())
            .collect();

        let result = if failed.is_empty() {
            HealthCheckResult::new(self.name(), HealthStatus::Healthy)
                .message(format!("{} services tracked", services.len()))
        } else {
            HealthCheckResult::new(self.name(), HealthStatus::Degraded)
                .message(format!("Services in error: {}", failed.join(", ")))
        };
        result
            .meta("by_status", json!(by_status))
            .meta("held_ports", json!(self.manager.held_port_count()))
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Host memory pressure
pub struct MemoryHealthCheck {
    threshold_percent: f64,
}

impl MemoryHealthCheck {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    fn classify(&self, percentage: f64) -> HealthStatus {
        if percentage < self.threshold_percent {
            HealthStatus::Healthy
        } else if percentage < self.threshold_percent + 10.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[async_trait]
impl HealthCheckProvider for MemoryHealthCheck {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check(&self) -> HealthCheckResult {
        let mut system = sysinfo::System::new();
        system.refresh_memory();

        let used = system.used_memory();
        let total = system.total_memory();
        let percentage = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        HealthCheckResult::new(self.name(), self.classify(percentage))
            .message(format!("Memory usage: {:.1}%", percentage))
            .meta("used_bytes", json!(used))
            .meta("total_bytes", json!(total))
            .meta("percentage", json!(percentage))
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Runs health check providers and caches the latest report
pub struct HealthChecker {
    config: HealthConfig,
    providers: Vec<Arc<dyn HealthCheckProvider>>,
    start_time: Instant,
    last_report: RwLock<Option<HealthReport>>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            start_time: Instant::now(),
            last_report: RwLock::new(None),
        }
    }

    pub fn add_provider<P: HealthCheckProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Arc::new(provider));
    }

    /// Record store, service fleet and host memory checks
    pub fn with_defaults(mut self, store: Arc<dyn RecordStore>, manager: AgentServiceManager) -> Self {
        self.add_provider(StoreHealthCheck::new(store));
        self.add_provider(ServiceFleetHealthCheck::new(manager));
        self.add_provider(MemoryHealthCheck::new(self.config.memory_threshold_percent));
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Run every provider concurrently and fold the results
    pub async fn check_health(&self) -> HealthReport {
        let started = Instant::now();
        let limit = Duration::from_secs(self.config.check_timeout_secs);

        let results = join_all(self.providers.iter().map(|provider| async move {
            let began = Instant::now();
            let mut result = match timeout(limit, provider.check()).await {
                Ok(result) => result,
                Err(_) => HealthCheckResult::new(provider.name(), HealthStatus::Unhealthy)
                    .message(format!("Check timed out after {}s", limit.as_secs())),
            };
            result.duration_ms = began.elapsed().as_millis() as u64;
            result.critical = provider.is_critical();
            result
        }))
        .await;

        let mut status = HealthStatus::Healthy;
        let mut checks = BTreeMap::new();
        for result in results {
            let contribution = match (result.critical, result.status) {
                (false, HealthStatus::Unhealthy) => HealthStatus::Degraded,
                (_, other) => other,
            };
            status = status.max(contribution);
            debug!(check = %result.name, status = %result.status, "Health check finished");
            checks.insert(result.name.clone(), result);
        }

        let report = HealthReport {
            status,
            checks,
            total_duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Latest report without running the checks again
    pub async fn cached_report(&self) -> Option<HealthReport> {
        self.last_report.read().await.clone()
    }

    /// Refresh the report on the configured interval, logging status changes
    pub fn spawn_periodic_checks(self: &Arc<Self>) -> JoinHandle<()> {
        let checker = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.report_interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous = None;
            loop {
                ticker.tick().await;
                let Some(checker) = checker.upgrade() else {
                    break;
                };
                let report = checker.check_health().await;
                if previous != Some(report.status) {
                    if report.status == HealthStatus::Healthy {
                        info!(status = %report.status, "Coordinator health changed");
                    } else {
                        warn!(status = %report.status, "Coordinator health changed");
                    }
                    previous = Some(report.status);
                }
            }
        })
    }
}
