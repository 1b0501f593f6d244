//! Agent service supervisor
//!
//! [`AgentServiceManager`] owns every OS process it launches. Each process is
//! moved into a watcher task that reaps it and reports the exit, so the
//! supervisor never polls. Lifecycle changes are delivered in order to the
//! registered [`ServiceObserver`]s and then broadcast to channel subscribers.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::launcher::{BinaryLauncher, LaunchSpec, Launcher};
use super::metrics::{MetricsTracker, ProcessSampler};
use super::ports::PortPool;
use super::probe::{HttpProbe, LivenessProbe};
use crate::config::SupervisorSettings;
use crate::service::{ServiceConfig, ServiceInstance, ServiceMetrics, ServiceStatus};
use crate::store::RecordStore;
use crate::{Error, Result};

/// Capacity of the lifecycle broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on reaping a process after SIGKILL
const FORCED_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle notification for one service instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    Started {
        service_id: String,
        name: String,
        agent_type: String,
        capabilities: BTreeSet<String>,
        pid: u32,
        port: u16,
    },
    /// The process terminated on its own
    Exited {
        service_id: String,
        code: Option<i32>,
        success: bool,
    },
    /// Spawn or wait failure; never triggers a restart
    ProcessError {
        service_id: String,
        message: String,
    },
    HealthChecked {
        service_id: String,
        healthy: bool,
    },
    /// Explicit stop completed
    Stopped {
        service_id: String,
    },
    RestartScheduled {
        service_id: String,
        delay_secs: u64,
    },
}

impl ServiceEvent {
    pub fn service_id(&self) -> &str {
        match self {
            ServiceEvent::Started { service_id, .. }
            | ServiceEvent::Exited { service_id, .. }
            | ServiceEvent::ProcessError { service_id, .. }
            | ServiceEvent::HealthChecked { service_id, .. }
            | ServiceEvent::Stopped { service_id }
            | ServiceEvent::RestartScheduled { service_id, .. } => service_id,
        }
    }
}

/// Receives lifecycle events in the order the supervisor produces them
#[async_trait]
pub trait ServiceObserver: Send + Sync {
    async fn on_service_event(&self, event: &ServiceEvent);
}

/// How a watched process ended
#[derive(Debug, Clone, PartialEq)]
pub(super) enum ExitReport {
    Exited { code: Option<i32>, success: bool },
    Failed(String),
}

pub(super) struct ServiceEntry {
    pub(super) instance: ServiceInstance,
    /// Distinguishes successive processes started under the same id
    pub(super) generation: u64,
    /// Port to return to the pool once the process is gone
    pub(super) held_port: Option<u16>,
    /// Each message asks the exit watcher to kill the process again
    pub(super) kill_tx: Option<mpsc::Sender<()>>,
    pub(super) exit_rx: watch::Receiver<Option<ExitReport>>,
}

pub(super) struct Inner {
    pub(super) settings: SupervisorSettings,
    launcher: Arc<dyn Launcher>,
    pub(super) store: Arc<dyn RecordStore>,
    pub(super) probe: Option<Arc<dyn LivenessProbe>>,
    ports: parking_lot::Mutex<PortPool>,
    pub(super) services: RwLock<HashMap<String, ServiceEntry>>,
    configs: parking_lot::RwLock<HashMap<String, ServiceConfig>>,
    pub(super) metrics: parking_lot::Mutex<HashMap<String, MetricsTracker>>,
    pub(super) sampler: parking_lot::Mutex<ProcessSampler>,
    restarts: parking_lot::Mutex<HashMap<String, JoinHandle<()>>>,
    events: broadcast::Sender<ServiceEvent>,
    observers: parking_lot::RwLock<Vec<Arc<dyn ServiceObserver>>>,
    generation: AtomicU64,
}

/// Supervisor for OS-process-backed agent services
///
/// Cloning is cheap; every clone drives the same set of processes.
#[derive(Clone)]
pub struct AgentServiceManager {
    pub(super) inner: Arc<Inner>,
}

impl AgentServiceManager {
    /// Create a supervisor using the worker binary and the HTTP probe from settings
    pub fn new(settings: SupervisorSettings, store: Arc<dyn RecordStore>) -> Result<Self> {
        let launcher: Arc<dyn Launcher> = Arc::new(BinaryLauncher::from_settings(&settings));
        let probe: Option<Arc<dyn LivenessProbe>> = if settings.http_probe {
            Some(Arc::new(HttpProbe::new(settings.probe_timeout())?))
        } else {
            None
        };
        Self::with_components(settings, store, launcher, probe)
    }

    pub fn with_components(
        settings: SupervisorSettings,
        store: Arc<dyn RecordStore>,
        launcher: Arc<dyn Launcher>,
        probe: Option<Arc<dyn LivenessProbe>>,
    ) -> Result<Self> {
        settings.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ports = PortPool::new(settings.port_range_start, settings.port_range_end);

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                launcher,
                store,
                probe,
                ports: parking_lot::Mutex::new(ports),
                services: RwLock::new(HashMap::new()),
                configs: parking_lot::RwLock::new(HashMap::new()),
                metrics: parking_lot::Mutex::new(HashMap::new()),
                sampler: parking_lot::Mutex::new(ProcessSampler::new()),
                restarts: parking_lot::Mutex::new(HashMap::new()),
                events,
                observers: parking_lot::RwLock::new(Vec::new()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Subscribe to lifecycle events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn ServiceObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Launch a new process for `config`
    pub async fn start(&self, config: ServiceConfig) -> Result<ServiceInstance> {
        config.validate()?;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (exit_tx, exit_rx) = watch::channel(None);

        let port = {
            let mut services = self.inner.services.write().await;
            if let Some(existing) = services.get(&config.id) {
                let status = existing.instance.status;
                let process_attached = existing.exit_rx.borrow().is_none();
                if status.is_active() || status == ServiceStatus::Stopping || process_attached {
                    return Err(Error::ServiceAlreadyExists {
                        id: config.id.clone(),
                    });
                }
            }

            let port = self.allocate_port(&config)?;
            services.insert(
                config.id.clone(),
                ServiceEntry {
                    instance: ServiceInstance::starting(&config, port),
                    generation,
                    held_port: Some(port),
                    kill_tx: None,
                    exit_rx,
                },
            );
            port
        };

        self.inner
            .configs
            .write()
            .insert(config.id.clone(), config.clone());
        info!(
            service_id = %config.id,
            agent_type = %config.agent_type,
            port,
            "Starting agent service"
        );

        match self.spawn_process(&config, port, generation, exit_tx).await {
            Ok(instance) => {
                self.persist(&instance).await;
                self.inner
                    .metrics
                    .lock()
                    .entry(config.id.clone())
                    .or_insert_with(|| MetricsTracker::new(self.inner.settings.metrics_window))
                    .mark_started(instance.started_at);

                info!(
                    service_id = %instance.id,
                    pid = ?instance.pid,
                    port,
                    "Agent service running"
                );
                self.publish(ServiceEvent::Started {
                    service_id: config.id.clone(),
                    name: config.display_name(),
                    agent_type: config.agent_type.clone(),
                    capabilities: config.capabilities.clone(),
                    pid: instance.pid.unwrap_or_default(),
                    port,
                })
                .await;
                Ok(instance)
            }
            Err(e) => {
                self.fail_start(&config.id, generation, &e).await;
                Err(e)
            }
        }
    }

    /// Terminate a service: graceful signal, then a forced kill after the grace period
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.cancel_restart(id);

        let (pid, kill_tx, exit_rx) = {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(id)
                .ok_or_else(|| Error::service_not_found(id))?;
            match entry.instance.status {
                ServiceStatus::Starting => {
                    return Err(Error::service_stop(id, "service is still starting"))
                }
                ServiceStatus::Stopping => {
                    return Err(Error::service_stop(id, "stop already in progress"))
                }
                _ => {}
            }
            entry.instance.set_status(ServiceStatus::Stopping);
            (
                entry.instance.pid,
                entry.kill_tx.clone(),
                entry.exit_rx.clone(),
            )
        };

        let already_exited = exit_rx.borrow().is_some();
        if !already_exited {
            info!(service_id = id, pid = ?pid, "Stopping agent service");
            let signalled = pid.map(request_termination).unwrap_or(false);
            let grace = if signalled {
                self.inner.settings.grace_period()
            } else {
                Duration::ZERO
            };

            if timeout(grace, wait_for_exit(exit_rx.clone()))
                .await
                .is_err()
            {
                warn!(
                    service_id = id,
                    grace_secs = grace.as_secs(),
                    "Service did not exit within grace period, forcing termination"
                );
                if let Some(kill_tx) = &kill_tx {
                    let _ = kill_tx.try_send(());
                }
                if timeout(FORCED_EXIT_TIMEOUT, wait_for_exit(exit_rx))
                    .await
                    .is_err()
                {
                    error!(service_id = id, pid = ?pid, "Service process survived forced termination");
                    if let Some(entry) = self.inner.services.write().await.get_mut(id) {
                        // Error rather than Stopping so a later stop can force again
                        entry
                            .instance
                            .record_error("Process could not be terminated");
                    }
                    return Err(Error::service_stop(
                        id,
                        "process did not exit after forced termination",
                    ));
                }
            }
        }

        let removed = self.inner.services.write().await.remove(id);
        if let Some(mut entry) = removed {
            if let Some(port) = entry.held_port.take() {
                self.inner.ports.lock().release(port);
                debug!(service_id = id, port, "Released port");
            }
            entry.instance.set_status(ServiceStatus::Stopped);
            self.persist(&entry.instance).await;
        }
        self.inner.metrics.lock().remove(id);

        info!(service_id = id, "Agent service stopped");
        self.publish(ServiceEvent::Stopped {
            service_id: id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Stop (if tracked) and start again with the retained configuration
    pub async fn restart(&self, id: &str) -> Result<ServiceInstance> {
        let config = self
            .inner
            .configs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::service_not_found(id))?;

        let tracked = self.inner.services.read().await.contains_key(id);
        if tracked {
            self.stop(id).await?;
        }
        self.start(config).await
    }

    /// Current view of one instance, falling back to the durable record
    pub async fn get_service_status(&self, id: &str) -> Result<ServiceInstance> {
        if let Some(entry) = self.inner.services.read().await.get(id) {
            return Ok(entry.instance.clone());
        }
        self.inner
            .store
            .find_service(id)
            .await?
            .ok_or_else(|| Error::service_not_found(id))
    }

    /// All tracked instances, sorted by id
    pub async fn get_all_services_status(&self) -> Vec<ServiceInstance> {
        let mut instances: Vec<_> = self
            .inner
            .services
            .read()
            .await
            .values()
            .map(|entry| entry.instance.clone())
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    pub fn get_service_metrics(&self, id: &str) -> Result<ServiceMetrics> {
        self.inner
            .metrics
            .lock()
            .get(id)
            .map(|tracker| tracker.snapshot(id))
            .ok_or_else(|| Error::service_not_found(id))
    }

    pub fn record_request(&self, id: &str, latency_ms: f64) -> Result<()> {
        let mut metrics = self.inner.metrics.lock();
        let tracker = metrics
            .get_mut(id)
            .ok_or_else(|| Error::service_not_found(id))?;
        tracker.record_request(latency_ms);
        Ok(())
    }

    pub fn record_error(&self, id: &str) -> Result<()> {
        let mut metrics = self.inner.metrics.lock();
        let tracker = metrics
            .get_mut(id)
            .ok_or_else(|| Error::service_not_found(id))?;
        tracker.record_error();
        Ok(())
    }

    /// Number of ports currently handed out
    pub fn held_port_count(&self) -> usize {
        self.inner.ports.lock().held_count()
    }

    /// Stop every tracked service and cancel pending restarts
    pub async fn shutdown_all(&self) -> Result<()> {
        let pending: Vec<_> = self.inner.restarts.lock().drain().collect();
        for (id, handle) in pending {
            debug!(service_id = %id, "Cancelling pending restart");
            handle.abort();
        }

        let ids: Vec<String> = self.inner.services.read().await.keys().cloned().collect();
        info!(count = ids.len(), "Shutting down all agent services");

        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                error!(service_id = %id, error = %e, "Failed to stop service during shutdown");
            }
        }

        info!("All agent services shut down");
        Ok(())
    }

    /// Mark durable records left active by a previous coordinator as stopped
    ///
    /// Child processes never outlive the coordinator, so any such record is stale.
    pub async fn reconcile(&self) -> Result<usize> {
        let tracked: HashSet<String> = self.inner.services.read().await.keys().cloned().collect();
        let records = self.inner.store.list_services(None).await?;

        let mut reconciled = 0;
        for mut record in records {
            let stale = record.status.is_active() || record.status == ServiceStatus::Stopping;
            if stale && !tracked.contains(&record.id) {
                debug!(service_id = %record.id, status = %record.status, "Marking stale service record stopped");
                record.pid = None;
                record.set_status(ServiceStatus::Stopped);
                self.inner.store.upsert_service(&record).await?;
                reconciled += 1;
            }
        }

        info!(reconciled, "Service records reconciled");
        Ok(reconciled)
    }

    fn allocate_port(&self, config: &ServiceConfig) -> Result<u16> {
        let mut pool = self.inner.ports.lock();
        match config.port {
            Some(port) => {
                if pool.reserve(port) {
                    Ok(port)
                } else {
                    Err(Error::NoAvailablePorts {
                        message: format!("port {} is already held by another service", port),
                    })
                }
            }
            None => pool.allocate().ok_or_else(|| {
                let (start, end) = pool.range();
                Error::NoAvailablePorts {
                    message: format!("all ports in {}-{} are in use", start, end),
                }
            }),
        }
    }

    async fn spawn_process(
        &self,
        config: &ServiceConfig,
        port: u16,
        generation: u64,
        exit_tx: watch::Sender<Option<ExitReport>>,
    ) -> Result<ServiceInstance> {
        let spec = LaunchSpec {
            service_id: config.id.clone(),
            agent_type: config.agent_type.clone(),
            port,
            database_url: self.inner.settings.database_url.clone(),
            environment: config.environment.clone(),
        };

        let mut command = self.inner.launcher.command(&spec)?;
        let mut child = command.spawn().map_err(|e| {
            error!(service_id = %config.id, error = %e, "Failed to spawn service process");
            Error::service_start(&config.id, format!("spawn failed: {}", e))
        })?;

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(Error::service_start(
                &config.id,
                "process exited before reporting a pid",
            ));
        };

        if let Some(stdout) = child.stdout.take() {
            spawn_output_capture(config.id.clone(), stdout, OutputStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_capture(config.id.clone(), stderr, OutputStream::Stderr);
        }

        let (kill_tx, kill_rx) = mpsc::channel(1);
        let instance = {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(&config.id)
                .filter(|entry| entry.generation == generation)
                .ok_or_else(|| {
                    Error::service_start(&config.id, "service entry vanished during start")
                })?;
            entry.instance.pid = Some(pid);
            entry.instance.set_status(ServiceStatus::Running);
            entry.kill_tx = Some(kill_tx);
            entry.instance.clone()
        };

        self.spawn_exit_watcher(config.id.clone(), generation, child, kill_rx, exit_tx);
        Ok(instance)
    }

    async fn fail_start(&self, id: &str, generation: u64, err: &Error) {
        let instance = {
            let mut services = self.inner.services.write().await;
            match services.get_mut(id) {
                Some(entry) if entry.generation == generation => {
                    if let Some(port) = entry.held_port.take() {
                        self.inner.ports.lock().release(port);
                    }
                    entry.instance.record_error(err.to_string());
                    entry.exit_rx = watch::channel(Some(ExitReport::Failed(err.to_string()))).1;
                    Some(entry.instance.clone())
                }
                _ => None,
            }
        };

        if let Some(instance) = instance {
            self.persist(&instance).await;
            self.publish(ServiceEvent::ProcessError {
                service_id: id.to_string(),
                message: err.to_string(),
            })
            .await;
        }
    }

    fn spawn_exit_watcher(
        &self,
        id: String,
        generation: u64,
        mut child: Child,
        mut kill_rx: mpsc::Receiver<()>,
        exit_tx: watch::Sender<Option<ExitReport>>,
    ) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(()) = kill_rx.recv() => {
                        debug!(service_id = %id, "Force killing service process");
                        if let Err(e) = child.start_kill() {
                            warn!(service_id = %id, error = %e, "Failed to send kill signal");
                        }
                    }
                }
            };

            let report = match status {
                Ok(status) => ExitReport::Exited {
                    code: status.code(),
                    success: status.success(),
                },
                Err(e) => ExitReport::Failed(format!("failed to wait for process: {}", e)),
            };
            let _ = exit_tx.send(Some(report.clone()));

            if let Some(inner) = weak.upgrade() {
                AgentServiceManager { inner }
                    .handle_exit(&id, generation, report)
                    .await;
            }
        });
    }

    async fn handle_exit(&self, id: &str, generation: u64, report: ExitReport) {
        let (event, instance, restart) = {
            let mut services = self.inner.services.write().await;
            let Some(entry) = services.get_mut(id) else {
                return;
            };
            if entry.generation != generation {
                return;
            }

            entry.kill_tx = None;
            if let Some(port) = entry.held_port.take() {
                self.inner.ports.lock().release(port);
                debug!(service_id = id, port, "Released port after exit");
            }
            if entry.instance.status == ServiceStatus::Stopping {
                debug!(service_id = id, "Process exited during stop");
                return;
            }

            let (event, restart) = match &report {
                ExitReport::Exited {
                    code,
                    success: true,
                } => {
                    info!(service_id = id, code = ?code, "Agent service exited");
                    entry.instance.set_status(ServiceStatus::Stopped);
                    (
                        ServiceEvent::Exited {
                            service_id: id.to_string(),
                            code: *code,
                            success: true,
                        },
                        false,
                    )
                }
                ExitReport::Exited {
                    code,
                    success: false,
                } => {
                    let reason = match code {
                        Some(code) => format!("process exited with code {}", code),
                        None => "process terminated by signal".to_string(),
                    };
                    warn!(service_id = id, code = ?code, "Agent service exited unexpectedly");
                    entry.instance.record_error(reason);
                    (
                        ServiceEvent::Exited {
                            service_id: id.to_string(),
                            code: *code,
                            success: false,
                        },
                        true,
                    )
                }
                ExitReport::Failed(message) => {
                    error!(service_id = id, error = %message, "Agent service process error");
                    entry.instance.record_error(message.clone());
                    (
                        ServiceEvent::ProcessError {
                            service_id: id.to_string(),
                            message: message.clone(),
                        },
                        false,
                    )
                }
            };
            (event, entry.instance.clone(), restart)
        };

        self.persist(&instance).await;
        self.publish(event).await;

        if restart {
            let config = self.inner.configs.read().get(id).cloned();
            if let Some(config) = config.filter(|c| c.auto_restart) {
                self.schedule_restart(config).await;
            }
        }
    }

    async fn schedule_restart(&self, config: ServiceConfig) {
        let id = config.id.clone();
        let delay = config.restart_delay();
        info!(service_id = %id, delay_secs = delay.as_secs(), "Scheduling service restart");

        let weak = Arc::downgrade(&self.inner);
        let task_id = id.clone();
        // The task removes its own entry, so it must not run before the insert
        {
            let mut restarts = self.inner.restarts.lock();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let manager = AgentServiceManager { inner };
                manager.inner.restarts.lock().remove(&task_id);

                match manager.start(config).await {
                    Ok(instance) => info!(
                        service_id = %task_id,
                        pid = ?instance.pid,
                        port = ?instance.port,
                        "Agent service restarted"
                    ),
                    Err(e) => error!(service_id = %task_id, error = %e, "Automatic restart failed"),
                }
            });

            if let Some(previous) = restarts.insert(id.clone(), handle) {
                previous.abort();
            }
            drop(restarts);
        }

        self.publish(ServiceEvent::RestartScheduled {
            service_id: id,
            delay_secs: delay.as_secs(),
        })
        .await;
    }

    fn cancel_restart(&self, id: &str) {
        if let Some(handle) = self.inner.restarts.lock().remove(id) {
            debug!(service_id = id, "Cancelled pending restart");
            handle.abort();
        }
    }

    pub(super) async fn persist(&self, instance: &ServiceInstance) {
        if let Err(e) = self.inner.store.upsert_service(instance).await {
            warn!(service_id = %instance.id, error = %e, "Failed to persist service record");
        }
    }

    pub(super) async fn publish(&self, event: ServiceEvent) {
        let observers: Vec<_> = self.inner.observers.read().clone();
        for observer in observers {
            observer.on_service_event(&event).await;
        }
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for AgentServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServiceManager")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

async fn wait_for_exit(mut exit_rx: watch::Receiver<Option<ExitReport>>) -> Option<ExitReport> {
    exit_rx
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|report| report.clone())
}

/// Send the graceful termination signal; false when none could be delivered
#[cfg(unix)]
fn request_termination(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!(pid, error = %e, "Failed to send SIGTERM");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_termination(_pid: u32) -> bool {
    false
}

/// Whether a process with this pid still exists
#[cfg(unix)]
pub(super) fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub(super) fn process_alive(_pid: u32) -> bool {
    true
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Forward child output lines into the log stream, tagged with the service id
fn spawn_output_capture<R>(service_id: String, reader: R, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match stream {
                    OutputStream::Stdout => {
                        info!(target: "agent_team::service_output", service_id = %service_id, "{}", line)
                    }
                    OutputStream::Stderr => {
                        warn!(target: "agent_team::service_output", service_id = %service_id, "{}", line)
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(service_id = %service_id, error = %e, "Output capture failed");
                    break;
                }
            }
        }
        debug!(service_id = %service_id, stream = ?stream, "Output capture ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::LaunchTarget;
    use crate::store::InMemoryStore;

    #[test]
    fn test_event_service_id_and_serialization() {
        let event = ServiceEvent::Exited {
            service_id: "svc-1".to_string(),
            code: Some(3),
            success: false,
        };
        assert_eq!(event.service_id(), "svc-1");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "exited");
        assert_eq!(json["code"], 3);
    }

    #[tokio::test]
    async fn test_wait_for_exit_sees_prior_value() {
        let (tx, rx) = watch::channel(None);
        tx.send(Some(ExitReport::Exited {
            code: Some(0),
            success: true,
        }))
        .unwrap();
        drop(tx);
        assert!(wait_for_exit(rx).await.is_some());

        let (_, rx) = watch::channel(Some(ExitReport::Failed("boom".to_string())));
        assert_eq!(
            wait_for_exit(rx).await,
            Some(ExitReport::Failed("boom".to_string()))
        );
    }

    fn test_manager() -> AgentServiceManager {
        let settings = SupervisorSettings::builder()
            .port_range(4400, 4410)
            .http_probe(false)
            .build()
            .unwrap();
        AgentServiceManager::with_components(
            settings,
            Arc::new(InMemoryStore::new()),
            Arc::new(BinaryLauncher::new(LaunchTarget::new(
                "/nonexistent/agent-team-worker",
            ))),
            None,
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_restart_leaves_no_pending_entry() {
        let manager = test_manager();
        let config = ServiceConfig::builder()
            .id("svc-1")
            .agent_type("developer")
            .auto_restart(true)
            .restart_delay_secs(0)
            .build()
            .unwrap();

        for _ in 0..20 {
            manager.schedule_restart(config.clone()).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(manager.inner.restarts.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn test_failed_forced_kill_can_be_retried() {
        let manager = test_manager();

        // Stand-in process that ignores the first kill and exits on the second
        let config = ServiceConfig::builder()
            .id("svc-1")
            .agent_type("developer")
            .build()
            .unwrap();
        let mut instance = ServiceInstance::starting(&config, 4400);
        instance.set_status(ServiceStatus::Running);
        let (kill_tx, mut kill_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);
        manager.inner.services.write().await.insert(
            "svc-1".to_string(),
            ServiceEntry {
                instance,
                generation: 1,
                held_port: None,
                kill_tx: Some(kill_tx),
                exit_rx,
            },
        );
        let process = tokio::spawn(async move {
            let mut kills = 0;
            while kill_rx.recv().await.is_some() {
                kills += 1;
                if kills == 2 {
                    let _ = exit_tx.send(Some(ExitReport::Exited {
                        code: None,
                        success: false,
                    }));
                    break;
                }
            }
            kills
        });

        let err = manager.stop("svc-1").await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_STOP_ERROR");
        let status = manager.get_service_status("svc-1").await.unwrap();
        assert_eq!(status.status, ServiceStatus::Error);

        manager.stop("svc-1").await.unwrap();
        assert_eq!(process.await.unwrap(), 2);
        assert_eq!(
            manager.get_service_status("svc-1").await.unwrap().status,
            ServiceStatus::Stopped
        );
    }
}
