//! Health checks for running service instances
//!
//! Checks are advisory. A failed check records the failure on the instance and
//! in its metrics but never stops or restarts the process; restarts are driven
//! by process exit only.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::metrics::MetricsTracker;
use super::supervisor::{process_alive, AgentServiceManager, ServiceEvent};
use crate::service::{ServiceInstance, ServiceStatus};
use crate::{Error, Result};

impl AgentServiceManager {
    /// Check one instance
    ///
    /// Returns `Ok(false)` for instances that are not running or fail the
    /// check; only an unknown id is an error.
    pub async fn check_health(&self, id: &str) -> Result<bool> {
        let (generation, pid, port, exited) = {
            let services = self.inner.services.read().await;
            let entry = services
                .get(id)
                .ok_or_else(|| Error::service_not_found(id))?;
            if entry.instance.status != ServiceStatus::Running {
                return Ok(false);
            }
            let exited = entry.exit_rx.borrow().is_some();
            (
                entry.generation,
                entry.instance.pid,
                entry.instance.port,
                exited,
            )
        };
        let checked_at = Utc::now();

        let alive = !exited && pid.map_or(false, process_alive);
        if !alive {
            warn!(service_id = id, pid = ?pid, "Service process is not alive");
            self.with_tracker(id, MetricsTracker::record_error);
            let updated = self
                .update_checked(id, generation, checked_at, |instance| {
                    instance.record_error("process is not alive");
                })
                .await;
            if let Some(instance) = updated {
                self.persist(&instance).await;
            }
            self.publish(ServiceEvent::HealthChecked {
                service_id: id.to_string(),
                healthy: false,
            })
            .await;
            return Ok(false);
        }

        let mut probe_error = None;
        if let (Some(probe), Some(port)) = (self.inner.probe.clone(), port) {
            match probe.probe(id, port).await {
                Ok(latency) => {
                    let latency_ms = latency.as_secs_f64() * 1000.0;
                    self.with_tracker(id, |tracker| tracker.record_request(latency_ms));
                }
                Err(e) => {
                    debug!(service_id = id, error = %e, "Health probe failed");
                    self.with_tracker(id, MetricsTracker::record_error);
                    probe_error = Some(e.to_string());
                }
            }
        }

        if let Some(pid) = pid {
            let sample = self.inner.sampler.lock().sample(pid);
            if let Some((memory_bytes, cpu_percent)) = sample {
                self.with_tracker(id, |tracker| {
                    tracker.record_resources(memory_bytes, cpu_percent)
                });
            }
        }

        let healthy = probe_error.is_none();
        let updated = self
            .update_checked(id, generation, checked_at, |instance| {
                if let Some(message) = probe_error {
                    instance.last_error = Some(message);
                }
            })
            .await;
        if let Some(instance) = updated {
            self.persist(&instance).await;
        }

        self.publish(ServiceEvent::HealthChecked {
            service_id: id.to_string(),
            healthy,
        })
        .await;
        Ok(healthy)
    }

    /// Check every running instance concurrently
    pub async fn check_all_services(&self) -> Vec<(String, bool)> {
        let ids: Vec<String> = self
            .inner
            .services
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.instance.status == ServiceStatus::Running)
            .map(|(id, _)| id.clone())
            .collect();

        let results = join_all(ids.iter().map(|id| self.check_health(id))).await;
        ids.into_iter()
            .zip(results)
            .map(|(id, result)| {
                let healthy = result.unwrap_or_else(|e| {
                    debug!(service_id = %id, error = %e, "Service vanished before its check");
                    false
                });
                (id, healthy)
            })
            .collect()
    }

    /// Run [`check_all_services`](Self::check_all_services) on the configured interval
    ///
    /// The loop ends once every handle to the supervisor has been dropped.
    pub fn spawn_health_monitor(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.health_check_interval();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            info!(interval_secs = period.as_secs(), "Health monitor started");

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = AgentServiceManager { inner };
                let results = manager.check_all_services().await;
                let unhealthy = results.iter().filter(|(_, healthy)| !healthy).count();
                debug!(
                    checked = results.len(),
                    unhealthy, "Health check cycle completed"
                );
            }
            debug!("Health monitor stopped");
        })
    }

    fn with_tracker<F: FnOnce(&mut MetricsTracker)>(&self, id: &str, f: F) {
        if let Some(tracker) = self.inner.metrics.lock().get_mut(id) {
            f(tracker);
        }
    }

    async fn update_checked<F: FnOnce(&mut ServiceInstance)>(
        &self,
        id: &str,
        generation: u64,
        checked_at: DateTime<Utc>,
        f: F,
    ) -> Option<ServiceInstance> {
        let mut services = self.inner.services.write().await;
        let entry = services
            .get_mut(id)
            .filter(|entry| entry.generation == generation)?;
        // Exit handling may have settled the instance in the meantime
        if entry.instance.status != ServiceStatus::Running {
            return None;
        }
        entry.instance.last_health_check = Some(checked_at);
        f(&mut entry.instance);
        Some(entry.instance.clone())
    }
}
