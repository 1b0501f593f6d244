//! Live agent registry and task assignment engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::selection::select_agent;
use crate::agent::{AgentInfo, AgentRecord, AgentStatus};
use crate::config::CoordinationSettings;
use crate::event::{CoordinationEvent, CoordinationEventType, EventLog};
use crate::orchestration::{ServiceEvent, ServiceObserver};
use crate::store::RecordStore;
use crate::task::{
    Assignment, CompletionOutcome, TaskAssignmentRequest, TaskRecord, TaskStatus, UnblockedTask,
};
use crate::{Error, Result};

/// Directory of known agents and router of work among them
///
/// The in-memory table is the working copy; every change is mirrored to the
/// record store afterwards. [`reload`](Self::reload) rebuilds the table from
/// the store after a restart.
pub struct AgentCoordinator {
    settings: CoordinationSettings,
    store: Arc<dyn RecordStore>,
    agents: RwLock<HashMap<String, AgentRecord>>,
    events: parking_lot::Mutex<EventLog>,
    /// Serializes the check-then-assign pipeline so a task never gets two
    /// active assignments
    assignment_lock: Mutex<()>,
}

impl AgentCoordinator {
    pub fn new(settings: CoordinationSettings, store: Arc<dyn RecordStore>) -> Result<Self> {
        settings.validate()?;
        let events = EventLog::new(settings.event_log_capacity);
        Ok(Self {
            settings,
            store,
            agents: RwLock::new(HashMap::new()),
            events: parking_lot::Mutex::new(events),
            assignment_lock: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &CoordinationSettings {
        &self.settings
    }

    /// Rebuild the live registry from durable records that are not offline
    pub async fn reload(&self) -> Result<usize> {
        let records = self.store.list_agents(None).await?;
        let mut agents = self.agents.write().await;
        let mut loaded = 0;
        for record in records {
            if record.status == AgentStatus::Offline || agents.contains_key(&record.id) {
                continue;
            }
            agents.insert(record.id.clone(), record);
            loaded += 1;
        }
        info!(loaded, "Agent registry reloaded from store");
        Ok(loaded)
    }

    /// Upsert an agent; repeated registration keeps its workload
    pub async fn register(&self, info: AgentInfo) -> Result<AgentRecord> {
        let record = {
            let mut agents = self.agents.write().await;
            match agents.get_mut(&info.id) {
                Some(existing) => {
                    existing.refresh(info);
                    existing.clone()
                }
                None => {
                    let record = AgentRecord::from_info(info);
                    agents.insert(record.id.clone(), record.clone());
                    record
                }
            }
        };

        self.persist_agent(&record).await;
        info!(
            agent_id = %record.id,
            agent_type = %record.agent_type,
            workload = record.workload,
            "Agent registered"
        );
        self.emit(
            CoordinationEvent::new(CoordinationEventType::AgentStarted)
                .agent(&record.id)
                .details(json!({
                    "name": record.name,
                    "agent_type": record.agent_type,
                    "capabilities": record.capabilities,
                })),
        );
        Ok(record)
    }

    /// Change an agent's status without touching its workload
    ///
    /// `offline` is reserved for removal from the registry, and `idle`/`busy`
    /// must agree with the workload.
    pub async fn update_status(&self, id: &str, status: AgentStatus) -> Result<AgentRecord> {
        let record = {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(id)
                .ok_or_else(|| Error::agent_not_found(id))?;

            match status {
                AgentStatus::Offline => {
                    return Err(Error::validation(
                        "Offline status is only assigned when an agent leaves the registry",
                    ))
                }
                AgentStatus::Idle if agent.workload > 0 => {
                    return Err(Error::validation(format!(
                        "Agent {} has {} assignments in flight and cannot be idle",
                        id, agent.workload
                    )))
                }
                AgentStatus::Busy if agent.workload == 0 => {
                    return Err(Error::validation(format!(
                        "Agent {} has no assignments and cannot be busy",
                        id
                    )))
                }
                _ => {}
            }

            agent.status = status;
            agent.touch();
            agent.clone()
        };

        self.persist_agent(&record).await;
        debug!(agent_id = id, status = %status, "Agent status updated");
        Ok(record)
    }

    /// Refresh an agent's last seen time
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| Error::agent_not_found(id))?;
        agent.touch();
        Ok(())
    }

    pub async fn get_agent(&self, id: &str) -> Result<AgentRecord> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::agent_not_found(id))
    }

    /// Agents in the live registry, sorted by id
    pub async fn get_active_agents(&self) -> Vec<AgentRecord> {
        let mut agents: Vec<_> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// The most recent `limit` coordination events, oldest first
    pub fn get_coordination_events(&self, limit: usize) -> Vec<CoordinationEvent> {
        self.events.lock().recent(limit)
    }

    /// Store a new task so it can be assigned
    pub async fn create_task(&self, task: TaskRecord) -> Result<TaskRecord> {
        if task.id.trim().is_empty() {
            return Err(Error::validation("Task id cannot be empty"));
        }
        if task.dependencies.iter().any(|dep| dep == &task.id) {
            return Err(Error::validation(format!(
                "Task {} cannot depend on itself",
                task.id
            )));
        }
        self.store.upsert_task(&task).await?;
        debug!(task_id = %task.id, dependencies = ?task.dependencies, "Task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> Result<TaskRecord> {
        self.store
            .find_task(id)
            .await?
            .ok_or_else(|| Error::task_not_found(id))
    }

    /// Route a task to the best available agent and return its id
    pub async fn assign_task(&self, request: TaskAssignmentRequest) -> Result<String> {
        let _guard = self.assignment_lock.lock().await;
        let task_id = request.task_id.clone();

        let mut task = self
            .store
            .find_task(&task_id)
            .await
            .map_err(|e| Error::task_assignment(&task_id, e.to_string()))?
            .ok_or_else(|| Error::task_not_found(&task_id))?;
        if task.is_terminal() {
            return Err(Error::task_assignment(
                &task_id,
                format!("task is already {}", task.status),
            ));
        }
        let active = self
            .store
            .find_active_assignment(&task_id)
            .await
            .map_err(|e| Error::task_assignment(&task_id, e.to_string()))?;
        if let Some(active) = active {
            return Err(Error::task_assignment(
                &task_id,
                format!(
                    "task already has an active assignment to {}",
                    active.agent_id
                ),
            ));
        }

        let agent = {
            let mut agents = self.agents.write().await;
            let selected = select_agent(agents.values(), &request, self.settings.max_workload)
                .map(|agent| agent.id.clone())
                .ok_or_else(|| Error::NoAvailableAgent {
                    task_id: task_id.clone(),
                })?;
            let agent = agents
                .get_mut(&selected)
                .ok_or_else(|| Error::agent_not_found(&selected))?;
            agent.begin_assignment();
            agent.clone()
        };

        let assignment = Assignment::primary(&task_id, &agent.id, request.priority);
        task.assigned_agent_id = Some(agent.id.clone());
        task.set_status(TaskStatus::Assigned);

        let persisted = match self.store.save_assignment(&assignment).await {
            Ok(()) => self.store.upsert_task(&task).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            warn!(task_id = %task_id, agent_id = %agent.id, error = %e, "Rolling back assignment");
            if let Some(agent) = self.agents.write().await.get_mut(&agent.id) {
                agent.finish_assignment();
            }
            return Err(Error::task_assignment(&task_id, e.to_string()));
        }
        self.persist_agent(&agent).await;

        info!(
            task_id = %task_id,
            agent_id = %agent.id,
            workload = agent.workload,
            priority = %request.priority,
            "Task assigned"
        );
        self.emit(
            CoordinationEvent::new(CoordinationEventType::TaskAssigned)
                .agent(&agent.id)
                .task(&task_id)
                .details(json!({
                    "priority": request.priority,
                    "workload": agent.workload,
                })),
        );
        Ok(agent.id)
    }

    /// Mark a task completed, release the agent and assign newly unblocked dependents
    pub async fn complete_task(
        &self,
        task_id: &str,
        agent_id: &str,
        result: Option<serde_json::Value>,
    ) -> Result<CompletionOutcome> {
        // Held through the workload decrement; the cascade below takes it again
        let guard = self.assignment_lock.lock().await;
        let mut task = self
            .store
            .find_task(task_id)
            .await
            .map_err(|e| Error::task_completion(task_id, e.to_string()))?
            .ok_or_else(|| Error::task_not_found(task_id))?;
        if task.status == TaskStatus::Completed {
            return Err(Error::task_completion(task_id, "task is already completed"));
        }

        let active = self
            .store
            .find_active_assignment(task_id)
            .await
            .map_err(|e| Error::task_completion(task_id, e.to_string()))?;
        let held_by_agent = match active {
            Some(assignment) if assignment.agent_id != agent_id => {
                return Err(Error::task_completion(
                    task_id,
                    format!("task is assigned to {}", assignment.agent_id),
                ));
            }
            Some(mut assignment) => {
                assignment.complete();
                self.store
                    .save_assignment(&assignment)
                    .await
                    .map_err(|e| Error::task_completion(task_id, e.to_string()))?;
                true
            }
            None => false,
        };

        task.result = result;
        task.set_status(TaskStatus::Completed);
        self.store
            .upsert_task(&task)
            .await
            .map_err(|e| Error::task_completion(task_id, e.to_string()))?;

        let released = if held_by_agent {
            let mut agents = self.agents.write().await;
            agents.get_mut(agent_id).map(|agent| {
                agent.finish_assignment();
                agent.clone()
            })
        } else {
            None
        };
        if let Some(agent) = &released {
            self.persist_agent(agent).await;
        }
        drop(guard);

        info!(
            task_id,
            agent_id,
            workload = ?released.as_ref().map(|agent| agent.workload),
            "Task completed"
        );
        self.emit(
            CoordinationEvent::new(CoordinationEventType::TaskCompleted)
                .agent(agent_id)
                .task(task_id),
        );

        let unblocked = self.assign_unblocked_dependents(task_id).await;
        Ok(CompletionOutcome {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            unblocked,
        })
    }

    /// Hand a task to a human or another agent without closing the original assignment
    pub async fn escalate_task(
        &self,
        task_id: &str,
        from_agent_id: &str,
        reason: &str,
        to_user_id: Option<&str>,
    ) -> Result<Assignment> {
        let _guard = self.assignment_lock.lock().await;
        let mut task = self
            .store
            .find_task(task_id)
            .await
            .map_err(|e| Error::escalation(task_id, e.to_string()))?
            .ok_or_else(|| Error::task_not_found(task_id))?;
        if task.is_terminal() {
            return Err(Error::escalation(
                task_id,
                format!("task is already {}", task.status),
            ));
        }

        let escalation =
            Assignment::escalation(task_id, from_agent_id, reason, to_user_id, task.priority);
        self.store
            .save_assignment(&escalation)
            .await
            .map_err(|e| Error::escalation(task_id, e.to_string()))?;

        task.set_status(TaskStatus::Escalated);
        self.store
            .upsert_task(&task)
            .await
            .map_err(|e| Error::escalation(task_id, e.to_string()))?;

        warn!(task_id, from_agent_id, reason, to_user_id = ?to_user_id, "Task escalated");
        self.emit(
            CoordinationEvent::new(CoordinationEventType::Escalation)
                .agent(from_agent_id)
                .task(task_id)
                .details(json!({
                    "reason": reason,
                    "to_user_id": to_user_id,
                })),
        );
        Ok(escalation)
    }

    /// Remove agents not seen within the staleness timeout
    pub async fn sweep_stale_agents(&self) -> Vec<String> {
        self.sweep_stale_agents_at(Utc::now()).await
    }

    /// Sweep against an explicit clock
    pub async fn sweep_stale_agents_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = self.settings.staleness_timeout();
        let stale: Vec<AgentRecord> = {
            let mut agents = self.agents.write().await;
            let ids: Vec<String> = agents
                .values()
                .filter(|agent| agent.is_stale(now, timeout))
                .map(|agent| agent.id.clone())
                .collect();
            ids.iter().filter_map(|id| agents.remove(id)).collect()
        };

        let mut removed = Vec::with_capacity(stale.len());
        for mut agent in stale {
            agent.status = AgentStatus::Offline;
            self.persist_agent(&agent).await;
            warn!(agent_id = %agent.id, last_seen = %agent.last_seen, "Agent timed out");
            self.emit(
                CoordinationEvent::new(CoordinationEventType::AgentStopped)
                    .agent(&agent.id)
                    .details(json!({
                        "reason": "timeout",
                        "last_seen": agent.last_seen,
                    })),
            );
            removed.push(agent.id);
        }
        removed
    }

    /// Run the staleness sweep on the configured interval
    pub fn spawn_staleness_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.settings.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                let removed = coordinator.sweep_stale_agents().await;
                if !removed.is_empty() {
                    info!(count = removed.len(), "Staleness sweep removed agents");
                }
            }
        })
    }

    async fn assign_unblocked_dependents(&self, task_id: &str) -> Vec<UnblockedTask> {
        let dependents = match self.store.find_dependent_tasks(task_id).await {
            Ok(dependents) => dependents,
            Err(e) => {
                warn!(task_id, error = %e, "Failed to load dependent tasks");
                return Vec::new();
            }
        };

        let mut unblocked = Vec::new();
        for dependent in dependents {
            if dependent.status != TaskStatus::Pending {
                continue;
            }
            match self.dependencies_satisfied(&dependent).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(task_id = %dependent.id, "Dependent task still blocked");
                    continue;
                }
                Err(e) => {
                    warn!(task_id = %dependent.id, error = %e, "Failed to check dependencies");
                    continue;
                }
            }

            match self.assign_task(dependent.assignment_request()).await {
                Ok(agent_id) => {
                    info!(task_id = %dependent.id, agent_id = %agent_id, unblocked_by = task_id, "Unblocked task assigned");
                    unblocked.push(UnblockedTask {
                        task_id: dependent.id,
                        agent_id,
                    });
                }
                Err(e) => {
                    warn!(task_id = %dependent.id, error = %e, "Failed to assign unblocked task");
                }
            }
        }
        unblocked
    }

    async fn dependencies_satisfied(&self, task: &TaskRecord) -> Result<bool> {
        for dependency in &task.dependencies {
            let completed = self
                .store
                .find_task(dependency)
                .await?
                .map_or(false, |dep| dep.status == TaskStatus::Completed);
            if !completed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop an agent from the live registry and persist it offline
    async fn remove_agent(&self, id: &str, reason: &str) {
        let removed = self.agents.write().await.remove(id);
        let Some(mut agent) = removed else {
            return;
        };
        agent.status = AgentStatus::Offline;
        self.persist_agent(&agent).await;
        info!(agent_id = id, reason, "Agent removed from registry");
        self.emit(
            CoordinationEvent::new(CoordinationEventType::AgentStopped)
                .agent(id)
                .details(json!({ "reason": reason })),
        );
    }

    async fn mark_error(&self, id: &str, message: &str) {
        let record = {
            let mut agents = self.agents.write().await;
            agents.get_mut(id).map(|agent| {
                agent.status = AgentStatus::Error;
                agent.clone()
            })
        };
        if let Some(record) = record {
            warn!(agent_id = id, error = message, "Agent marked as failed");
            self.persist_agent(&record).await;
        }
    }

    async fn persist_agent(&self, agent: &AgentRecord) {
        if let Err(e) = self.store.upsert_agent(agent).await {
            warn!(agent_id = %agent.id, error = %e, "Failed to persist agent record");
        }
    }

    fn emit(&self, event: CoordinationEvent) {
        debug!(
            event_type = %event.event_type,
            agent_id = ?event.agent_id,
            task_id = ?event.task_id,
            "Coordination event"
        );
        self.events.lock().push(event);
    }
}

#[async_trait]
impl ServiceObserver for AgentCoordinator {
    async fn on_service_event(&self, event: &ServiceEvent) {
        match event {
            ServiceEvent::Started {
                service_id,
                name,
                agent_type,
                capabilities,
                ..
            } => {
                let info = AgentInfo::builder()
                    .id(service_id)
                    .name(name)
                    .agent_type(agent_type)
                    .capabilities(capabilities.iter().cloned())
                    .build();
                match info {
                    Ok(info) => {
                        if let Err(e) = self.register(info).await {
                            warn!(service_id = %service_id, error = %e, "Failed to register service agent");
                        }
                    }
                    Err(e) => {
                        warn!(service_id = %service_id, error = %e, "Service cannot be registered as an agent")
                    }
                }
            }
            ServiceEvent::Stopped { service_id } => self.remove_agent(service_id, "stopped").await,
            ServiceEvent::Exited {
                service_id,
                success: true,
                ..
            } => self.remove_agent(service_id, "exited").await,
            ServiceEvent::Exited {
                service_id,
                code,
                success: false,
            } => {
                let message = match code {
                    Some(code) => format!("service exited with code {}", code),
                    None => "service terminated by signal".to_string(),
                };
                self.mark_error(service_id, &message).await
            }
            ServiceEvent::ProcessError {
                service_id,
                message,
            } => self.mark_error(service_id, message).await,
            ServiceEvent::HealthChecked {
                service_id,
                healthy: true,
            } => {
                if let Err(e) = self.heartbeat(service_id).await {
                    debug!(service_id = %service_id, error = %e, "Heartbeat for unregistered service");
                }
            }
            ServiceEvent::HealthChecked { .. } | ServiceEvent::RestartScheduled { .. } => {}
        }
    }
}

impl std::fmt::Debug for AgentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCoordinator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
