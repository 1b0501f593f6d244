//! Record store contract
//!
//! The supervisor and the coordinator keep their working state in memory and
//! mirror it to a [`RecordStore`]. After a coordinator restart the store is
//! the authoritative source (see `AgentCoordinator::reload` and
//! `AgentServiceManager::reconcile`).

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::agent::{AgentRecord, AgentStatus};
use crate::service::{ServiceInstance, ServiceStatus};
use crate::task::{Assignment, TaskRecord};
use crate::Result;

/// Durable storage for agents, service instances, tasks and assignments
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()>;
    async fn find_agent(&self, id: &str) -> Result<Option<AgentRecord>>;
    /// All agents, optionally restricted to one status
    async fn list_agents(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>>;

    async fn upsert_service(&self, instance: &ServiceInstance) -> Result<()>;
    async fn find_service(&self, id: &str) -> Result<Option<ServiceInstance>>;
    async fn list_services(&self, status: Option<ServiceStatus>) -> Result<Vec<ServiceInstance>>;

    async fn upsert_task(&self, task: &TaskRecord) -> Result<()>;
    async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>>;
    /// Tasks whose dependency list contains `task_id`
    async fn find_dependent_tasks(&self, task_id: &str) -> Result<Vec<TaskRecord>>;

    /// Insert or replace an assignment record by id
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;
    async fn find_active_assignment(&self, task_id: &str) -> Result<Option<Assignment>>;
    async fn list_assignments(&self, task_id: &str) -> Result<Vec<Assignment>>;

    /// Cheap round trip used by health reporting
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-local record store
#[derive(Default)]
pub struct InMemoryStore {
    agents: RwLock<HashMap<String, AgentRecord>>,
    services: RwLock<HashMap<String, ServiceInstance>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
    assignments: RwLock<Vec<Assignment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.agents.write().insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn find_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.agents.read().get(id).cloned())
    }

    async fn list_agents(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        let mut agents: Vec<_> = self
            .agents
            .read()
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn upsert_service(&self, instance: &ServiceInstance) -> Result<()> {
        self.services
            .write()
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn find_service(&self, id: &str) -> Result<Option<ServiceInstance>> {
        Ok(self.services.read().get(id).cloned())
    }

    async fn list_services(&self, status: Option<ServiceStatus>) -> Result<Vec<ServiceInstance>> {
        let mut services: Vec<_> = self
            .services
            .read()
            .values()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }

    async fn upsert_task(&self, task: &TaskRecord) -> Result<()> {
        self.tasks.write().insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().get(id).cloned())
    }

    async fn find_dependent_tasks(&self, task_id: &str) -> Result<Vec<TaskRecord>> {
        let mut tasks: Vec<_> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.dependencies.iter().any(|d| d == task_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        let mut assignments = self.assignments.write();
        match assignments.iter_mut().find(|a| a.id == assignment.id) {
            Some(existing) => *existing = assignment.clone(),
            None => assignments.push(assignment.clone()),
        }
        Ok(())
    }

    async fn find_active_assignment(&self, task_id: &str) -> Result<Option<Assignment>> {
        Ok(self
            .assignments
            .read()
            .iter()
            .find(|a| a.task_id == task_id && a.is_active())
            .cloned())
    }

    async fn list_assignments(&self, task_id: &str) -> Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .read()
            .iter()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }
}
