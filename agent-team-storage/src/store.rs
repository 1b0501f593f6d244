//! [`RecordStore`] backed by SQLite

use async_trait::async_trait;

use crate::StorageManager;
use agent_team_core::agent::{AgentRecord, AgentStatus};
use agent_team_core::service::{ServiceInstance, ServiceStatus};
use agent_team_core::store::RecordStore;
use agent_team_core::task::{Assignment, TaskRecord};
use agent_team_core::Result;

#[async_trait]
impl RecordStore for StorageManager {
    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        Ok(self.agents().upsert(agent).await?)
    }

    async fn find_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.agents().find_by_id(id).await?)
    }

    async fn list_agents(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        Ok(self.agents().list(status).await?)
    }

    async fn upsert_service(&self, instance: &ServiceInstance) -> Result<()> {
        Ok(self.services().upsert(instance).await?)
    }

    async fn find_service(&self, id: &str) -> Result<Option<ServiceInstance>> {
        Ok(self.services().find_by_id(id).await?)
    }

    async fn list_services(&self, status: Option<ServiceStatus>) -> Result<Vec<ServiceInstance>> {
        Ok(self.services().list(status).await?)
    }

    async fn upsert_task(&self, task: &TaskRecord) -> Result<()> {
        Ok(self.tasks().upsert(task).await?)
    }

    async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks().find_by_id(id).await?)
    }

    async fn find_dependent_tasks(&self, task_id: &str) -> Result<Vec<TaskRecord>> {
        Ok(self.tasks().find_dependents(task_id).await?)
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        Ok(self.assignments().save(assignment).await?)
    }

    async fn find_active_assignment(&self, task_id: &str) -> Result<Option<Assignment>> {
        Ok(self.assignments().find_active(task_id).await?)
    }

    async fn list_assignments(&self, task_id: &str) -> Result<Vec<Assignment>> {
        Ok(self.assignments().list_for_task(task_id).await?)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(StorageManager::health_check(self).await?)
    }
}
