//! Task repository implementation

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use tracing::debug;

use super::parse_column;
use crate::Result;
use agent_team_core::task::TaskRecord;

const ENTITY: &str = "task";

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    status: String,
    priority: String,
    preferred_agent_type: Option<String>,
    required_capabilities: String,
    dependencies: String,
    assigned_agent_id: Option<String>,
    result: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_record(self) -> Result<TaskRecord> {
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(TaskRecord {
            status: parse_column(ENTITY, &self.id, &self.status)?,
            priority: parse_column(ENTITY, &self.id, &self.priority)?,
            required_capabilities: serde_json::from_str(&self.required_capabilities)?,
            dependencies: serde_json::from_str(&self.dependencies)?,
            result,
            id: self.id,
            title: self.title,
            preferred_agent_type: self.preferred_agent_type,
            assigned_agent_id: self.assigned_agent_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, title, status, priority, preferred_agent_type, \
     required_capabilities, dependencies, assigned_agent_id, result, created_at, updated_at \
     FROM tasks";

/// Repository for task records
pub struct TaskRepository {
    pool: Pool<Sqlite>,
}

impl TaskRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, task: &TaskRecord) -> Result<()> {
        debug!(task_id = %task.id, status = %task.status, "Upserting task");
        let required_capabilities = serde_json::to_string(&task.required_capabilities)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, title, status, priority, preferred_agent_type, required_capabilities,
                 dependencies, assigned_agent_id, result, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                priority = excluded.priority,
                preferred_agent_type = excluded.preferred_agent_type,
                required_capabilities = excluded.required_capabilities,
                dependencies = excluded.dependencies,
                assigned_agent_id = excluded.assigned_agent_id,
                result = excluded.result,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(task.status.to_string())
        .bind(task.priority.to_string())
        .bind(&task.preferred_agent_type)
        .bind(required_capabilities)
        .bind(dependencies)
        .bind(&task.assigned_agent_id)
        .bind(result)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskRow::into_record).transpose()
    }

    /// Tasks that list `task_id` among their dependencies, oldest first
    pub async fn find_dependents(&self, task_id: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{} WHERE EXISTS (SELECT 1 FROM json_each(tasks.dependencies) WHERE json_each.value = ?1) \
             ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::into_record).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use agent_team_core::task::{TaskPriority, TaskStatus};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> TaskRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        TaskRepository::new(pool)
    }

    #[tokio::test]
    async fn test_task_round_trip_with_routing_hints() {
        let repo = setup_test_db().await;
        let mut task = TaskRecord::new("t1", "Write integration tests")
            .with_requirement("testing")
            .with_preferred_type("qa_engineer")
            .with_priority(TaskPriority::High);
        repo.upsert(&task).await.unwrap();
        assert_eq!(repo.find_by_id("t1").await.unwrap().unwrap(), task);

        task.assigned_agent_id = Some("qa-1".to_string());
        task.result = Some(json!({"passed": 12, "failed": 0}));
        task.set_status(TaskStatus::Completed);
        repo.upsert(&task).await.unwrap();

        let found = repo.find_by_id("t1").await.unwrap().unwrap();
        assert_eq!(found.status, TaskStatus::Completed);
        assert_eq!(found.result, Some(json!({"passed": 12, "failed": 0})));
        assert_eq!(found.assigned_agent_id.as_deref(), Some("qa-1"));
    }

    #[tokio::test]
    async fn test_find_dependents() {
        let repo = setup_test_db().await;
        repo.upsert(&TaskRecord::new("build", "Build")).await.unwrap();
        repo.upsert(&TaskRecord::new("test", "Test").with_dependency("build"))
            .await
            .unwrap();
        repo.upsert(
            &TaskRecord::new("deploy", "Deploy")
                .with_dependency("build")
                .with_dependency("test"),
        )
        .await
        .unwrap();
        // Substring of a dependency id must not match
        repo.upsert(&TaskRecord::new("docs", "Docs").with_dependency("build-docs"))
            .await
            .unwrap();

        let dependents: Vec<String> = repo
            .find_dependents("build")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(dependents, vec!["test", "deploy"]);

        let dependents = repo.find_dependents("test").await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, "deploy");

        assert!(repo.find_dependents("deploy").await.unwrap().is_empty());
    }
}
