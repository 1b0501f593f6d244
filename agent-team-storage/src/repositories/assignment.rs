//! Assignment repository implementation

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

use super::parse_column;
use crate::{Error, Result};
use agent_team_core::task::Assignment;

const ENTITY: &str = "assignment";

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: String,
    task_id: String,
    agent_id: String,
    kind: String,
    status: String,
    priority: String,
    reason: Option<String>,
    escalated_to: Option<String>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl AssignmentRow {
    fn into_assignment(self) -> Result<Assignment> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::invalid_record(ENTITY, &self.id, e.to_string()))?;
        Ok(Assignment {
            id,
            kind: parse_column(ENTITY, &self.id, &self.kind)?,
            status: parse_column(ENTITY, &self.id, &self.status)?,
            priority: parse_column(ENTITY, &self.id, &self.priority)?,
            task_id: self.task_id,
            agent_id: self.agent_id,
            reason: self.reason,
            escalated_to: self.escalated_to,
            created_at: self.created_at,
            closed_at: self.closed_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, task_id, agent_id, kind, status, priority, reason, \
     escalated_to, created_at, closed_at FROM assignments";

/// Repository for task assignment records
pub struct AssignmentRepository {
    pool: Pool<Sqlite>,
}

impl AssignmentRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert or replace by id
    ///
    /// Fails on a second active assignment for the same task.
    pub async fn save(&self, assignment: &Assignment) -> Result<()> {
        debug!(
            assignment_id = %assignment.id,
            task_id = %assignment.task_id,
            status = %assignment.status,
            "Saving assignment"
        );

        sqlx::query(
            r#"
            INSERT INTO assignments
                (id, task_id, agent_id, kind, status, priority, reason, escalated_to, created_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                agent_id = excluded.agent_id,
                status = excluded.status,
                priority = excluded.priority,
                reason = excluded.reason,
                escalated_to = excluded.escalated_to,
                closed_at = excluded.closed_at
            "#,
        )
        .bind(assignment.id.to_string())
        .bind(&assignment.task_id)
        .bind(&assignment.agent_id)
        .bind(assignment.kind.to_string())
        .bind(assignment.status.to_string())
        .bind(assignment.priority.to_string())
        .bind(&assignment.reason)
        .bind(&assignment.escalated_to)
        .bind(assignment.created_at)
        .bind(assignment.closed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_active(&self, task_id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "{} WHERE task_id = ?1 AND status = 'active'",
            SELECT_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssignmentRow::into_assignment).transpose()
    }

    /// Every record for a task, oldest first
    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "{} WHERE task_id = ?1 ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssignmentRow::into_assignment).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assignments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::TaskRepository;
    use crate::schema::run_migrations;
    use agent_team_core::task::{AssignmentKind, AssignmentStatus, TaskPriority, TaskRecord};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> AssignmentRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let tasks = TaskRepository::new(pool.clone());
        tasks.upsert(&TaskRecord::new("t1", "Task one")).await.unwrap();
        AssignmentRepository::new(pool)
    }

    #[tokio::test]
    async fn test_active_assignment_lifecycle() {
        let repo = setup_test_db().await;
        let mut primary = Assignment::primary("t1", "dev-1", TaskPriority::High);
        repo.save(&primary).await.unwrap();

        let active = repo.find_active("t1").await.unwrap().unwrap();
        assert_eq!(active, primary);

        primary.complete();
        repo.save(&primary).await.unwrap();
        assert!(repo.find_active("t1").await.unwrap().is_none());

        let all = repo.list_for_task("t1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AssignmentStatus::Completed);
        assert!(all[0].closed_at.is_some());
    }

    #[tokio::test]
    async fn test_second_active_assignment_is_rejected() {
        let repo = setup_test_db().await;
        repo.save(&Assignment::primary("t1", "dev-1", TaskPriority::Medium))
            .await
            .unwrap();

        let err = repo
            .save(&Assignment::primary("t1", "dev-2", TaskPriority::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_escalation_records_are_not_active() {
        let repo = setup_test_db().await;
        let primary = Assignment::primary("t1", "dev-1", TaskPriority::Medium);
        repo.save(&primary).await.unwrap();
        let escalation = Assignment::escalation(
            "t1",
            "dev-1",
            "needs a product decision",
            Some("lead"),
            TaskPriority::Medium,
        );
        repo.save(&escalation).await.unwrap();

        assert_eq!(repo.find_active("t1").await.unwrap().unwrap().id, primary.id);
        let all = repo.list_for_task("t1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].kind, AssignmentKind::Escalation);
        assert_eq!(all[1].escalated_to.as_deref(), Some("lead"));
    }

    #[tokio::test]
    async fn test_assignment_requires_known_task() {
        let repo = setup_test_db().await;
        let err = repo
            .save(&Assignment::primary("ghost", "dev-1", TaskPriority::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
