//! Service instance repository implementation

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use tracing::debug;

use super::{narrow, parse_column};
use crate::Result;
use agent_team_core::service::{ServiceInstance, ServiceStatus};

const ENTITY: &str = "service";

#[derive(Debug, FromRow)]
struct ServiceRow {
    id: String,
    agent_type: String,
    port: Option<i64>,
    pid: Option<i64>,
    status: String,
    error_count: i64,
    last_error: Option<String>,
    last_health_check: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_instance(self) -> Result<ServiceInstance> {
        let id = self.id.as_str();
        Ok(ServiceInstance {
            port: self.port.map(|p| narrow(ENTITY, id, "port", p)).transpose()?,
            pid: self.pid.map(|p| narrow(ENTITY, id, "pid", p)).transpose()?,
            status: parse_column(ENTITY, id, &self.status)?,
            error_count: narrow(ENTITY, id, "error_count", self.error_count)?,
            id: self.id,
            agent_type: self.agent_type,
            last_error: self.last_error,
            last_health_check: self.last_health_check,
            started_at: self.started_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, agent_type, port, pid, status, error_count, last_error, \
     last_health_check, started_at, updated_at FROM service_instances";

/// Repository for supervised service instances
pub struct ServiceRepository {
    pool: Pool<Sqlite>,
}

impl ServiceRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, instance: &ServiceInstance) -> Result<()> {
        debug!(service_id = %instance.id, status = %instance.status, "Upserting service instance");

        sqlx::query(
            r#"
            INSERT INTO service_instances
                (id, agent_type, port, pid, status, error_count, last_error, last_health_check, started_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                agent_type = excluded.agent_type,
                port = excluded.port,
                pid = excluded.pid,
                status = excluded.status,
                error_count = excluded.error_count,
                last_error = excluded.last_error,
                last_health_check = excluded.last_health_check,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.agent_type)
        .bind(instance.port.map(i64::from))
        .bind(instance.pid.map(i64::from))
        .bind(instance.status.to_string())
        .bind(i64::from(instance.error_count))
        .bind(&instance.last_error)
        .bind(instance.last_health_check)
        .bind(instance.started_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<ServiceInstance>> {
        let row = sqlx::query_as::<_, ServiceRow>(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ServiceRow::into_instance).transpose()
    }

    /// All instances ordered by id, optionally restricted to one status
    pub async fn list(&self, status: Option<ServiceStatus>) -> Result<Vec<ServiceInstance>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, ServiceRow>(&format!(
                    "{} WHERE status = ?1 ORDER BY id ASC",
                    SELECT_COLUMNS
                ))
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ServiceRow>(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(ServiceRow::into_instance).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM service_instances")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use agent_team_core::service::ServiceConfig;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> ServiceRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        ServiceRepository::new(pool)
    }

    fn instance(id: &str, port: u16) -> ServiceInstance {
        let config = ServiceConfig::builder()
            .id(id)
            .agent_type("developer")
            .build()
            .unwrap();
        ServiceInstance::starting(&config, port)
    }

    #[tokio::test]
    async fn test_service_lifecycle_is_persisted() {
        let repo = setup_test_db().await;
        let mut svc = instance("svc-1", 3001);
        repo.upsert(&svc).await.unwrap();

        svc.pid = Some(4242);
        svc.set_status(ServiceStatus::Running);
        svc.last_health_check = Some(Utc::now());
        repo.upsert(&svc).await.unwrap();

        let found = repo.find_by_id("svc-1").await.unwrap().unwrap();
        assert_eq!(found, svc);

        svc.record_error("exited with code 3");
        svc.pid = None;
        repo.upsert(&svc).await.unwrap();

        let found = repo.find_by_id("svc-1").await.unwrap().unwrap();
        assert_eq!(found.status, ServiceStatus::Error);
        assert_eq!(found.error_count, 1);
        assert_eq!(found.last_error.as_deref(), Some("exited with code 3"));
        assert_eq!(found.pid, None);
        assert_eq!(found.port, Some(3001));
    }

    #[tokio::test]
    async fn test_service_list_filters_and_orders() {
        let repo = setup_test_db().await;
        let mut running = instance("svc-b", 3002);
        running.set_status(ServiceStatus::Running);
        repo.upsert(&running).await.unwrap();
        repo.upsert(&instance("svc-a", 3001)).await.unwrap();

        let ids: Vec<String> = repo.list(None).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["svc-a", "svc-b"]);

        let only_running = repo.list(Some(ServiceStatus::Running)).await.unwrap();
        assert_eq!(only_running.len(), 1);
        assert_eq!(only_running[0].id, "svc-b");
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
