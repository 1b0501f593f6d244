//! Agent repository implementation

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use std::collections::BTreeSet;
use tracing::debug;

use super::{narrow, parse_column};
use crate::Result;
use agent_team_core::agent::{AgentRecord, AgentStatus};

const ENTITY: &str = "agent";

#[derive(Debug, FromRow)]
struct AgentRow {
    id: String,
    name: String,
    agent_type: String,
    status: String,
    capabilities: String,
    workload: i64,
    last_seen: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl AgentRow {
    fn into_record(self) -> Result<AgentRecord> {
        let capabilities: BTreeSet<String> = serde_json::from_str(&self.capabilities)?;
        Ok(AgentRecord {
            status: parse_column(ENTITY, &self.id, &self.status)?,
            workload: narrow(ENTITY, &self.id, "workload", self.workload)?,
            capabilities,
            id: self.id,
            name: self.name,
            agent_type: self.agent_type,
            last_seen: self.last_seen,
            created_at: self.created_at,
        })
    }
}

/// Repository for agent records
pub struct AgentRepository {
    pool: Pool<Sqlite>,
}

impl AgentRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert or update an agent; `created_at` keeps its first value
    pub async fn upsert(&self, agent: &AgentRecord) -> Result<()> {
        debug!(agent_id = %agent.id, status = %agent.status, "Upserting agent");
        let capabilities = serde_json::to_string(&agent.capabilities)?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, name, agent_type, status, capabilities, workload, last_seen, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                agent_type = excluded.agent_type,
                status = excluded.status,
                capabilities = excluded.capabilities,
                workload = excluded.workload,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.agent_type)
        .bind(agent.status.to_string())
        .bind(capabilities)
        .bind(i64::from(agent.workload))
        .bind(agent.last_seen)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<AgentRecord>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT id, name, agent_type, status, capabilities, workload, last_seen, created_at
            FROM agents
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AgentRow::into_record).transpose()
    }

    /// All agents ordered by id, optionally restricted to one status
    pub async fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, AgentRow>(
                    r#"
                    SELECT id, name, agent_type, status, capabilities, workload, last_seen, created_at
                    FROM agents
                    WHERE status = ?1
                    ORDER BY id ASC
                    "#,
                )
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AgentRow>(
                    r#"
                    SELECT id, name, agent_type, status, capabilities, workload, last_seen, created_at
                    FROM agents
                    ORDER BY id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(AgentRow::into_record).collect()
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    include!("agent_tests.rs");
}
