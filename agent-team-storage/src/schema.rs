//! Schema bootstrap
//!
//! Tables are created idempotently on startup; the applied version is
//! recorded in `schema_migrations`.

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use crate::{Error, Result};

/// Version of the schema created by [`run_migrations`]
pub const SCHEMA_VERSION: i64 = 1;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    create_migrations_table(pool).await?;
    if current_version(pool).await? == Some(SCHEMA_VERSION) {
        debug!(version = SCHEMA_VERSION, "Schema is up to date");
        return Ok(());
    }

    create_agents_table(pool).await?;
    create_service_instances_table(pool).await?;
    create_tasks_table(pool).await?;
    create_assignments_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| Error::Migration(e.to_string()))?;

    info!(version = SCHEMA_VERSION, "Database migrations completed successfully");
    Ok(())
}

/// Highest applied schema version, `None` on a fresh database
pub async fn current_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

async fn execute(pool: &SqlitePool, table: &str, statements: &[&str]) -> Result<()> {
    debug!(table, "Creating table");
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| Error::Migration(format!("{}: {}", table, e)))?;
    }
    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "schema_migrations",
        &[r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
    "#],
    )
    .await
}

async fn create_agents_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "agents",
        &[
            r#"
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('idle', 'busy', 'error', 'offline')),
            capabilities TEXT NOT NULL DEFAULT '[]',
            workload INTEGER NOT NULL DEFAULT 0 CHECK (workload >= 0),
            last_seen TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
    "#,
            "CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status)",
        ],
    )
    .await
}

async fn create_service_instances_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "service_instances",
        &[
            r#"
        CREATE TABLE IF NOT EXISTS service_instances (
            id TEXT PRIMARY KEY,
            agent_type TEXT NOT NULL,
            port INTEGER,
            pid INTEGER,
            status TEXT NOT NULL CHECK (status IN ('starting', 'running', 'stopping', 'stopped', 'error')),
            error_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            last_health_check TEXT,
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#,
            "CREATE INDEX IF NOT EXISTS idx_service_instances_status ON service_instances(status)",
        ],
    )
    .await
}

async fn create_tasks_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "tasks",
        &[
            r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'assigned', 'completed', 'escalated', 'failed')),
            priority TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high', 'critical')),
            preferred_agent_type TEXT,
            required_capabilities TEXT NOT NULL DEFAULT '[]',
            dependencies TEXT NOT NULL DEFAULT '[]',
            assigned_agent_id TEXT,
            result TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    "#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        ],
    )
    .await
}

async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "assignments",
        &[
            r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('primary', 'escalation')),
            status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'escalated')),
            priority TEXT NOT NULL,
            reason TEXT,
            escalated_to TEXT,
            created_at TEXT NOT NULL,
            closed_at TEXT,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
        )
    "#,
            "CREATE INDEX IF NOT EXISTS idx_assignments_task ON assignments(task_id)",
            // At most one active assignment per task
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_one_active ON assignments(task_id) WHERE status = 'active'",
        ],
    )
    .await
}
