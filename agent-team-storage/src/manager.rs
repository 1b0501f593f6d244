//! Storage manager for coordinating database operations

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::repositories::*;
use crate::{schema, Result};

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub migrate_on_startup: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:.agent-team/agent-team.db".to_string(),
            max_connections: Some(10),
            migrate_on_startup: true,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database on a single connection
    pub fn in_memory() -> Self {
        Self {
            url: IN_MEMORY_URL.to_string(),
            max_connections: Some(1),
            migrate_on_startup: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Main storage manager coordinating all repositories
pub struct StorageManager {
    pool: Pool<Sqlite>,
    agents: Arc<AgentRepository>,
    services: Arc<ServiceRepository>,
    tasks: Arc<TaskRepository>,
    assignments: Arc<AssignmentRepository>,
}

impl StorageManager {
    /// Connect, and bootstrap the schema if configured to
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to database");

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !config.is_in_memory() {
            ensure_parent_directory(&config.url)?;
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is a separate database
        let max_connections = if config.is_in_memory() {
            1
        } else {
            config.max_connections.unwrap_or(10).max(1)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(max_connections, "Database connection established");

        let manager = Self::from_pool(pool);
        if config.migrate_on_startup {
            manager.migrate().await?;
        }
        Ok(manager)
    }

    /// Wrap an existing pool without touching the schema
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            agents: Arc::new(AgentRepository::new(pool.clone())),
            services: Arc::new(ServiceRepository::new(pool.clone())),
            tasks: Arc::new(TaskRepository::new(pool.clone())),
            assignments: Arc::new(AssignmentRepository::new(pool.clone())),
            pool,
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        schema::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn agents(&self) -> Arc<AgentRepository> {
        self.agents.clone()
    }

    pub fn services(&self) -> Arc<ServiceRepository> {
        self.services.clone()
    }

    pub fn tasks(&self) -> Arc<TaskRepository> {
        self.tasks.clone()
    }

    pub fn assignments(&self) -> Arc<AssignmentRepository> {
        self.assignments.clone()
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get database statistics
    pub async fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            agents_count: self.agents.count().await?,
            services_count: self.services.count().await?,
            tasks_count: self.tasks.count().await?,
            assignments_count: self.assignments.count().await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Row counts per table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub agents_count: i64,
    pub services_count: i64,
    pub tasks_count: i64,
    pub assignments_count: i64,
}

/// Create the directory holding a file database
fn ensure_parent_directory(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            debug!(directory = %parent.display(), "Ensured database directory");
        }
    }
    Ok(())
}
