//! Agent team coordinator
//!
//! Starts the configured agent services, routes tasks between them and keeps
//! them healthy until Ctrl-C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use agent_team_monitoring::TracingSetup;
use agent_team_server::{config::Config, server::Server};

/// Agent team coordinator
#[derive(Parser)]
#[command(name = "agent-team")]
#[command(about = "Supervise a team of agent services and route work between them")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database connection string
    #[arg(long)]
    database_url: Option<String>,

    /// Override the log level or filter directives
    #[arg(long)]
    log_level: Option<String>,

    /// Do not start the services listed in the configuration
    #[arg(long)]
    no_boot_services: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    apply_cli_overrides(&mut config, &cli);

    TracingSetup::new(config.monitoring.logging.clone())
        .initialize()
        .context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = db_scheme(&config.database.url),
        "Starting agent team coordinator"
    );

    let server = Server::new(config).await.map_err(|e| {
        error!(error = %e, "Failed to initialize coordinator");
        e
    })?;

    if cli.no_boot_services {
        info!("Boot services disabled");
    } else {
        let started = server.start_boot_services().await;
        info!(started, "Boot services started");
    }

    server.run().await?;
    info!("Agent team coordinator shut down gracefully");
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.database_url {
        // Children follow the coordinator's database unless configured apart
        if config.supervisor.database_url.as_deref() == Some(config.database.url.as_str()) {
            config.supervisor.database_url = Some(url.clone());
        }
        config.database.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.monitoring.logging.level = level.clone();
    }
}

/// Database kind for logging without leaking credentials or paths
fn db_scheme(url: &str) -> &'static str {
    if url.starts_with("sqlite::memory:") {
        "SQLite (memory)"
    } else if url.starts_with("sqlite:") {
        "SQLite"
    } else {
        "Unknown DB"
    }
}
