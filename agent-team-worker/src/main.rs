//! Agent-service process started by the agent team supervisor

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use agent_team_monitoring::{LoggingConfig, TracingSetup};
use agent_team_worker::{build_router, WorkerConfig, WorkerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    TracingSetup::new(LoggingConfig::default())
        .initialize()
        .context("Failed to initialize logging")?;

    let config = WorkerConfig::from_env().context("Failed to read supervisor environment")?;
    let addr = config.bind_addr();
    info!(
        service_id = %config.service_id,
        agent_type = %config.agent_type,
        port = config.port,
        database = config.database_url.is_some(),
        "Agent service starting"
    );

    let state = Arc::new(WorkerState::new(config));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Agent service listening");

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Agent service failed")?;

    info!(
        service_id = %state.config().service_id,
        executed = state.executed_count(),
        "Agent service stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
