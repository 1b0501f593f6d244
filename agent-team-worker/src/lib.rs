//! Agent-service executable
//!
//! Each supervised service runs this binary on its allocated port. It answers
//! the supervisor's liveness probe on `GET /health` and accepts units of work
//! on `POST /execute`.

pub mod config;
pub mod error;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use agent_team_core::orchestration::ProcessSampler;
use agent_team_core::{Error, ErrorBody};

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};

/// Shared handler state
pub struct WorkerState {
    config: WorkerConfig,
    started_at: DateTime<Utc>,
    sampler: parking_lot::Mutex<ProcessSampler>,
    executed: AtomicU64,
}

impl WorkerState {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            sampler: parking_lot::Mutex::new(ProcessSampler::new()),
            executed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Units of work accepted since start
    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    fn uptime_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }
}

/// Liveness payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub service_id: String,
    pub agent_type: String,
    pub pid: u32,
    pub uptime_seconds: i64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub task_id: String,
    #[serde(default)]
    pub input: Value,
}

/// Tagged result of one unit of work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteResponse {
    pub success: bool,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ExecuteResponse {
    fn failure(task_id: String, err: &Error) -> Self {
        Self {
            success: false,
            task_id,
            data: None,
            error: Some(err.to_body()),
        }
    }
}

/// Build the worker router
pub fn build_router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .with_state(state)
}

async fn health(State(state): State<Arc<WorkerState>>) -> Json<HealthResponse> {
    let pid = std::process::id();
    let memory_bytes = state
        .sampler
        .lock()
        .sample(pid)
        .map(|(memory, _)| memory)
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        service_id: state.config.service_id.clone(),
        agent_type: state.config.agent_type.clone(),
        pid,
        uptime_seconds: state.uptime_seconds(),
        memory_bytes,
    })
}

async fn execute(
    State(state): State<Arc<WorkerState>>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed execute request");
            let err = Error::validation(rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ExecuteResponse::failure(String::new(), &err)),
            );
        }
    };

    if request.task_id.trim().is_empty() {
        let err = Error::validation("task_id cannot be empty");
        return (
            StatusCode::BAD_REQUEST,
            Json(ExecuteResponse::failure(request.task_id, &err)),
        );
    }

    let sequence = state.executed.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(task_id = %request.task_id, sequence, "Executing task");
    info!(
        service_id = %state.config.service_id,
        task_id = %request.task_id,
        "Task executed"
    );

    let data = json!({
        "service_id": state.config.service_id,
        "agent_type": state.config.agent_type,
        "sequence": sequence,
        "input": request.input,
        "completed_at": Utc::now(),
    });
    (
        StatusCode::OK,
        Json(ExecuteResponse {
            success: true,
            task_id: request.task_id,
            data: Some(data),
            error: None,
        }),
    )
}
