//! Management HTTP surface for the scheduler.
//!
//! A thin REST layer over one `CronScheduler` instance. The only errors that
//! propagate to callers are unknown job names (404); everything else the
//! scheduler absorbs into per-job run state.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};

use flipforge_core::{FlipError, JobStatus, ScanParamsPatch};
use flipforge_scheduler::{CronScheduler, SchedulerStatus};

/// Shared application state for API handlers.
pub struct AppState {
    pub scheduler: Arc<CronScheduler>,
}

/// Build the Axum router with all management routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_jobs))
        .route("/stop", post(stop_jobs))
        .route("/jobs/:name/enable", post(enable_job))
        .route("/jobs/:name/disable", post(disable_job))
        .route("/jobs/:name/run", post(run_job))
        .route("/jobs/:name/runs", get(job_runs))
        .route("/config", put(update_config))
        .route("/health", get(health))
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("job not found: {name}") })),
    )
}

fn internal(message: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

async fn start_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchedulerStatus>, ApiError> {
    match state.scheduler.start().await {
        Ok(()) => Ok(Json(state.scheduler.status().await)),
        Err(e) => Err(internal(e.to_string())),
    }
}

async fn stop_jobs(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    state.scheduler.stop().await;
    Json(state.scheduler.status().await)
}

async fn enable_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SchedulerStatus>, ApiError> {
    if state.scheduler.enable_job(&name).await {
        Ok(Json(state.scheduler.status().await))
    } else {
        Err(not_found(&name))
    }
}

async fn disable_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SchedulerStatus>, ApiError> {
    if state.scheduler.disable_job(&name).await {
        Ok(Json(state.scheduler.status().await))
    } else {
        Err(not_found(&name))
    }
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.scheduler.run_job_now(&name).await {
        Ok(at) => Ok(Json(json!({ "triggered": name, "at": at.to_rfc3339() }))),
        Err(FlipError::JobNotFound(_)) => Err(not_found(&name)),
        Err(e) => Err(internal(e.to_string())),
    }
}

async fn job_runs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.scheduler.recent_runs(&name, 20).await {
        Ok(runs) => Ok(Json(json!({ "job": name, "runs": runs }))),
        Err(FlipError::JobNotFound(_)) => Err(not_found(&name)),
        Err(e) => Err(internal(e.to_string())),
    }
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ScanParamsPatch>,
) -> Json<Value> {
    let params = state.scheduler.update_config(&patch).await;
    Json(json!({ "updated": true, "scanParams": params }))
}

/// Health report derived purely from the current status snapshot.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.scheduler.status().await;
    let running = status
        .jobs
        .iter()
        .filter(|j| j.state.status == JobStatus::Running)
        .count();
    let errors = status
        .jobs
        .iter()
        .filter(|j| j.state.status == JobStatus::Error)
        .count();
    Json(json!({
        "status": if status.is_initialized { "healthy" } else { "not_initialized" },
        "totalJobs": status.jobs.len(),
        "enabledJobs": status.jobs.iter().filter(|j| j.enabled).count(),
        "runningJobs": running,
        "errorJobs": errors,
        "jobs": status.jobs,
    }))
}
