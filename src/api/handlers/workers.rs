//! Worker management handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::PoolError;
use crate::models::{LaunchWorkerRequest, LaunchWorkerResponse, PoolSnapshot};

/// List live workers, oldest first
pub async fn list_workers(State(state): State<AppState>) -> Result<impl IntoResponse, PoolError> {
    let live = state.pool.snapshot().await?;
    Ok(Json(PoolSnapshot::from(live)))
}

/// Full lifecycle history
pub async fn worker_history(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PoolError> {
    let history = state.pool.history().await?;
    Ok(Json(history))
}

/// Launch a worker; the body is optional
pub async fn launch_worker(
    State(state): State<AppState>,
    body: Option<Json<LaunchWorkerRequest>>,
) -> Result<impl IntoResponse, PoolError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let worker = state.pool.launch(req.geo.as_deref()).await?;
    info!(worker = %worker.name, "Worker launched via API");

    Ok((
        StatusCode::CREATED,
        Json(LaunchWorkerResponse {
            message: format!("Started worker {} in {}", worker.name, worker.geo),
            worker,
        }),
    ))
}

/// Retire one worker by name
pub async fn retire_worker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, PoolError> {
    state.pool.retire(&name).await?;

    Ok(Json(json!({
        "message": format!("Worker {} retired", name)
    })))
}

/// Retire every live worker
pub async fn retire_all_workers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PoolError> {
    let retired = state.pool.retire_all().await?;
    info!(retired, "All workers retired via API");

    Ok(Json(json!({
        "message": "All workers retired",
        "retired": retired
    })))
}
