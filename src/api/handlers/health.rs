//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::error::PoolError;

/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "egress-pool"
        })),
    )
}

/// Pool size, uptime and ledger reachability
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, PoolError> {
    let ledger = match state.pool.ledger_health().await {
        Ok(latency) => json!({
            "backend": state.pool.ledger_backend(),
            "healthy": true,
            "latency_ms": latency.as_millis() as u64,
        }),
        Err(e) => json!({
            "backend": state.pool.ledger_backend(),
            "healthy": false,
            "error": e.to_string(),
        }),
    };

    let live = state.pool.snapshot().await?;
    let pool = state.pool.config();

    Ok(Json(json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "pool_size": live.len(),
        "target_size": pool.initial_size,
        "grace_period_secs": pool.grace_period.as_secs(),
        "rotation_order": pool.rotation_order.as_str(),
        "ledger": ledger,
    })))
}
