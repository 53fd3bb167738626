//! Manual rotation trigger

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Ask the scheduler for a rotation
///
/// Always 202; `queued` is false when a trigger is already pending, in
/// which case this one is folded into it.
pub async fn trigger_rotation(State(state): State<AppState>) -> impl IntoResponse {
    let queued = state.rotation.trigger();

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Rotation requested",
            "queued": queued
        })),
    )
}
