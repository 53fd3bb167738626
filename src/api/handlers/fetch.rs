//! Fetch a URL through a random live worker

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::server::AppState;
use crate::error::PoolError;
use crate::models::FetchRequest;

pub async fn fetch_url(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<impl IntoResponse, PoolError> {
    let response = state.router.route(&req.url).await?;
    Ok(Json(response))
}
