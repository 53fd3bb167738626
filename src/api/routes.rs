//! API route definitions

use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        .nest("/api", pool_routes())
        .with_state(state)
}

fn pool_routes() -> Router<AppState> {
    Router::new()
        // Workers
        .route(
            "/workers",
            get(handlers::workers::list_workers)
                .post(handlers::workers::launch_worker)
                .delete(handlers::workers::retire_all_workers),
        )
        .route("/workers/history", get(handlers::workers::worker_history))
        .route("/workers/:name", delete(handlers::workers::retire_worker))
        // Rotation
        .route("/rotation", post(handlers::rotation::trigger_rotation))
        // Traffic
        .route("/fetch", post(handlers::fetch::fetch_url))
}
