//! Request logging middleware

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

/// Logs method, path, status and latency of every API call
pub struct RequestLogging;

impl RequestLogging {
    pub async fn log_request(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = Instant::now();

        debug!(%method, %path, "request started");

        let response = next.run(req).await;
        let status = response.status();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if status.is_server_error() {
            warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
        } else {
            info!(%method, %path, status = status.as_u16(), elapsed_ms, "request completed");
        }

        response
    }
}
