//! API server using Axum
//!
//! Thin JSON surface over the pool, the router and the rotation scheduler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware::from_fn;
use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{PoolError, Result};
use crate::pool::WorkerPool;
use crate::proxy::RequestRouter;
use crate::services::RotationHandle;

use super::middleware::{cors_layer, RequestLogging};
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub router: Arc<RequestRouter>,
    pub rotation: RotationHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pool: Arc<WorkerPool>,
        router: Arc<RequestRouter>,
        rotation: RotationHandle,
        started_at: Instant,
    ) -> Self {
        Self {
            pool,
            router,
            rotation,
            started_at,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Routes plus CORS, tracing and request logging
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(from_fn(RequestLogging::log_request))
            .layer(cors_layer(&self.config.cors_origins))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until shutdown is signalled
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| PoolError::InvalidConfig(format!("invalid API address: {}", e)))?;

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| PoolError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
