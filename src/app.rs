//! Service lifecycle
//!
//! Bootstraps the pool, runs the rotation scheduler and the API server until
//! `stop` turns true or the server fails, then retires every worker.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{ApiServer, AppState};
use crate::config::{ApiServerConfig, RouterConfig};
use crate::pool::{wait_for_stop, RotationEngine, WorkerPool};
use crate::proxy::{HttpFetcher, RequestRouter};
use crate::services::{RotationHandle, RotationService};

/// Run the service, then shut the pool down whatever the outcome
///
/// `stop` should already be wired to the process signals so that a signal
/// arriving during bootstrap is seen.
pub async fn serve(
    api: &ApiServerConfig,
    router: &RouterConfig,
    pool: Arc<WorkerPool>,
    started_at: Instant,
    stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let result = run(api, router, pool.clone(), started_at, stop).await;
    if let Err(e) = &result {
        error!("Egress Pool failed: {:#}", e);
    }

    pool.shutdown().await;
    result
}

async fn run(
    api: &ApiServerConfig,
    router: &RouterConfig,
    pool: Arc<WorkerPool>,
    started_at: Instant,
    mut stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let config = pool.config().clone();

    pool.bootstrap(config.initial_size, config.launch_spacing, &mut stop)
        .await;
    if *stop.borrow() {
        warn!("Stop requested during startup");
        return Ok(());
    }

    // Rotation scheduler
    let engine = Arc::new(RotationEngine::new(pool.clone(), config.rotation_order));
    let (rotation, rotation_shutdown, triggers) = RotationHandle::new();
    let rotation_service = RotationService::new(engine, config.grace_period);
    let rotation_task = tokio::spawn(async move {
        rotation_service.run(rotation_shutdown, triggers).await;
    });

    // API server
    let fetcher = Arc::new(HttpFetcher::new(router.request_timeout));
    let request_router = Arc::new(RequestRouter::new(pool.clone(), fetcher));
    let api_server = ApiServer::new(
        api.clone(),
        AppState::new(pool, request_router, rotation.clone(), started_at),
    );

    let (api_stop_tx, api_stop) = watch::channel(false);
    let mut api_task = tokio::spawn(async move { api_server.run(api_stop).await });

    let finished = tokio::select! {
        _ = wait_for_stop(&mut stop) => {
            info!("Stopping service");
            None
        }
        res = &mut api_task => Some(res),
    };

    let _ = api_stop_tx.send(true);
    rotation.shutdown();

    let api_result = match finished {
        Some(res) => res,
        None => api_task.await,
    };
    // Lets an in-flight rotation finish
    let _ = rotation_task.await;

    api_result??;
    Ok(())
}
