//! Request routing across live workers

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};
use url::Url;

use super::Fetcher;
use crate::error::{PoolError, Result};
use crate::models::FetchResponse;
use crate::pool::WorkerPool;

/// Sends each request through a uniformly random live worker
///
/// Selection is independent of rotation order. A failed fetch is reported
/// with the worker it went through and is not retried elsewhere.
pub struct RequestRouter {
    pool: Arc<WorkerPool>,
    fetcher: Arc<dyn Fetcher>,
}

impl RequestRouter {
    pub fn new(pool: Arc<WorkerPool>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { pool, fetcher }
    }

    #[instrument(skip(self))]
    pub async fn route(&self, target: &str) -> Result<FetchResponse> {
        let live = self.pool.snapshot().await?;
        let live_ports: Vec<u16> = live.iter().filter_map(|r| r.proxy_port()).collect();
        self.fetcher.retain_ports(&live_ports);

        if live.is_empty() {
            return Err(PoolError::NoWorkerAvailable);
        }

        let url = Url::parse(target)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PoolError::InvalidRequest(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let worker = live
            .choose(&mut rand::thread_rng())
            .ok_or(PoolError::NoWorkerAvailable)?;
        let port = worker.proxy_port().ok_or_else(|| {
            PoolError::Internal(format!("worker {} has invalid port {}", worker.name, worker.port))
        })?;

        match self.fetcher.fetch(&url, port).await {
            Ok(response) => {
                info!(worker = %worker.name, status = response.status, "Request routed");
                Ok(response)
            }
            Err(source) => {
                warn!(worker = %worker.name, error = %source, "Upstream fetch failed");
                Err(PoolError::Upstream {
                    worker: worker.name.clone(),
                    source,
                })
            }
        }
    }
}
