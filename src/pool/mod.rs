//! Worker pool
//!
//! The pool is the single place that changes the set of live workers. Every
//! mutation (`launch`, `retire`, `retire_all`) holds one pool-wide lock for
//! its full duration, driver call and ledger write included, so port
//! allocation, retirement and bookkeeping never interleave. Reads go straight
//! to the ledger, which answers each query consistently on its own.

pub mod naming;
pub mod rotation;

pub use rotation::{RotationEngine, RotationOutcome};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::ledger::Ledger;
use crate::models::WorkerRecord;
use crate::worker::{DriverError, PortAllocator, WorkerDriver, WorkerSpec, WorkerState};

/// Pool of live egress workers
pub struct WorkerPool {
    ledger: Arc<dyn Ledger>,
    driver: Arc<dyn WorkerDriver>,
    ports: Arc<dyn PortAllocator>,
    config: PoolConfig,
    /// Held for the whole of every mutating operation
    mutation: Mutex<()>,
}

impl WorkerPool {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        driver: Arc<dyn WorkerDriver>,
        ports: Arc<dyn PortAllocator>,
        config: PoolConfig,
    ) -> Self {
        Self {
            ledger,
            driver,
            ports,
            config,
            mutation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Prepare the ledger; must succeed before anything else runs
    pub async fn ensure_schema(&self) -> Result<()> {
        info!(
            ledger = self.ledger.backend_name(),
            driver = self.driver.driver_name(),
            "Preparing worker ledger"
        );
        self.ledger.ensure_schema().await
    }

    /// Start a new worker and record it as live
    ///
    /// Picks a region at random when `geo` is `None`. Nothing is persisted if
    /// the worker fails to start.
    #[instrument(skip(self))]
    pub async fn launch(&self, geo: Option<&str>) -> Result<WorkerRecord> {
        let geo = self.resolve_geo(geo)?;

        let _guard = self.mutation.lock().await;
        self.launch_locked(&geo).await
    }

    /// Stop and remove a worker, then finalize its record
    ///
    /// A worker that is already gone still gets its record finalized and is
    /// not an error. Only unexpected driver failures surface, and even then
    /// the record is finalized first.
    #[instrument(skip(self))]
    pub async fn retire(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.retire_locked(name).await
    }

    /// Retire every live worker
    ///
    /// Failures on individual workers are logged and skipped. Returns how
    /// many workers were retired cleanly.
    #[instrument(skip(self))]
    pub async fn retire_all(&self) -> Result<usize> {
        let _guard = self.mutation.lock().await;

        let live = self.ledger.list_live().await?;
        if live.is_empty() {
            info!("No live workers to retire");
            return Ok(0);
        }

        info!(count = live.len(), "Retiring all live workers");

        let mut retired = 0;
        for record in &live {
            match self.retire_locked(&record.name).await {
                Ok(()) => retired += 1,
                Err(e) => warn!(worker = %record.name, error = %e, "Failed to retire worker"),
            }
        }

        info!(retired, total = live.len(), "Finished retiring workers");
        Ok(retired)
    }

    /// Live workers, oldest first
    pub async fn snapshot(&self) -> Result<Vec<WorkerRecord>> {
        self.ledger.list_live().await
    }

    /// Full lifecycle history
    pub async fn history(&self) -> Result<Vec<WorkerRecord>> {
        self.ledger.list_all().await
    }

    /// Launch the initial workers one after another
    ///
    /// Launches are spaced by `spacing` to spare the container runtime. A
    /// failed launch is logged and the rest continue, so the service can
    /// start with a smaller pool. Once `stop` turns true no further launch
    /// begins; a launch already under way always runs to completion.
    pub async fn bootstrap(
        &self,
        count: usize,
        spacing: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Vec<WorkerRecord> {
        info!(count, spacing_secs = spacing.as_secs(), "Starting initial workers");

        let mut launched = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 && !spacing.is_zero() {
                tokio::select! {
                    _ = sleep(spacing) => {}
                    _ = wait_for_stop(stop) => {}
                }
            }

            if *stop.borrow() {
                warn!(launched = launched.len(), requested = count, "Bootstrap interrupted");
                return launched;
            }

            match self.launch(None).await {
                Ok(record) => launched.push(record),
                Err(e) => error!(attempt = i + 1, error = %e, "Initial worker failed to launch"),
            }
        }

        info!(launched = launched.len(), requested = count, "Initial workers started");
        launched
    }

    /// Round-trip latency of the ledger
    pub async fn ledger_health(&self) -> Result<Duration> {
        self.ledger.health_check().await
    }

    pub fn ledger_backend(&self) -> &'static str {
        self.ledger.backend_name()
    }

    /// Retire everything, then release the ledger
    ///
    /// Called once on every exit path of the host process.
    pub async fn shutdown(&self) {
        info!("Stopping all workers on shutdown");

        match self.retire_all().await {
            Ok(retired) => info!(retired, "All workers stopped"),
            Err(e) => error!(error = %e, "Failed to stop workers on shutdown"),
        }

        self.ledger.close().await;
    }

    fn resolve_geo(&self, geo: Option<&str>) -> Result<String> {
        match geo.map(str::trim) {
            Some("") => Err(PoolError::InvalidRequest("geo must not be empty".to_string())),
            Some(geo) => Ok(geo.to_string()),
            None => self
                .config
                .regions
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| PoolError::InvalidConfig("no regions configured".to_string())),
        }
    }

    async fn launch_locked(&self, geo: &str) -> Result<WorkerRecord> {
        let name = naming::worker_name(&self.config.name_prefix, geo, Utc::now());
        let port = self.allocate_port(&name).await?;

        let spec = WorkerSpec {
            name,
            geo: geo.to_string(),
            port,
        };

        match self.call_driver(self.driver.start(&spec)).await {
            Ok(handle) => debug!(worker = %spec.name, id = %handle.id, "Driver confirmed start"),
            Err(e) => {
                error!(worker = %spec.name, port, error = %e, "Worker failed to start");
                if matches!(e, DriverError::Timeout(_)) {
                    // The runtime may have created it after all
                    self.discard(&spec.name).await;
                }
                return Err(PoolError::Launch {
                    name: spec.name,
                    reason: e.to_string(),
                });
            }
        }

        match self.ledger.record_start(&spec.name, &spec.geo, spec.port).await {
            Ok(record) => {
                info!(worker = %record.name, geo = %record.geo, port = record.port, "Worker launched");
                Ok(record)
            }
            Err(e) => {
                error!(worker = %spec.name, error = %e, "Failed to record worker start");
                self.discard(&spec.name).await;
                Err(e)
            }
        }
    }

    /// Draw ports until one is not held by a live record
    async fn allocate_port(&self, name: &str) -> Result<u16> {
        let claimed: HashSet<i32> = self
            .ledger
            .list_live()
            .await?
            .iter()
            .map(|r| r.port)
            .collect();

        for attempt in 1..=self.config.port_attempts {
            let port = self.ports.allocate().map_err(|e| PoolError::Launch {
                name: name.to_string(),
                reason: format!("port allocation failed: {}", e),
            })?;

            if !claimed.contains(&i32::from(port)) {
                return Ok(port);
            }

            debug!(port, attempt, "Port still claimed by a live worker");
        }

        Err(PoolError::Launch {
            name: name.to_string(),
            reason: format!(
                "no free port after {} attempts",
                self.config.port_attempts
            ),
        })
    }

    async fn retire_locked(&self, name: &str) -> Result<()> {
        let teardown = self.teardown(name).await;

        match &teardown {
            Ok(()) => debug!(worker = %name, "Worker stopped and removed"),
            Err(e) if e.is_not_found() => warn!(worker = %name, "Worker not found, finalizing record"),
            Err(e) => error!(worker = %name, error = %e, "Failed to tear down worker"),
        }

        let finalized = self.ledger.record_stop(name).await?;

        match teardown {
            Ok(()) => {
                info!(worker = %name, finalized, "Worker retired");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(PoolError::Retire {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn teardown(&self, name: &str) -> std::result::Result<(), DriverError> {
        let state = self.call_driver(self.driver.inspect(name)).await?;

        if state == WorkerState::Running {
            self.call_driver(self.driver.stop(name)).await?;
        }

        self.call_driver(self.driver.remove(name)).await
    }

    /// Best-effort removal of a worker that must not outlive a failed launch
    async fn discard(&self, name: &str) {
        match self.teardown(name).await {
            Ok(()) => info!(worker = %name, "Removed unrecorded worker"),
            Err(e) if e.is_not_found() => {}
            Err(e) => error!(worker = %name, error = %e, "Failed to remove unrecorded worker"),
        }
    }

    async fn call_driver<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, DriverError>>,
    ) -> std::result::Result<T, DriverError> {
        timeout(self.config.driver_timeout, call)
            .await
            .unwrap_or(Err(DriverError::Timeout(self.config.driver_timeout)))
    }
}

/// Resolves once `stop` reads true; never resolves if the sender is gone
pub async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
