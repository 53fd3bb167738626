//! Rotation scheduler
//!
//! Drives the rotation engine from two sources: a ticker firing every grace
//! period and a manual trigger channel. Triggers that arrive while a rotation
//! is running are dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::pool::{RotationEngine, RotationOutcome};

/// Background rotation service
pub struct RotationService {
    engine: Arc<RotationEngine>,
    grace_period: Duration,
}

impl RotationService {
    pub fn new(engine: Arc<RotationEngine>, grace_period: Duration) -> Self {
        Self {
            engine,
            grace_period,
        }
    }

    /// Run until shutdown is signalled
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut triggers: mpsc::Receiver<()>,
    ) {
        info!(
            "Starting rotation service (grace period: {}s, order: {})",
            self.grace_period.as_secs(),
            self.engine.order().as_str()
        );

        let mut ticker = interval(self.grace_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => self.rotate("timer").await,
                Some(()) = triggers.recv() => self.rotate("manual").await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rotation service shutting down");
                        break;
                    }
                }
            }

            // Coalesce triggers that arrived mid-rotation
            while triggers.try_recv().is_ok() {
                debug!("Dropping trigger received during rotation");
            }
        }
    }

    async fn rotate(&self, source: &str) {
        match self.engine.rotate().await {
            Ok(RotationOutcome::Rotated { retired, launched }) => {
                info!(source, retired = %retired, launched = %launched.name, "Scheduled rotation done")
            }
            Ok(RotationOutcome::EmptyPool) => info!(source, "Skipped rotation, pool is empty"),
            Ok(RotationOutcome::Coalesced) => debug!(source, "Rotation coalesced"),
            Err(e) => error!(source, error = %e, "Rotation failed"),
        }
    }
}

/// Handle for triggering and stopping the rotation service
#[derive(Clone)]
pub struct RotationHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl RotationHandle {
    pub fn new() -> (Self, watch::Receiver<bool>, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // One pending trigger at most
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        (
            Self {
                trigger_tx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            shutdown_rx,
            trigger_rx,
        )
    }

    /// Request a rotation; false if one is already pending or the service is gone
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
