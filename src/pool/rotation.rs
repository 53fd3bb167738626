//! Oldest-first worker rotation

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::WorkerPool;
use crate::config::RotationOrder;
use crate::error::Result;
use crate::models::WorkerRecord;

/// What a single rotation attempt did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RotationOutcome {
    /// The oldest worker was replaced
    Rotated {
        retired: String,
        launched: WorkerRecord,
    },
    /// Nothing to rotate
    EmptyPool,
    /// Another rotation was already running; this trigger was dropped
    Coalesced,
}

/// Replaces the oldest live worker with a fresh one
pub struct RotationEngine {
    pool: Arc<WorkerPool>,
    order: RotationOrder,
    /// Single active rotation; never queued
    in_flight: Mutex<()>,
}

impl RotationEngine {
    pub fn new(pool: Arc<WorkerPool>, order: RotationOrder) -> Self {
        Self {
            pool,
            order,
            in_flight: Mutex::new(()),
        }
    }

    pub fn order(&self) -> RotationOrder {
        self.order
    }

    /// Run one rotation cycle
    ///
    /// Returns `Coalesced` immediately if a rotation is already running.
    #[instrument(skip(self), fields(order = self.order.as_str()))]
    pub async fn rotate(&self) -> Result<RotationOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            info!("Rotation already in progress, dropping trigger");
            return Ok(RotationOutcome::Coalesced);
        };

        let live = self.pool.snapshot().await?;
        let Some(oldest) = live.first() else {
            info!("Pool is empty, nothing to rotate");
            return Ok(RotationOutcome::EmptyPool);
        };

        info!(
            worker = %oldest.name,
            started = %oldest.start_time,
            pool_size = live.len(),
            "Rotating oldest worker"
        );

        match self.order {
            RotationOrder::RetireFirst => self.retire_then_launch(&oldest.name).await,
            RotationOrder::LaunchFirst => self.launch_then_retire(&oldest.name).await,
        }
    }

    async fn retire_then_launch(&self, oldest: &str) -> Result<RotationOutcome> {
        // A failed retire must not shrink the pool for good
        if let Err(e) = self.pool.retire(oldest).await {
            warn!(worker = %oldest, error = %e, "Retire failed during rotation, launching anyway");
        }

        let launched = self.pool.launch(None).await.map_err(|e| {
            error!(error = %e, "Replacement worker failed to launch");
            e
        })?;

        info!(retired = %oldest, launched = %launched.name, "Rotation complete");
        Ok(RotationOutcome::Rotated {
            retired: oldest.to_string(),
            launched,
        })
    }

    async fn launch_then_retire(&self, oldest: &str) -> Result<RotationOutcome> {
        let launched = self.pool.launch(None).await.map_err(|e| {
            error!(error = %e, "Replacement worker failed to launch, keeping oldest");
            e
        })?;

        if let Err(e) = self.pool.retire(oldest).await {
            warn!(worker = %oldest, error = %e, "Retire failed during rotation");
        }

        info!(retired = %oldest, launched = %launched.name, "Rotation complete");
        Ok(RotationOutcome::Rotated {
            retired: oldest.to_string(),
            launched,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::testing::{test_pool, FakeDriver, SequentialPortAllocator};

    async fn pool_of(n: usize) -> (Arc<WorkerPool>, Arc<FakeDriver>, Arc<MemoryLedger>) {
        let driver = Arc::new(FakeDriver::new());
        let ledger = Arc::new(MemoryLedger::new());
        let pool = test_pool(
            driver.clone(),
            ledger.clone(),
            Arc::new(SequentialPortAllocator::new(43000)),
        );
        for _ in 0..n {
            pool.launch(None).await.unwrap();
        }
        (pool, driver, ledger)
    }

    #[tokio::test]
    async fn test_rotation_replaces_oldest() {
        let (pool, driver, ledger) = pool_of(3).await;
        let before = pool.snapshot().await.unwrap();

        let engine = RotationEngine::new(pool.clone(), RotationOrder::RetireFirst);
        let outcome = engine.rotate().await.unwrap();

        let RotationOutcome::Rotated { retired, launched } = outcome else {
            panic!("expected a rotation");
        };
        assert_eq!(retired, before[0].name);

        let after = pool.snapshot().await.unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0].name, before[1].name);
        assert_eq!(after[1].name, before[2].name);
        assert_eq!(after[2].name, launched.name);
        assert!(!driver.contains(&before[0].name));

        let history = ledger.list_all().await.unwrap();
        assert_eq!(history.len(), 4);
        let finalized = history.iter().find(|r| r.name == before[0].name).unwrap();
        assert!(finalized.stop_time.is_some());
    }

    #[tokio::test]
    async fn test_rotation_keeps_pool_size() {
        let (pool, _driver, _ledger) = pool_of(5).await;
        let engine = RotationEngine::new(pool.clone(), RotationOrder::RetireFirst);

        for _ in 0..3 {
            engine.rotate().await.unwrap();
            assert_eq!(pool.snapshot().await.unwrap().len(), 5);
        }
    }

    #[tokio::test]
    async fn test_rotation_on_empty_pool() {
        let (pool, driver, _ledger) = pool_of(0).await;
        let engine = RotationEngine::new(pool, RotationOrder::RetireFirst);

        assert_eq!(engine.rotate().await.unwrap(), RotationOutcome::EmptyPool);
        assert_eq!(driver.start_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let (pool, driver, _ledger) = pool_of(3).await;
        driver.set_start_delay(Duration::from_millis(50));
        let engine = RotationEngine::new(pool.clone(), RotationOrder::RetireFirst);

        let (a, b) = tokio::join!(engine.rotate(), engine.rotate());
        let outcomes = [a.unwrap(), b.unwrap()];

        let rotated = outcomes
            .iter()
            .filter(|o| matches!(o, RotationOutcome::Rotated { .. }))
            .count();
        assert_eq!(rotated, 1);
        assert!(outcomes.contains(&RotationOutcome::Coalesced));
        assert_eq!(pool.snapshot().await.unwrap().len(), 3);
        assert_eq!(pool.history().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_retire_still_launches() {
        let (pool, driver, _ledger) = pool_of(2).await;
        driver.set_fail_stop(true);
        let engine = RotationEngine::new(pool.clone(), RotationOrder::RetireFirst);

        let outcome = engine.rotate().await.unwrap();
        assert!(matches!(outcome, RotationOutcome::Rotated { .. }));
        assert_eq!(pool.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_launch_first_keeps_oldest_on_failure() {
        let (pool, driver, _ledger) = pool_of(2).await;
        let before = pool.snapshot().await.unwrap();
        driver.set_fail_start(true);

        let engine = RotationEngine::new(pool.clone(), RotationOrder::LaunchFirst);
        assert!(engine.rotate().await.is_err());
        assert_eq!(pool.snapshot().await.unwrap(), before);

        driver.set_fail_start(false);
        let outcome = engine.rotate().await.unwrap();
        let RotationOutcome::Rotated { retired, .. } = outcome else {
            panic!("expected a rotation");
        };
        assert_eq!(retired, before[0].name);
        assert_eq!(pool.snapshot().await.unwrap().len(), 2);
    }
}
