use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::Ledger;
use crate::error::{PoolError, Result};
use crate::models::WorkerRecord;

#[derive(Debug, Default)]
struct Rows {
    records: Vec<WorkerRecord>,
    next_id: i64,
}

/// In-process ledger with the same contract as the Postgres one
///
/// History is lost on restart. Used for local runs and tests.
#[derive(Debug)]
pub struct MemoryLedger {
    rows: RwLock<Rows>,
    available: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Rows {
                records: Vec::new(),
                next_id: 1,
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PoolError::LedgerUnavailable(
                "in-memory ledger switched off".to_string(),
            ))
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()
    }

    async fn record_start(&self, name: &str, geo: &str, port: u16) -> Result<WorkerRecord> {
        self.check_available()?;

        let mut rows = self.rows.write();
        let port = i32::from(port);

        if rows.records.iter().any(|r| r.is_live() && r.port == port) {
            return Err(PoolError::LedgerConflict(format!(
                "port {} is already claimed by a live record",
                port
            )));
        }

        let record = WorkerRecord {
            id: rows.next_id,
            name: name.to_string(),
            geo: geo.to_string(),
            port,
            start_time: Utc::now(),
            stop_time: None,
        };
        rows.next_id += 1;
        rows.records.push(record.clone());

        info!(id = record.id, worker = %record.name, port = record.port, "Recorded worker start");
        Ok(record)
    }

    async fn record_stop(&self, name: &str) -> Result<bool> {
        self.check_available()?;

        let mut rows = self.rows.write();
        let now = Utc::now();
        let mut finalized = false;

        for record in rows
            .records
            .iter_mut()
            .filter(|r| r.name == name && r.is_live())
        {
            record.stop_time = Some(now);
            finalized = true;
        }

        if finalized {
            info!(worker = %name, "Recorded worker stop");
        } else {
            debug!(worker = %name, "No live record to finalize");
        }

        Ok(finalized)
    }

    async fn list_live(&self) -> Result<Vec<WorkerRecord>> {
        self.check_available()?;

        let mut live: Vec<WorkerRecord> = self
            .rows
            .read()
            .records
            .iter()
            .filter(|r| r.is_live())
            .cloned()
            .collect();
        live.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));

        Ok(live)
    }

    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        self.check_available()?;
        Ok(self.rows.read().records.clone())
    }

    async fn health_check(&self) -> Result<Duration> {
        let start = Instant::now();
        self.check_available()?;
        Ok(start.elapsed())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
