//! Worker lifecycle ledger
//!
//! Durable, append-oriented history of worker starts and stops. The pool is
//! the only writer; everything else reads through it.

mod memory;
mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::WorkerRecord;

/// Storage contract for worker lifecycle records
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the backing schema if it does not exist yet
    ///
    /// Idempotent; must run once before any other call.
    async fn ensure_schema(&self) -> Result<()>;

    /// Append a new live record
    async fn record_start(&self, name: &str, geo: &str, port: u16) -> Result<WorkerRecord>;

    /// Stamp `stop_time` on the live record named `name`
    ///
    /// Returns whether a live record was finalized. Unknown or already
    /// stopped names are a no-op, not an error.
    async fn record_stop(&self, name: &str) -> Result<bool>;

    /// All live records, oldest `start_time` first
    async fn list_live(&self) -> Result<Vec<WorkerRecord>>;

    /// Full history in insertion order
    async fn list_all(&self) -> Result<Vec<WorkerRecord>>;

    /// Round-trip to the store, returning its latency
    async fn health_check(&self) -> Result<Duration>;

    /// Release connections; called once after the final retire
    async fn close(&self) {}

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
