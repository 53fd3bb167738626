use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::Ledger;
use crate::database::Database;
use crate::error::{PoolError, Result};
use crate::models::WorkerRecord;

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgLedger {
    db: Database,
}

impl PgLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// The partial unique index on live ports surfaces as a conflict
fn start_error(err: sqlx::Error, port: u16) -> PoolError {
    let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique {
        PoolError::LedgerConflict(format!(
            "port {} is already claimed by a live record",
            port
        ))
    } else {
        PoolError::Persistence(err)
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn ensure_schema(&self) -> Result<()> {
        self.db.run_migrations().await
    }

    async fn record_start(&self, name: &str, geo: &str, port: u16) -> Result<WorkerRecord> {
        let record = sqlx::query_as::<_, WorkerRecord>(
            r#"
            INSERT INTO worker_records (name, geo, port, start_time, stop_time)
            VALUES ($1, $2, $3, NOW(), NULL)
            RETURNING id, name, geo, port, start_time, stop_time
            "#,
        )
        .bind(name)
        .bind(geo)
        .bind(i32::from(port))
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| start_error(e, port))?;

        info!(id = record.id, worker = %record.name, port = record.port, "Recorded worker start");
        Ok(record)
    }

    async fn record_stop(&self, name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE worker_records
            SET stop_time = NOW()
            WHERE name = $1 AND stop_time IS NULL
            "#,
        )
        .bind(name)
        .execute(self.db.pool())
        .await?;

        let finalized = result.rows_affected() > 0;
        if finalized {
            info!(worker = %name, "Recorded worker stop");
        } else {
            debug!(worker = %name, "No live record to finalize");
        }

        Ok(finalized)
    }

    async fn list_live(&self) -> Result<Vec<WorkerRecord>> {
        let records = sqlx::query_as::<_, WorkerRecord>(
            r#"
            SELECT id, name, geo, port, start_time, stop_time
            FROM worker_records
            WHERE stop_time IS NULL
            ORDER BY start_time ASC, id ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<WorkerRecord>> {
        let records = sqlx::query_as::<_, WorkerRecord>(
            r#"
            SELECT id, name, geo, port, start_time, stop_time
            FROM worker_records
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    async fn health_check(&self) -> Result<Duration> {
        self.db.health_check().await
    }

    async fn close(&self) {
        self.db.close().await;
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
