use crate::error::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Run all database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    create_migrations_table(pool).await?;

    for (version, name, sql) in get_migrations() {
        if !is_migration_applied(pool, version).await? {
            info!(version = version, name = name, "Applying migration");

            // Plain &str runs over the simple query protocol, which allows multiple statements
            pool.execute(sql).await?;
            record_migration(pool, version, name).await?;

            info!(version = version, name = name, "Migration applied successfully");
        }
    }

    Ok(())
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check if a migration has been applied
async fn is_migration_applied(pool: &PgPool, version: i32) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = $1",
    )
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(result > 0)
}

/// Record a migration as applied
async fn record_migration(pool: &PgPool, version: i32, name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO schema_migrations (version, name) VALUES ($1, $2) ON CONFLICT (version) DO NOTHING",
    )
    .bind(version)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get all migrations in order
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![(1, "worker_records", MIGRATION_001_WORKER_RECORDS)]
}

// Migration 1: worker lifecycle ledger
const MIGRATION_001_WORKER_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS worker_records (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    geo TEXT NOT NULL,
    port INTEGER NOT NULL,
    start_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    stop_time TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_worker_records_start_time ON worker_records(start_time);
CREATE INDEX IF NOT EXISTS idx_worker_records_name ON worker_records(name);

-- A port may be claimed by at most one live worker
CREATE UNIQUE INDEX IF NOT EXISTS idx_worker_records_live_port
    ON worker_records(port)
    WHERE stop_time IS NULL;
"#;
