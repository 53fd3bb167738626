//! Egress Pool - Entry Point
//!
//! Bootstraps the worker pool, then runs the rotation scheduler and the API
//! server until Ctrl+C or SIGTERM. Every worker is retired before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use egress_pool::app;
use egress_pool::config::{Config, LedgerBackend, LogConfig};
use egress_pool::database::Database;
use egress_pool::ledger::{Ledger, MemoryLedger, PgLedger};
use egress_pool::pool::WorkerPool;
use egress_pool::worker::{ContainerDriver, EphemeralPortAllocator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Egress Pool");

    // Listen before any worker exists so a signal during bootstrap is seen
    let stop = forward_shutdown_signal();

    let ledger: Arc<dyn Ledger> = match config.database.backend {
        LedgerBackend::Postgres => {
            let db = Database::new(&config).await?;
            info!("Connected to database");
            Arc::new(PgLedger::new(db))
        }
        LedgerBackend::Memory => {
            info!("Using in-memory ledger; history will not survive a restart");
            Arc::new(MemoryLedger::new())
        }
    };

    let pool = Arc::new(WorkerPool::new(
        ledger,
        Arc::new(ContainerDriver::new(config.driver.clone())),
        Arc::new(EphemeralPortAllocator::new()),
        config.pool.clone(),
    ));
    pool.ensure_schema().await?;

    info!("API will listen on {}", config.api_addr());
    let result = app::serve(&config.api, &config.router, pool, started_at, stop).await;

    info!("Egress Pool stopped");
    result
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("egress_pool={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Flip the returned receiver to true on Ctrl+C or SIGTERM
///
/// The handlers are registered before this returns.
fn forward_shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    #[cfg(unix)]
    let terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            None
        }
    };

    #[cfg(unix)]
    let interrupt = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
        Ok(sigint) => Some(sigint),
        Err(e) => {
            error!("Failed to install Ctrl+C handler: {}", e);
            None
        }
    };

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let term = async {
                match terminate {
                    Some(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            let int = async {
                match interrupt {
                    Some(mut sigint) => {
                        sigint.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = term => {},
                _ = int => {},
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }

        info!("Shutdown signal received");
        let _ = tx.send(true);
    });

    rx
}
