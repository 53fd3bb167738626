//! Egress Pool - rotating pool of VPN-backed proxy workers
//!
//! Keeps a small set of containerized forward proxies alive, each tunnelling
//! through a VPN exit in some region, and routes outbound requests through a
//! random one of them.
//!
//! ## Features
//!
//! - Serialized worker lifecycle (launch, retire, retire all)
//! - Oldest-first rotation on a grace-period timer or on demand
//! - Durable start/stop ledger in PostgreSQL (or in memory)
//! - Docker/Podman worker driver
//! - JSON management API

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pool;
pub mod proxy;
pub mod services;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{PoolError, Result};
pub use pool::WorkerPool;
