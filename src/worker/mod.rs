//! External worker processes
//!
//! A worker is a sandboxed container exposing a local forward proxy whose
//! traffic leaves through a VPN tunnel in a chosen region. This module only
//! knows how to start, inspect, stop and remove one; lifecycle policy lives
//! in the pool.

mod container;
mod port;

pub use container::ContainerDriver;
pub use port::{EphemeralPortAllocator, PortAllocator};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Driver-level failures
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Worker not found: {0}")]
    NotFound(String),

    #[error("Driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Container runtime error: {0}")]
    Runtime(String),
}

impl DriverError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}

/// Parameters for starting a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub name: String,
    pub geo: String,
    pub port: u16,
}

/// A started worker as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Runtime identifier (container id)
    pub id: String,
    pub name: String,
}

/// Observed state of an existing worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
}

/// Capability to manage external worker processes
///
/// Implementations must accept concurrent calls for different names.
#[async_trait]
pub trait WorkerDriver: Send + Sync {
    /// Start a worker bound to `spec.port` on this host
    async fn start(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DriverError>;

    /// Look up a worker; `NotFound` when it does not exist
    async fn inspect(&self, name: &str) -> Result<WorkerState, DriverError>;

    /// Stop a running worker
    async fn stop(&self, name: &str) -> Result<(), DriverError>;

    /// Remove a worker and its volumes
    async fn remove(&self, name: &str) -> Result<(), DriverError>;

    /// Driver name for logging
    fn driver_name(&self) -> &'static str;
}
