use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of worker lifecycle history
///
/// A record whose `stop_time` is unset describes a live worker; the set of
/// live records is the pool. Once `stop_time` is set the row is history and
/// never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WorkerRecord {
    pub id: i64,
    pub name: String,
    pub geo: String,
    pub port: i32,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    /// Whether the worker has not been retired yet
    pub fn is_live(&self) -> bool {
        self.stop_time.is_none()
    }

    /// Local port of the worker's proxy endpoint
    pub fn proxy_port(&self) -> Option<u16> {
        u16::try_from(self.port).ok()
    }
}

/// Request to launch a worker
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchWorkerRequest {
    /// Egress region; picked at random when absent
    pub geo: Option<String>,
}

/// Response for a launched worker
#[derive(Debug, Clone, Serialize)]
pub struct LaunchWorkerResponse {
    pub message: String,
    pub worker: WorkerRecord,
}

/// Request to fetch a URL through the pool
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

/// Upstream response relayed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub data: String,
}

/// Live pool listing
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub size: usize,
    pub workers: Vec<WorkerRecord>,
}

impl From<Vec<WorkerRecord>> for PoolSnapshot {
    fn from(workers: Vec<WorkerRecord>) -> Self {
        PoolSnapshot {
            size: workers.len(),
            workers,
        }
    }
}
