//! Scripted collaborators for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::config::PoolConfig;
use crate::error::{BoxError, Result};
use crate::ledger::Ledger;
use crate::models::FetchResponse;
use crate::pool::WorkerPool;
use crate::proxy::Fetcher;
use crate::worker::{
    DriverError, PortAllocator, WorkerDriver, WorkerHandle, WorkerSpec, WorkerState,
};

/// Pool wired to test doubles with a short driver timeout
pub(crate) fn test_pool(
    driver: Arc<dyn WorkerDriver>,
    ledger: Arc<dyn Ledger>,
    ports: Arc<dyn PortAllocator>,
) -> Arc<WorkerPool> {
    let config = PoolConfig {
        driver_timeout: Duration::from_secs(2),
        launch_spacing: Duration::ZERO,
        ..PoolConfig::default()
    };
    Arc::new(WorkerPool::new(ledger, driver, ports, config))
}

#[derive(Debug, Clone)]
struct FakeWorker {
    port: u16,
    state: WorkerState,
}

type StartHook = Box<dyn Fn() + Send + Sync>;

/// In-memory container runtime
#[derive(Default)]
pub(crate) struct FakeDriver {
    workers: Mutex<HashMap<String, FakeWorker>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    fail_nth_start: AtomicUsize,
    start_delay: Mutex<Option<Duration>>,
    on_start: Mutex<Option<StartHook>>,
    starts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct CallGuard<'a>(&'a AtomicUsize);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Fail only the n-th start call (1-based)
    pub fn fail_nth_start(&self, n: usize) {
        self.fail_nth_start.store(n, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = Some(delay);
    }

    /// Run `hook` after every successful start
    pub fn on_start(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_start.lock() = Some(Box::new(hook));
    }

    /// Drop a worker behind the pool's back
    pub fn vanish(&self, name: &str) {
        self.workers.lock().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.lock().contains_key(name)
    }

    pub fn running_names(&self) -> Vec<String> {
        self.workers
            .lock()
            .iter()
            .filter(|(_, w)| w.state == WorkerState::Running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Highest number of driver calls observed in progress at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> CallGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        CallGuard(&self.in_flight)
    }
}

#[async_trait]
impl WorkerDriver for FakeDriver {
    async fn start(&self, spec: &WorkerSpec) -> std::result::Result<WorkerHandle, DriverError> {
        let _call = self.enter();
        let attempt = self.starts.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_start.load(Ordering::SeqCst)
            || self.fail_nth_start.load(Ordering::SeqCst) == attempt
        {
            return Err(DriverError::Runtime("image pull failed".to_string()));
        }

        {
            let mut workers = self.workers.lock();
            if workers
                .values()
                .any(|w| w.state == WorkerState::Running && w.port == spec.port)
            {
                return Err(DriverError::Runtime(format!(
                    "port {} is already allocated",
                    spec.port
                )));
            }
            workers.insert(
                spec.name.clone(),
                FakeWorker {
                    port: spec.port,
                    state: WorkerState::Running,
                },
            );
        }

        if let Some(hook) = self.on_start.lock().as_ref() {
            hook();
        }

        Ok(WorkerHandle {
            id: format!("fake-{}", attempt),
            name: spec.name.clone(),
        })
    }

    async fn inspect(&self, name: &str) -> std::result::Result<WorkerState, DriverError> {
        let _call = self.enter();
        self.workers
            .lock()
            .get(name)
            .map(|w| w.state)
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    async fn stop(&self, name: &str) -> std::result::Result<(), DriverError> {
        let _call = self.enter();
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DriverError::Runtime("daemon not responding".to_string()));
        }

        match self.workers.lock().get_mut(name) {
            Some(worker) => {
                worker.state = WorkerState::Stopped;
                Ok(())
            }
            None => Err(DriverError::NotFound(name.to_string())),
        }
    }

    async fn remove(&self, name: &str) -> std::result::Result<(), DriverError> {
        let _call = self.enter();
        self.workers
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    fn driver_name(&self) -> &'static str {
        "fake"
    }
}

/// Always hands out the same port
pub(crate) struct FixedPortAllocator(u16);

impl FixedPortAllocator {
    pub fn new(port: u16) -> Self {
        Self(port)
    }
}

impl PortAllocator for FixedPortAllocator {
    fn allocate(&self) -> Result<u16> {
        Ok(self.0)
    }
}

/// Hands out consecutive ports
pub(crate) struct SequentialPortAllocator {
    next: AtomicU16,
}

impl SequentialPortAllocator {
    pub fn new(first: u16) -> Self {
        Self {
            next: AtomicU16::new(first),
        }
    }
}

impl PortAllocator for SequentialPortAllocator {
    fn allocate(&self) -> Result<u16> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Fetcher that records calls instead of touching the network
#[derive(Default)]
pub(crate) struct RecordingFetcher {
    calls: Mutex<Vec<(String, u16)>>,
    retained: Mutex<Option<Vec<u16>>>,
    fail: AtomicBool,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let fetcher = Self::default();
        fetcher.fail.store(true, Ordering::SeqCst);
        fetcher
    }

    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().clone()
    }

    /// Ports passed to the latest `retain_ports` call
    pub fn retained(&self) -> Option<Vec<u16>> {
        self.retained.lock().clone()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(
        &self,
        url: &Url,
        proxy_port: u16,
    ) -> std::result::Result<FetchResponse, BoxError> {
        self.calls.lock().push((url.to_string(), proxy_port));

        if self.fail.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        Ok(FetchResponse {
            status: 200,
            data: format!("via {}", proxy_port),
        })
    }

    fn retain_ports(&self, live: &[u16]) {
        *self.retained.lock() = Some(live.to_vec());
    }
}
