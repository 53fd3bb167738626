//! Outbound fetch through a worker's local forward proxy

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Proxy};
use tracing::debug;
use url::Url;

use crate::error::BoxError;
use crate::models::FetchResponse;

/// Performs one HTTP GET through the proxy listening on `proxy_port`
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Any upstream status is a successful fetch; only transport failures
    /// are errors.
    async fn fetch(&self, url: &Url, proxy_port: u16) -> Result<FetchResponse, BoxError>;

    /// Drop any per-worker state for ports not in `live`
    fn retain_ports(&self, _live: &[u16]) {}
}

/// `reqwest`-backed fetcher
///
/// Keeps one client per worker port so connections and TLS sessions are
/// reused across requests.
pub struct HttpFetcher {
    timeout: Duration,
    proxy_host: String,
    clients: Mutex<HashMap<u16, Client>>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            proxy_host: "localhost".to_string(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Override the host the worker proxies listen on
    pub fn with_proxy_host(mut self, host: impl Into<String>) -> Self {
        self.proxy_host = host.into();
        self
    }

    fn client_for(&self, proxy_port: u16) -> reqwest::Result<Client> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&proxy_port) {
            return Ok(client.clone());
        }

        let proxy = Proxy::all(format!("http://{}:{}", self.proxy_host, proxy_port))?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()?;

        debug!(proxy_port, "Built client for worker");
        clients.insert(proxy_port, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.clients.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, proxy_port: u16) -> Result<FetchResponse, BoxError> {
        let client = self.client_for(proxy_port)?;

        let response = client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let data = response.text().await?;

        debug!(url = %url, proxy_port, status, bytes = data.len(), "Fetched through worker");
        Ok(FetchResponse { status, data })
    }

    fn retain_ports(&self, live: &[u16]) {
        self.clients.lock().retain(|port, _| live.contains(port));
    }
}
