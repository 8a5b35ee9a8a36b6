//! Connection manager
//!
//! Owns the pooled upstream client for one proxy instance. The client is built on
//! first use, rebuilt after [`ConnectionManager::release`], and shared by every
//! concurrent call. Pool bounds are enforced with semaphores: a call holds one
//! total permit and one per-destination permit until its response is finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info};

use super::dns::CachingResolver;
use crate::error::{ProxyError, ProxyResult};

/// Tuning for the pooled client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Whole-call deadline
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline for each socket read
    pub read_timeout: Duration,
    /// Concurrent upstream calls across all destinations
    pub max_connections: usize,
    /// Concurrent upstream calls per destination
    pub max_connections_per_host: usize,
    /// Idle keep-alive for pooled connections
    pub keepalive: Duration,
    pub dns_ttl: Duration,
    /// Honour HTTP(S)_PROXY / ALL_PROXY
    pub use_env_proxy: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(240),
            max_connections: 50,
            max_connections_per_host: 10,
            keepalive: Duration::from_secs(30),
            dns_ttl: Duration::from_secs(300),
            use_env_proxy: true,
        }
    }
}

/// Slot in the connection pool, released on drop
#[derive(Debug)]
pub struct ConnectionPermit {
    _host: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

pub struct ConnectionManager {
    settings: ClientSettings,
    client: RwLock<Option<reqwest::Client>>,
    total: Arc<Semaphore>,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    resolver: Arc<CachingResolver>,
}

impl ConnectionManager {
    pub fn new(settings: ClientSettings) -> Self {
        let total = Arc::new(Semaphore::new(settings.max_connections.max(1)));
        let resolver = Arc::new(CachingResolver::new(settings.dns_ttl));
        Self {
            settings,
            client: RwLock::new(None),
            total,
            per_host: Mutex::new(HashMap::new()),
            resolver,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Return the pooled client, building it if absent or released
    pub async fn acquire_client(&self) -> ProxyResult<reqwest::Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write().await;
        // Another caller may have built it while we waited for the write lock
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = self.build_client()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn build_client(&self) -> ProxyResult<reqwest::Client> {
        let settings = &self.settings;

        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .pool_max_idle_per_host(settings.max_connections_per_host)
            .pool_idle_timeout(settings.keepalive)
            .tcp_keepalive(settings.keepalive)
            .dns_resolver(Arc::clone(&self.resolver))
            // Relay upstream bytes untouched
            .no_gzip()
            .no_brotli()
            .no_deflate();

        if settings.use_env_proxy {
            if let Some(proxy) = env_proxy() {
                info!(proxy = %proxy, "Using proxy from environment");
            }
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            timeout_secs = settings.timeout.as_secs(),
            connect_timeout_secs = settings.connect_timeout.as_secs(),
            read_timeout_secs = settings.read_timeout.as_secs(),
            max_connections = settings.max_connections,
            max_connections_per_host = settings.max_connections_per_host,
            "Created pooled upstream client"
        );

        Ok(client)
    }

    /// Wait for a free slot towards `host`
    ///
    /// The destination permit is taken first so a saturated host does not hold
    /// total capacity while it waits.
    pub async fn acquire_permit(&self, host: &str) -> ProxyResult<ConnectionPermit> {
        let host_semaphore = self.host_semaphore(host);

        let host_permit = host_semaphore
            .acquire_owned()
            .await
            .map_err(|_| ProxyError::Internal("Connection pool closed".to_string()))?;
        let total_permit = Arc::clone(&self.total)
            .acquire_owned()
            .await
            .map_err(|_| ProxyError::Internal("Connection pool closed".to_string()))?;

        Ok(ConnectionPermit {
            _host: host_permit,
            _total: total_permit,
        })
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut per_host = self.per_host.lock().unwrap_or_else(|e| e.into_inner());
        let limit = self.settings.max_connections_per_host.max(1);
        Arc::clone(
            per_host
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(limit))),
        )
    }

    /// Free pool slots, total across destinations
    pub fn available_permits(&self) -> usize {
        self.total.available_permits()
    }

    pub async fn is_open(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Close the pooled client; a no-op when already closed
    ///
    /// Idle connections are dropped with the client. Calls still in flight keep
    /// their own handle until they finish.
    pub async fn release(&self) {
        let previous = self.client.write().await.take();
        if previous.is_some() {
            info!("Released pooled upstream client");
        } else {
            debug!("Pooled upstream client already released");
        }
    }
}

fn env_proxy() -> Option<String> {
    ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}
