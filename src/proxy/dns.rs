//! DNS resolver with a TTL cache
//!
//! Plugged into the pooled reqwest client so repeated connections to the same
//! upstream skip the system resolver until the entry expires.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::debug;

/// Resolved addresses with expiration
struct DnsEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

impl DnsEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Caching resolver backed by `tokio::net::lookup_host`
///
/// A TTL of zero disables caching.
pub struct CachingResolver {
    entries: Arc<RwLock<HashMap<String, DnsEntry>>>,
    ttl: Duration,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Cached addresses for `host`, if present and not expired
    pub fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(host) {
            Some(entry) if !entry.is_expired() => Some(entry.addrs.clone()),
            _ => None,
        }
    }

    fn store(&self, host: &str, addrs: Vec<SocketAddr>) {
        if self.ttl.is_zero() || addrs.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(
            host.to_string(),
            DnsEntry {
                addrs,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Resolve `host`, consulting the cache first
    pub async fn lookup(&self, host: &str) -> std::io::Result<Vec<SocketAddr>> {
        if let Some(addrs) = self.cached(host) {
            debug!(host = %host, "DNS cache hit");
            return Ok(addrs);
        }

        // Port is ignored; reqwest substitutes the URL's port
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
        debug!(host = %host, count = addrs.len(), "DNS resolved");
        self.store(host, addrs.clone());
        Ok(addrs)
    }

    /// Number of live cache entries
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
        }
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.handle();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
