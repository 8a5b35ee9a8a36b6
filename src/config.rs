//! Configuration management for the cache proxy
//!
//! Configuration is loaded from environment variables. Each upstream flavor is
//! enabled by setting its API key.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::messages::{CachePolicy, CacheTtl};
use crate::proxy::{ClientSettings, Flavor};

/// Default request body cap, in MiB
pub const DEFAULT_MAX_BODY_MB: usize = 100;

/// Configuration of one proxy instance
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub flavor: Flavor,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upstream base URL
    pub api_url: String,
    /// Server-held upstream credential
    pub api_key: String,
    pub cache_policy: CachePolicy,
    /// Remove `top_p` before forwarding
    pub drop_top_p: bool,
    /// Rewrite `thinking` into `reasoning`
    pub translate_thinking: bool,
    /// Static headers added to every upstream request
    pub extra_headers: Vec<(String, String)>,
    /// Largest accepted chat request body, in bytes
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    /// Flavor defaults for the given upstream
    pub fn new(flavor: Flavor, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let (port, cache_policy, drop_top_p, translate_thinking) = match flavor {
            Flavor::Anthropic => (8080, CachePolicy::Ttl(CacheTtl::default()), true, false),
            Flavor::OpenRouter => (9998, CachePolicy::Bare, false, true),
        };

        Self {
            flavor,
            host: "0.0.0.0".to_string(),
            port,
            api_url: api_url.into(),
            api_key: api_key.into(),
            cache_policy,
            drop_top_p,
            translate_thinking,
            extra_headers: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_MB * 1024 * 1024,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic proxy, when `ANTHROPIC_API_KEY` is set
    pub anthropic: Option<ProxyConfig>,
    /// OpenRouter proxy, when `OPENROUTER_API_KEY` is set
    pub openrouter: Option<ProxyConfig>,
    /// Pooled client tuning shared by both instances
    pub client: ClientSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client = ClientSettings {
            timeout: secs(&var, "UPSTREAM_TIMEOUT_SECS", 300)?,
            connect_timeout: secs(&var, "UPSTREAM_CONNECT_TIMEOUT_SECS", 60)?,
            read_timeout: secs(&var, "UPSTREAM_READ_TIMEOUT_SECS", 240)?,
            max_connections: parsed(&var, "UPSTREAM_POOL_MAX", 50)?,
            max_connections_per_host: parsed(&var, "UPSTREAM_POOL_PER_HOST", 10)?,
            keepalive: secs(&var, "UPSTREAM_KEEPALIVE_SECS", 30)?,
            dns_ttl: secs(&var, "UPSTREAM_DNS_TTL_SECS", 300)?,
            use_env_proxy: flag(&var, "UPSTREAM_USE_ENV_PROXY", true),
        };

        let max_body_bytes = parsed(&var, "MAX_REQUEST_BODY_MB", DEFAULT_MAX_BODY_MB)?
            .saturating_mul(1024 * 1024);

        let anthropic = match var("ANTHROPIC_API_KEY") {
            Some(key) => {
                let url = var("ANTHROPIC_API_URL")
                    .unwrap_or_else(|| "https://api.anthropic.com".to_string());
                let mut proxy = ProxyConfig::new(Flavor::Anthropic, url, key);
                proxy.host = var("PROXY_HOST").unwrap_or(proxy.host);
                proxy.port = parsed(&var, "PROXY_PORT", proxy.port)?;
                proxy.cache_policy = CachePolicy::Ttl(cache_ttl(var("CACHE_CONTROL_TTL")));
                proxy.drop_top_p = flag(&var, "ANTHROPIC_DROP_TOP_P", true);
                proxy.max_body_bytes = max_body_bytes;
                Some(proxy)
            }
            None => None,
        };

        let openrouter = match var("OPENROUTER_API_KEY") {
            Some(key) => {
                let url = var("OPENROUTER_API_URL")
                    .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string());
                let mut proxy = ProxyConfig::new(Flavor::OpenRouter, url, key);
                proxy.host = var("OPENAI_PROXY_HOST").unwrap_or(proxy.host);
                proxy.port = parsed(&var, "OPENAI_PROXY_PORT", proxy.port)?;
                if let Some(referer) = var("OPENROUTER_REFERER") {
                    proxy.extra_headers.push(("HTTP-Referer".to_string(), referer));
                }
                if let Some(title) = var("OPENROUTER_TITLE") {
                    proxy.extra_headers.push(("X-Title".to_string(), title));
                }
                proxy.max_body_bytes = max_body_bytes;
                Some(proxy)
            }
            None => None,
        };

        if anthropic.is_none() && openrouter.is_none() {
            bail!("ANTHROPIC_API_KEY or OPENROUTER_API_KEY must be set");
        }

        if let (Some(a), Some(o)) = (&anthropic, &openrouter) {
            if a.bind_address() == o.bind_address() {
                bail!(
                    "PROXY_PORT and OPENAI_PROXY_PORT both bind {}",
                    a.bind_address()
                );
            }
        }

        Ok(Self {
            anthropic,
            openrouter,
            client,
        })
    }

    /// Every enabled proxy instance
    pub fn proxies(&self) -> Vec<ProxyConfig> {
        self.anthropic
            .iter()
            .chain(self.openrouter.iter())
            .cloned()
            .collect()
    }
}

/// Tracing filter directive built from `LOG_LEVEL`
///
/// Read before the rest of the configuration so that warnings raised while loading
/// it are already visible.
pub fn log_filter_from_env() -> String {
    log_filter(env::var("LOG_LEVEL").ok().as_deref())
}

fn log_filter(level: Option<&str>) -> String {
    let level = level
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("info")
        .to_lowercase();
    format!("cache_proxy={0},tower_http={0}", level)
}

/// Invalid values fall back to `1h` with a warning
fn cache_ttl(value: Option<String>) -> CacheTtl {
    match value {
        None => CacheTtl::default(),
        Some(raw) => raw.trim().parse().unwrap_or_else(|e: String| {
            warn!("{}; using {}", e, CacheTtl::default());
            CacheTtl::default()
        }),
    }
}

fn parsed<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

fn secs<F>(var: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(var, key, default).map(Duration::from_secs)
}

fn flag<F>(var: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
