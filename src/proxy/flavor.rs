//! Per-upstream policy
//!
//! The two proxies are structurally identical; everything that differs between
//! them is decided here.

use reqwest::Url;

use crate::error::{ProxyError, ProxyResult};
use crate::streaming::SseFraming;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Anthropic Messages API, cache directives carry a TTL
    Anthropic,
    /// OpenRouter chat completions, cache directives are bare flags
    OpenRouter,
}

impl Flavor {
    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Anthropic => "anthropic",
            Flavor::OpenRouter => "openrouter",
        }
    }

    /// Provider name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Flavor::Anthropic => "Anthropic",
            Flavor::OpenRouter => "OpenRouter",
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            Flavor::Anthropic => "Anthropic Cache Proxy",
            Flavor::OpenRouter => "OpenRouter Cache Proxy",
        }
    }

    /// Path callers post chat requests to
    pub fn messages_route(&self) -> &'static str {
        match self {
            Flavor::Anthropic => "/v1/messages",
            Flavor::OpenRouter => "/v1/chat/completions",
        }
    }

    pub fn sse_framing(&self) -> SseFraming {
        match self {
            Flavor::Anthropic => SseFraming::NamedEvent,
            Flavor::OpenRouter => SseFraming::DataOnly,
        }
    }

    /// Resolve the upstream URLs for a configured base URL
    pub fn endpoints(&self, base_url: &str) -> ProxyResult<Endpoints> {
        let base = base_url.trim_end_matches('/');

        let (messages, models) = match self {
            Flavor::Anthropic => {
                let root = base.strip_suffix("/v1/messages").unwrap_or(base);
                (format!("{}/v1/messages", root), format!("{}/v1/models", root))
            }
            Flavor::OpenRouter => {
                let root = if base.ends_with("/v1") {
                    base.to_string()
                } else {
                    format!("{}/v1", base)
                };
                (
                    format!("{}/chat/completions", root),
                    format!("{}/models", root),
                )
            }
        };

        let parsed = Url::parse(&messages).map_err(|e| {
            ProxyError::Internal(format!("Invalid upstream URL '{}': {}", base_url, e))
        })?;
        let host = parsed.host_str().ok_or_else(|| {
            ProxyError::Internal(format!("Upstream URL '{}' has no host", base_url))
        })?;
        let host_key = match parsed.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Endpoints {
            messages,
            models,
            host_key,
        })
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Upstream URLs of one proxy instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub messages: String,
    pub models: String,
    /// `host:port` of the upstream, keying the per-destination connection limit
    pub host_key: String,
}
