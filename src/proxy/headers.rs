//! Upstream header preparation
//!
//! Caller credentials are never forwarded. Every upstream request carries the
//! server-held key, fixed protocol headers and, for Anthropic, a small allow-list
//! of caller headers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use super::flavor::Flavor;
use crate::error::{ProxyError, ProxyResult};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const ANTHROPIC_VERSION_HEADER: HeaderName = HeaderName::from_static("anthropic-version");
const ANTHROPIC_BETA: HeaderName = HeaderName::from_static("anthropic-beta");

/// Caller headers copied to Anthropic when present
const ANTHROPIC_PASSTHROUGH: [HeaderName; 2] = [ANTHROPIC_BETA, USER_AGENT];

/// Header policy of one proxy instance
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    flavor: Flavor,
    /// Credential and static headers, fixed at construction
    fixed: HeaderMap,
}

impl HeaderPolicy {
    /// Build the policy; `extra` headers are added to every request
    pub fn new(flavor: Flavor, api_key: &str, extra: &[(String, String)]) -> ProxyResult<Self> {
        let mut fixed = HeaderMap::new();

        match flavor {
            Flavor::Anthropic => {
                fixed.insert(X_API_KEY, sensitive(api_key)?);
            }
            Flavor::OpenRouter => {
                fixed.insert(AUTHORIZATION, sensitive(&format!("Bearer {}", api_key))?);
            }
        }
        fixed.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProxyError::Internal(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProxyError::Internal(format!("Invalid value for header '{}': {}", name, e))
            })?;
            fixed.insert(name, value);
        }

        Ok(Self { flavor, fixed })
    }

    /// Headers for one upstream request, given the caller's headers
    pub fn prepare(&self, incoming: &HeaderMap) -> HeaderMap {
        let mut headers = self.fixed.clone();

        if self.flavor == Flavor::Anthropic {
            let version = incoming
                .get(&ANTHROPIC_VERSION_HEADER)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static(ANTHROPIC_VERSION));
            headers.insert(ANTHROPIC_VERSION_HEADER, version);

            for name in &ANTHROPIC_PASSTHROUGH {
                if let Some(value) = incoming.get(name) {
                    headers.insert(name.clone(), value.clone());
                }
            }
        }

        headers
    }
}

fn sensitive(value: &str) -> ProxyResult<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| ProxyError::Internal("Invalid API key format".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
