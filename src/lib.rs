//! Cache proxy - prompt-cache normalizing reverse proxy
//!
//! This library provides the core functionality for the cache proxy server. It
//! rewrites chat requests so that exactly one prompt-cache directive sits at the
//! tail of the conversation, forwards them to Anthropic or OpenRouter, and relays
//! the responses with every failure classified into a typed error.

pub mod config;
pub mod error;
pub mod messages;
pub mod proxy;
pub mod routes;
pub mod streaming;

use std::time::Instant;

use anyhow::{Context, Result};

pub use crate::config::{Config, ProxyConfig};
pub use crate::error::{ErrorEnvelope, ErrorKind};
pub use crate::proxy::{ClientSettings, Flavor, ForwardResult, ProxyHandler};

/// State of one proxy instance, shared across its request handlers
pub struct AppState {
    pub config: ProxyConfig,
    pub handler: ProxyHandler,
    pub start_time: Instant,
}

impl AppState {
    /// Create the state for one configured upstream
    pub fn new(config: ProxyConfig, client: ClientSettings) -> Result<Self> {
        let handler = ProxyHandler::new(&config, client)
            .with_context(|| format!("Failed to initialize {} proxy", config.flavor))?;

        Ok(Self {
            config,
            handler,
            start_time: Instant::now(),
        })
    }

    /// Release the pooled upstream client
    pub async fn shutdown(&self) {
        self.handler.release().await;
    }
}
