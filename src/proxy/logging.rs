//! Request logging with correlation IDs
//!
//! Every upstream call gets a [`RequestContext`] so its start, upstream round-trip
//! and outcome can be correlated in logs.

use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Context for tracking one proxied call
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this call (for log correlation)
    pub trace_id: String,
    pub start_time: Instant,
    /// Upstream flavor handling this call
    pub upstream: &'static str,
    /// Upstream URL being called
    pub endpoint: String,
    pub model: Option<String>,
    pub streaming: bool,
}

impl RequestContext {
    pub fn new(upstream: &'static str, endpoint: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string()[..8].to_string(), // Short ID for readability
            start_time: Instant::now(),
            upstream,
            endpoint: endpoint.to_string(),
            model: None,
            streaming: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn log_request_start(&self, message_count: usize) {
        info!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            model = ?self.model,
            streaming = %self.streaming,
            message_count = %message_count,
            "Request started"
        );
    }

    /// Log the rewritten body (debug level only)
    pub fn log_upstream_request(&self, body: &[u8]) {
        debug!(
            trace_id = %self.trace_id,
            url = %self.endpoint,
            body_size = %body.len(),
            body = %String::from_utf8_lossy(body),
            "Sending request to upstream"
        );
    }

    pub fn log_upstream_response(&self, status: u16) {
        info!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            status = %status,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    pub fn log_request_complete(&self) {
        info!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            model = ?self.model,
            streaming = %self.streaming,
            elapsed_ms = %self.elapsed_ms(),
            "Request completed successfully"
        );
    }

    pub fn log_stream_started(&self) {
        info!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            elapsed_ms = %self.elapsed_ms(),
            "Streaming response started"
        );
    }

    pub fn log_stream_ended(&self, chunks: usize, bytes: usize) {
        info!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            chunks = %chunks,
            bytes = %bytes,
            elapsed_ms = %self.elapsed_ms(),
            "Streaming response ended"
        );
    }

    pub fn log_stream_interrupted(&self, bytes: usize, error: &str) {
        warn!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            bytes = %bytes,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Stream interrupted"
        );
    }

    /// Log a classified failure
    pub fn log_error(&self, kind: ErrorKind, error: &str) {
        error!(
            trace_id = %self.trace_id,
            upstream = %self.upstream,
            url = %self.endpoint,
            model = ?self.model,
            streaming = %self.streaming,
            kind = %kind,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Request failed"
        );
    }
}
