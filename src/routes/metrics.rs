//! Prometheus metrics endpoint
//!
//! Exposes proxy metrics in Prometheus format for monitoring.

use std::time::Duration;

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        warn!("Metrics recorder already installed");
    }
    handle
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "cache_proxy_requests_total",
        "Total number of proxied requests by upstream and outcome"
    );
    metrics::describe_counter!(
        "cache_proxy_rejected_requests_total",
        "Requests rejected before reaching the upstream"
    );
    metrics::describe_histogram!(
        "cache_proxy_request_duration_seconds",
        "Upstream call duration in seconds"
    );
    metrics::describe_counter!(
        "cache_proxy_stream_interruptions_total",
        "Streams ended by a mid-stream failure"
    );
    metrics::describe_counter!(
        "cache_proxy_stream_bytes_total",
        "Bytes relayed from upstream streams"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a finished upstream call; `outcome` is `success` or an error kind
pub fn record_request(upstream: &str, outcome: &str, streaming: bool, duration: Duration) {
    metrics::counter!(
        "cache_proxy_requests_total",
        "upstream" => upstream.to_string(),
        "outcome" => outcome.to_string(),
        "streaming" => streaming.to_string()
    )
    .increment(1);
    metrics::histogram!("cache_proxy_request_duration_seconds", "upstream" => upstream.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_rejected(upstream: &str, kind: &str) {
    metrics::counter!(
        "cache_proxy_rejected_requests_total",
        "upstream" => upstream.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_stream_interrupted(upstream: &str) {
    metrics::counter!("cache_proxy_stream_interruptions_total", "upstream" => upstream.to_string())
        .increment(1);
}

pub fn record_stream_bytes(upstream: &str, bytes: usize) {
    metrics::counter!("cache_proxy_stream_bytes_total", "upstream" => upstream.to_string())
        .increment(bytes as u64);
}
