//! Pooled client under concurrent calls
//!
//! The stub upstream answers after a fixed delay, so elapsed wall time shows
//! whether calls overlapped or queued for a connection slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use cache_proxy::{ClientSettings, Flavor, ProxyHandler};
use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

const DELAY: Duration = Duration::from_millis(300);

async fn delayed_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "msg"}))
                .set_delay(DELAY),
        )
        .mount(&server)
        .await;
    server
}

async fn run_concurrently(handler: Arc<ProxyHandler>, calls: usize) -> Duration {
    let start = Instant::now();
    let results = join_all((0..calls).map(|_| {
        let handler = Arc::clone(&handler);
        async move {
            handler
                .handle(common::chat_request(false), &HeaderMap::new())
                .await
        }
    }))
    .await;

    assert!(results.iter().all(|result| result.is_success()));
    start.elapsed()
}

#[tokio::test]
async fn test_concurrent_calls_overlap() {
    let server = delayed_upstream().await;
    let handler = Arc::new(common::handler(Flavor::Anthropic, &server.uri()));

    let elapsed = run_concurrently(handler, 8).await;

    // Close to one delay interval, far below 8 x DELAY
    assert!(elapsed < DELAY * 3, "took {:?}", elapsed);
}

#[tokio::test]
async fn test_per_host_limit_queues_calls() {
    let server = delayed_upstream().await;
    let settings = ClientSettings {
        max_connections_per_host: 1,
        ..common::test_settings()
    };
    let handler = Arc::new(common::handler_with(Flavor::Anthropic, &server.uri(), settings));

    let elapsed = run_concurrently(Arc::clone(&handler), 3).await;

    // Queued, not failed: three calls served one after another
    assert!(elapsed >= DELAY * 3, "took {:?}", elapsed);
    assert_eq!(
        handler.connections().available_permits(),
        handler.connections().settings().max_connections
    );
}

#[tokio::test]
async fn test_release_then_reuse() {
    let server = delayed_upstream().await;
    let handler = common::handler(Flavor::Anthropic, &server.uri());

    assert!(handler
        .handle(common::chat_request(false), &HeaderMap::new())
        .await
        .is_success());
    assert!(handler.connections().is_open().await);

    handler.release().await;
    handler.release().await;
    assert!(!handler.connections().is_open().await);

    // A released client is rebuilt on the next call
    assert!(handler
        .handle(common::chat_request(false), &HeaderMap::new())
        .await
        .is_success());
}
