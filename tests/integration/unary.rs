//! Unary forwarding and failure classification

use std::time::Duration;

use axum::http::HeaderMap;
use cache_proxy::{ClientSettings, ErrorKind, Flavor, ForwardResult};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_success_returns_upstream_json_verbatim() {
    let server = MockServer::start().await;
    let upstream = json!({
        "id": "msg_1",
        "type": "message",
        "content": [{"type": "text", "text": "Hello"}],
        "usage": {"input_tokens": 10, "cache_creation_input_tokens": 10}
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    assert_eq!(result, ForwardResult::Success(upstream));
}

#[tokio::test]
async fn test_api_error_passes_upstream_json_through() {
    let server = MockServer::start().await;
    let upstream_error = json!({
        "type": "error",
        "error": {"type": "overloaded_error", "message": "Overloaded"}
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(upstream_error.clone()))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ApiError));
    assert_eq!(result.into_json(), upstream_error);
}

#[tokio::test]
async fn test_api_error_with_text_body_uses_generic_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::OpenRouter, &server.uri());
    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    assert_eq!(
        result.into_json(),
        json!({"error": {"type": "api_error", "message": "OpenRouter API returned status 502"}})
    );
}

#[tokio::test]
async fn test_timeout_returns_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "late"}))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let settings = ClientSettings {
        timeout: Duration::from_millis(200),
        ..common::test_settings()
    };
    let handler = common::handler_with(Flavor::Anthropic, &server.uri(), settings);
    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    let body = result.into_json();
    assert_eq!(body["error"]["type"], "timeout_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_connection_refused_returns_network_error() {
    let url = common::closed_port_url().await;
    let handler = common::handler(Flavor::Anthropic, &url);

    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::NetworkError));
    assert_eq!(result.into_json()["error"]["type"], "network_error");
}

#[tokio::test]
async fn test_invalid_json_response_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("not json at all", "application/json"),
        )
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let result = handler.handle(common::chat_request(false), &HeaderMap::new()).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::InternalError));
}

#[tokio::test]
async fn test_validation_failure_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let cases = vec![
        json!({"messages": [{"role": "user", "content": "hi"}]}),
        json!({"model": "m"}),
        json!({"model": "m", "messages": []}),
        json!({"model": "m", "messages": [{"role": "user"}]}),
        json!({"model": "m", "messages": [{"content": "hi"}]}),
        json!({"model": "m", "messages": ["hi"]}),
    ];

    for case in cases {
        let result = handler.handle(case, &HeaderMap::new()).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidRequest));
    }
}

#[tokio::test]
async fn test_models_passthrough() {
    let server = MockServer::start().await;
    let models = json!({"data": [{"id": "claude-sonnet-4-5", "type": "model"}], "has_more": false});
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models.clone()))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let result = handler.list_models(&HeaderMap::new()).await;

    assert_eq!(result, ForwardResult::Success(models));
}

#[tokio::test]
async fn test_models_non_json_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_string("model-a\nmodel-b"))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::OpenRouter, &server.uri());
    let result = handler.list_models(&HeaderMap::new()).await;

    assert_eq!(result.into_json(), json!({"data": "model-a\nmodel-b"}));
}

#[tokio::test]
async fn test_loosely_typed_fields_are_forwarded_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "gen_1"})))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::OpenRouter, &server.uri());
    let result = handler
        .handle(
            json!({
                "model": "anthropic/claude-sonnet-4.5",
                "max_tokens": 1024.0,
                "thinking": {"budget_tokens": 900},
                "messages": [{"role": 7, "content": "hi"}]
            }),
            &HeaderMap::new(),
        )
        .await;

    assert!(result.is_success());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["max_tokens"], json!(1024.0));
    assert_eq!(body["messages"][0]["role"], json!(7));
    assert_eq!(body["reasoning"], json!({"enabled": false, "max_tokens": 900}));
    assert!(body.get("thinking").is_none());
}
