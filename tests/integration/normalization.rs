//! Request rewriting as observed by the upstream
//!
//! The stub upstream records each request so the forwarded body and headers can
//! be checked exactly.

use axum::http::{HeaderMap, HeaderValue};
use cache_proxy::Flavor;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, constants};

async fn recorded_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    serde_json::from_slice(&requests[0].body).unwrap()
}

#[tokio::test]
async fn test_anthropic_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", constants::SERVER_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());

    let mut incoming = HeaderMap::new();
    incoming.insert("x-api-key", HeaderValue::from_static(constants::CALLER_API_KEY));
    incoming.insert("anthropic-beta", HeaderValue::from_static("extended-cache-ttl-2025-04-11"));
    incoming.insert("authorization", HeaderValue::from_static("Bearer caller-token"));

    let result = handler
        .handle(
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "top_p": 0.7
            }),
            &incoming,
        )
        .await;
    assert!(result.is_success());

    assert_eq!(
        recorded_body(&server).await,
        json!({
            "model": "m",
            "messages": [{
                "role": "user",
                "content": [{
                    "type": "text",
                    "text": "hi",
                    "cache_control": {"type": "ephemeral", "ttl": "1h"}
                }]
            }]
        })
    );

    let requests = server.received_requests().await.unwrap();
    let headers = &requests[0].headers;
    assert_eq!(
        headers.get("x-api-key").unwrap().to_str().unwrap(),
        constants::SERVER_API_KEY
    );
    assert_eq!(
        headers.get("anthropic-version").unwrap().to_str().unwrap(),
        "2023-06-01"
    );
    assert_eq!(
        headers.get("anthropic-beta").unwrap().to_str().unwrap(),
        "extended-cache-ttl-2025-04-11"
    );
    assert!(headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_stray_directive_moves_to_tail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_2"})))
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::Anthropic, &server.uri());
    let result = handler
        .handle(
            json!({
                "model": "m",
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            {"type": "text", "text": "long context", "cache_control": {"type": "ephemeral", "ttl": "5m"}}
                        ]
                    },
                    {
                        "role": "user",
                        "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]
                    }
                ]
            }),
            &HeaderMap::new(),
        )
        .await;
    assert!(result.is_success());

    let body = recorded_body(&server).await;
    assert_eq!(
        body["messages"][0],
        json!({"role": "user", "content": [{"type": "text", "text": "long context"}]})
    );
    assert!(body["messages"][1]["content"][0].get("cache_control").is_none());
    assert_eq!(
        body["messages"][1]["content"][1]["cache_control"],
        json!({"type": "ephemeral", "ttl": "1h"})
    );
}

#[tokio::test]
async fn test_openrouter_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header(
            "authorization",
            format!("Bearer {}", constants::SERVER_API_KEY).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "gen-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::handler(Flavor::OpenRouter, &server.uri());

    let mut incoming = HeaderMap::new();
    incoming.insert("authorization", HeaderValue::from_static("Bearer caller-token"));

    let result = handler
        .handle(
            json!({
                "model": "anthropic/claude-sonnet-4.5",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "top_p": 0.7
            }),
            &incoming,
        )
        .await;
    assert_eq!(result.into_json(), json!({"id": "gen-1"}));

    assert_eq!(
        recorded_body(&server).await,
        json!({
            "model": "anthropic/claude-sonnet-4.5",
            "messages": [
                {"role": "system", "content": "be brief"},
                {
                    "role": "user",
                    "content": [{"type": "text", "text": "hi", "cache_control": {"type": "ephemeral"}}]
                }
            ],
            "top_p": 0.7,
            "reasoning": {"enabled": false, "max_tokens": 3276}
        })
    );
}
