//! Common test utilities for the cache proxy
//!
//! Shared fixtures: handler and router builders pointed at stub upstreams, a raw
//! TCP upstream that truncates or stalls its response, and SSE frame parsing.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use bytes::Bytes;
use cache_proxy::{
    proxy::StreamEvent, routes, AppState, ClientSettings, Flavor, ProxyConfig, ProxyHandler,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Test configuration constants
pub mod constants {
    /// Server-held upstream key
    pub const SERVER_API_KEY: &str = "server-upstream-key";
    /// Credential a caller tries to smuggle through
    pub const CALLER_API_KEY: &str = "caller-own-key";
}

/// Client settings with short deadlines and no environment proxy
pub fn test_settings() -> ClientSettings {
    ClientSettings {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        use_env_proxy: false,
        ..ClientSettings::default()
    }
}

pub fn proxy_config(flavor: Flavor, upstream_url: &str) -> ProxyConfig {
    ProxyConfig::new(flavor, upstream_url, constants::SERVER_API_KEY)
}

pub fn handler(flavor: Flavor, upstream_url: &str) -> ProxyHandler {
    handler_with(flavor, upstream_url, test_settings())
}

pub fn handler_with(flavor: Flavor, upstream_url: &str, settings: ClientSettings) -> ProxyHandler {
    ProxyHandler::new(&proxy_config(flavor, upstream_url), settings)
        .expect("Failed to create proxy handler")
}

/// axum-test server around the full router of one proxy instance
pub fn test_server(flavor: Flavor, upstream_url: &str) -> TestServer {
    test_server_with(proxy_config(flavor, upstream_url))
}

pub fn test_server_with(config: ProxyConfig) -> TestServer {
    let state = AppState::new(config, test_settings()).expect("Failed to create app state");
    let app = routes::create_router(Arc::new(state));
    TestServer::new(app).expect("Failed to create test server")
}

/// Minimal valid chat request
pub fn chat_request(stream: bool) -> Value {
    json!({
        "model": "claude-sonnet-4-5",
        "max_tokens": 64,
        "stream": stream,
        "messages": [{"role": "user", "content": "hi"}]
    })
}

/// A realistic Anthropic event stream body
pub fn anthropic_stream_body() -> String {
    [
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    ]
    .concat()
}

/// URL of a local port nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// What the raw upstream does after writing its partial body
#[derive(Debug, Clone, Copy)]
pub enum AfterPayload {
    /// Close the socket, leaving the declared body incomplete
    Close,
    /// Keep the socket open without sending anything else
    Stall,
}

/// Raw TCP upstream declaring a longer body than it sends
///
/// Returns the base URL. Every connection is answered the same way.
pub async fn truncating_upstream(payload: Bytes, after: AfterPayload) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let payload = payload.clone();
            tokio::spawn(async move {
                answer_truncated(socket, payload, after).await;
            });
        }
    });

    format!("http://{}", addr)
}

async fn answer_truncated(mut socket: TcpStream, payload: Bytes, after: AfterPayload) {
    read_request(&mut socket).await;

    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\n\r\n",
        payload.len() + 4096
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&payload).await;
    let _ = socket.flush().await;

    match after {
        AfterPayload::Close => drop(socket),
        AfterPayload::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        }
    }
}

/// Consume one HTTP request (headers plus content-length body)
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Drain a relay stream into its events
pub async fn collect_events(stream: cache_proxy::proxy::RelayStream) -> Vec<StreamEvent> {
    stream.collect().await
}

/// Concatenated bytes of every chunk event
pub fn chunk_bytes(events: &[StreamEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk(bytes) => Some(bytes.to_vec()),
            StreamEvent::Error(_) => None,
        })
        .flatten()
        .collect()
}

/// One parsed SSE frame
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("SSE data line is not JSON")
    }
}

/// Split an SSE body into frames; panics on a trailing unterminated frame
pub fn parse_sse_frames(body: &str) -> Vec<SseFrame> {
    assert!(
        body.is_empty() || body.ends_with("\n\n"),
        "SSE body must end with a blank line: {:?}",
        body
    );

    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data.push(payload);
                }
            }
            SseFrame {
                event,
                data: data.join("\n"),
            }
        })
        .collect()
}
