//! Chat endpoint
//!
//! `POST /v1/messages` (Anthropic) or `POST /v1/chat/completions` (OpenRouter).
//! Handles both streaming and non-streaming responses.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    proxy::RelayStream,
    AppState,
};

/// Chat request handler
///
/// The body is read raw so that content-type and JSON errors are reported by this
/// endpoint instead of the extractor.
pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(AppError::BadRequest(
            "Content-Type must be application/json".to_string(),
        ));
    }

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid JSON in request body".to_string()))?;

    let streaming = raw.get("stream").and_then(Value::as_bool).unwrap_or(false);
    info!(
        upstream = %state.handler.flavor(),
        streaming = %streaming,
        "Received chat request"
    );

    if streaming {
        match state.handler.handle_stream(raw, &headers) {
            Ok(stream) => sse_response(stream),
            // Validation failures are answered before any event-stream is committed
            Err(envelope) => Ok(envelope.into_response()),
        }
    } else {
        Ok(state.handler.handle(raw, &headers).await.into_response())
    }
}

/// Build the SSE response around a relay stream
fn sse_response(stream: RelayStream) -> AppResult<Response> {
    let body = Body::from_stream(stream.into_body_stream());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
