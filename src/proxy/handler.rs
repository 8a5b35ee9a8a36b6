//! Proxy handler
//!
//! Entry points for one upstream: unary forwarding, streaming forwarding and the
//! models pass-through. Every failure is classified into an [`ErrorEnvelope`] and
//! returned as data.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::client::{ClientSettings, ConnectionManager, ConnectionPermit};
use super::flavor::{Endpoints, Flavor};
use super::headers::HeaderPolicy;
use super::logging::RequestContext;
use super::stream::{relay, RelayStream};
use crate::config::ProxyConfig;
use crate::error::{ErrorEnvelope, ErrorKind, ProxyError, ProxyResult};
use crate::messages::{
    check, count_cache_directives, normalize, strip_top_p, thinking_to_reasoning, CachePolicy,
    ChatRequest,
};
use crate::routes::metrics;

/// Outcome of a unary call
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardResult {
    /// Upstream JSON document, verbatim
    Success(Value),
    Failure(ErrorEnvelope),
}

impl ForwardResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ForwardResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ForwardResult::Success(_) => None,
            ForwardResult::Failure(envelope) => Some(envelope.kind),
        }
    }

    /// The body returned to callers
    pub fn into_json(self) -> Value {
        match self {
            ForwardResult::Success(value) => value,
            ForwardResult::Failure(envelope) => envelope.to_json(),
        }
    }
}

impl IntoResponse for ForwardResult {
    fn into_response(self) -> Response {
        match self {
            ForwardResult::Success(value) => (StatusCode::OK, Json(value)).into_response(),
            ForwardResult::Failure(envelope) => envelope.into_response(),
        }
    }
}

/// One prepared upstream request
#[derive(Debug, Clone)]
pub(crate) struct UpstreamCall {
    method: Method,
    url: String,
    host_key: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl UpstreamCall {
    /// Wait for a pool slot, send the request and reject non-success statuses
    pub(crate) async fn send(
        &self,
        connections: &ConnectionManager,
        ctx: &RequestContext,
    ) -> ProxyResult<(reqwest::Response, ConnectionPermit)> {
        let permit = connections.acquire_permit(&self.host_key).await?;
        let client = connections.acquire_client().await?;

        let mut request = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            ctx.log_upstream_request(body);
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        ctx.log_upstream_response(response.status().as_u16());

        let response = ensure_success(response).await?;
        Ok((response, permit))
    }
}

/// Turn a non-success response into [`ProxyError::UpstreamStatus`]
async fn ensure_success(response: reqwest::Response) -> ProxyResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let json_body = is_json(response.headers());
    let text = response.text().await.unwrap_or_default();
    let body = if json_body {
        serde_json::from_str(&text).ok()
    } else {
        None
    };

    Err(ProxyError::UpstreamStatus { status, body, text })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// Forwarding pipeline of one proxy instance
pub struct ProxyHandler {
    flavor: Flavor,
    endpoints: Endpoints,
    headers: HeaderPolicy,
    cache_policy: CachePolicy,
    drop_top_p: bool,
    translate_thinking: bool,
    connections: Arc<ConnectionManager>,
}

impl ProxyHandler {
    pub fn new(config: &ProxyConfig, settings: ClientSettings) -> ProxyResult<Self> {
        let endpoints = config.flavor.endpoints(&config.api_url)?;
        let headers = HeaderPolicy::new(config.flavor, &config.api_key, &config.extra_headers)?;

        Ok(Self {
            flavor: config.flavor,
            endpoints,
            headers,
            cache_policy: config.cache_policy,
            drop_top_p: config.drop_top_p,
            translate_thinking: config.translate_thinking,
            connections: Arc::new(ConnectionManager::new(settings)),
        })
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Validate a raw body and apply every rewrite for this upstream
    pub fn prepare_request(&self, raw: Value) -> ProxyResult<ChatRequest> {
        check(&raw).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        let mut request: ChatRequest = serde_json::from_value(raw)
            .map_err(|e| ProxyError::InvalidRequest(format!("Invalid request body: {}", e)))?;

        let before = count_cache_directives(&request.messages);
        request.messages = normalize(&request.messages, &self.cache_policy);
        debug!(
            upstream = %self.flavor,
            directives_before = before,
            policy = %self.cache_policy.describe(),
            "Normalized cache directives"
        );

        if self.drop_top_p {
            if let Some(top_p) = strip_top_p(&mut request) {
                debug!(upstream = %self.flavor, top_p = %top_p, "Dropped top_p");
            }
        }
        if self.translate_thinking {
            thinking_to_reasoning(&mut request);
        }

        Ok(request)
    }

    fn messages_call(&self, request: &ChatRequest, incoming: &HeaderMap) -> ProxyResult<UpstreamCall> {
        let body = serde_json::to_vec(request)?;
        Ok(UpstreamCall {
            method: Method::POST,
            url: self.endpoints.messages.clone(),
            host_key: self.endpoints.host_key.clone(),
            headers: self.headers.prepare(incoming),
            body: Some(Bytes::from(body)),
        })
    }

    fn reject(&self, err: ProxyError, streaming: bool) -> ErrorEnvelope {
        let envelope = err.into_envelope(self.flavor.display_name());
        warn!(
            upstream = %self.flavor,
            streaming = %streaming,
            kind = %envelope.kind,
            error = %envelope.message,
            "Rejected request"
        );
        metrics::record_rejected(self.flavor.name(), envelope.kind.as_str());
        envelope
    }

    /// Forward one request and wait for the complete JSON response
    pub async fn handle(&self, raw: Value, incoming: &HeaderMap) -> ForwardResult {
        let request = match self.prepare_request(raw) {
            Ok(request) => request,
            Err(err) => return ForwardResult::Failure(self.reject(err, false)),
        };

        let ctx = RequestContext::new(self.flavor.name(), &self.endpoints.messages)
            .with_model(request.model_name())
            .with_streaming(false);
        ctx.log_request_start(request.messages.len());

        let outcome = match self.messages_call(&request, incoming) {
            Ok(call) => self.fetch_json(&call, &ctx).await,
            Err(err) => Err(err),
        };
        self.finish(outcome, &ctx)
    }

    /// Forward one request and relay the upstream body as it arrives
    ///
    /// Validation failures are returned before any stream exists. After that every
    /// failure is delivered inside the stream as its final event.
    pub fn handle_stream(
        &self,
        raw: Value,
        incoming: &HeaderMap,
    ) -> Result<RelayStream, ErrorEnvelope> {
        let request = self
            .prepare_request(raw)
            .map_err(|err| self.reject(err, true))?;
        let call = self
            .messages_call(&request, incoming)
            .map_err(|err| self.reject(err, true))?;

        let ctx = RequestContext::new(self.flavor.name(), &self.endpoints.messages)
            .with_model(request.model_name())
            .with_streaming(true);
        ctx.log_request_start(request.messages.len());

        Ok(relay(
            Arc::clone(&self.connections),
            call,
            ctx,
            self.flavor.display_name(),
            self.flavor.sse_framing(),
        ))
    }

    /// Pass a models listing through from the upstream
    ///
    /// Non-JSON bodies are wrapped as `{"data": <text>}`.
    pub async fn list_models(&self, incoming: &HeaderMap) -> ForwardResult {
        let call = UpstreamCall {
            method: Method::GET,
            url: self.endpoints.models.clone(),
            host_key: self.endpoints.host_key.clone(),
            headers: self.headers.prepare(incoming),
            body: None,
        };
        let ctx = RequestContext::new(self.flavor.name(), &self.endpoints.models);

        let outcome = self.fetch_models(&call, &ctx).await;
        self.finish(outcome, &ctx)
    }

    async fn fetch_models(&self, call: &UpstreamCall, ctx: &RequestContext) -> ProxyResult<Value> {
        let (response, _permit) = call.send(&self.connections, ctx).await?;
        if is_json(response.headers()) {
            Ok(response.json::<Value>().await?)
        } else {
            Ok(json!({ "data": response.text().await? }))
        }
    }

    async fn fetch_json(&self, call: &UpstreamCall, ctx: &RequestContext) -> ProxyResult<Value> {
        let (response, _permit) = call.send(&self.connections, ctx).await?;
        Ok(response.json::<Value>().await?)
    }

    fn finish(&self, outcome: ProxyResult<Value>, ctx: &RequestContext) -> ForwardResult {
        match outcome {
            Ok(value) => {
                ctx.log_request_complete();
                metrics::record_request(ctx.upstream, "success", false, ctx.start_time.elapsed());
                ForwardResult::Success(value)
            }
            Err(err) => {
                if let ProxyError::UpstreamStatus { text, .. } = &err {
                    debug!(trace_id = %ctx.trace_id, body = %text, "Upstream error body");
                }
                let envelope = err.into_envelope(self.flavor.display_name());
                ctx.log_error(envelope.kind, &envelope.message);
                metrics::record_request(
                    ctx.upstream,
                    envelope.kind.as_str(),
                    false,
                    ctx.start_time.elapsed(),
                );
                ForwardResult::Failure(envelope)
            }
        }
    }

    /// Close the pooled client
    pub async fn release(&self) {
        self.connections.release().await;
    }
}
