//! Service info and health endpoints
//!
//! - `/` - Service information and endpoint listing
//! - `/health` - Liveness with connection pool status

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

/// Connection pool snapshot
#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub client_open: bool,
    pub available_connections: usize,
    pub max_connections: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub upstream: String,
    pub uptime_seconds: u64,
    pub pool: PoolStats,
}

/// Service information endpoint
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    let flavor = state.handler.flavor();

    let mut endpoints = BTreeMap::new();
    endpoints.insert("/".to_string(), "Service information".to_string());
    endpoints.insert(
        flavor.messages_route().to_string(),
        format!("{} compatible chat endpoint (POST)", flavor.display_name()),
    );
    endpoints.insert(
        "/v1/models".to_string(),
        format!("{} compatible models endpoint (GET)", flavor.display_name()),
    );
    endpoints.insert("/health".to_string(), "Health check".to_string());
    endpoints.insert("/metrics".to_string(), "Prometheus metrics".to_string());

    Json(ServiceInfo {
        service: flavor.service_name().to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let connections = state.handler.connections();

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        service: format!("{}-cache-proxy", state.handler.flavor()),
        upstream: state.handler.endpoints().messages.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pool: PoolStats {
            client_open: connections.is_open().await,
            available_connections: connections.available_permits(),
            max_connections: connections.settings().max_connections,
        },
    };

    (StatusCode::OK, Json(response))
}
