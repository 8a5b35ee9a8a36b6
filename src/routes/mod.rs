//! HTTP routes for the cache proxy
//!
//! This module defines all HTTP endpoints exposed by one proxy instance.

pub mod health;
pub mod messages;
pub mod metrics;
pub mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the router for one proxy instance
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let messages_route = state.handler.flavor().messages_route();

    let api_routes = Router::new()
        .route(messages_route, post(messages::messages))
        .route("/v1/models", get(models::list_models))
        // Replaces axum's 2 MiB default
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes));

    let public_routes = Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (applied to all routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
