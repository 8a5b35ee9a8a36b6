//! Models endpoint
//!
//! Passes the upstream's model listing through.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// List available models
pub async fn list_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.handler.list_models(&headers).await.into_response()
}
