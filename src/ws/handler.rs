//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// Answers `503 Service Unavailable` instead of upgrading when the session
/// registry is full.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let registry = state.gateway.registry();
    if !registry.has_capacity() {
        tracing::warn!(limit = registry.max_sessions(), "rejecting websocket upgrade");
        return GatewayError::TooManySessions(registry.max_sessions()).into_response();
    }

    let gateway = Arc::clone(&state.gateway);
    ws.on_upgrade(move |socket| run_connection(socket, gateway))
        .into_response()
}
