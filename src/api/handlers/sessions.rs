//! Session listing endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::SessionListResponse;
use crate::app_state::AppState;

/// `GET /sessions` — Connected WebSocket sessions.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "List sessions",
    description = "Returns every connected WebSocket session, oldest first.",
    responses(
        (status = 200, description = "Connected sessions", body = SessionListResponse),
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.gateway.registry().list();
    Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions))
}
