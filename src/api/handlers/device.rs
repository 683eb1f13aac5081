//! Device endpoints: status and emergency-stop reset.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{DeviceStatusResponse, ResetResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /device` — Tracked and reported device state.
#[utoipa::path(
    get,
    path = "/api/v1/device",
    tag = "Device",
    summary = "Device status",
    description = "Returns the state the gateway tracks and what the device answered to the \
                   most recent stat_h. Served from a snapshot; never waits on the device.",
    responses(
        (status = 200, description = "Current device status", body = DeviceStatusResponse),
    )
)]
pub async fn get_device(State(state): State<AppState>) -> impl IntoResponse {
    let interpreter = state.gateway.interpreter();
    let tracked = interpreter.current_state();
    let reported = interpreter.reported_state();

    Json(DeviceStatusResponse {
        state: tracked,
        reported_state: reported.map(|r| r.state),
        reported_at: reported.map(|r| r.read_at),
        emergency_stopped: tracked.is_emergency_stopped(),
        driver: interpreter.driver_name().to_string(),
        sessions: state.gateway.registry().len(),
        checked_at: Utc::now(),
    })
}

/// `POST /device/reset` — Clear the emergency-stop latch.
#[utoipa::path(
    post,
    path = "/api/v1/device/reset",
    tag = "Device",
    summary = "Reset emergency stop",
    description = "Leaves EMERGENCY_STOPPED and returns to OFF. A no-op in any other state. \
                   The new status is broadcast to every WebSocket session.",
    responses(
        (status = 200, description = "Reset processed", body = ResetResponse),
        (status = 502, description = "Device refused or failed the reset", body = ErrorResponse),
    )
)]
pub async fn reset_device(
    State(state): State<AppState>,
) -> Result<Json<ResetResponse>, GatewayError> {
    let outcome = state.gateway.interpreter().reset().await?;
    Ok(Json(ResetResponse {
        previous_state: outcome.previous,
        state: outcome.state,
        changed: outcome.changed,
        reset_at: Utc::now(),
    }))
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/device", get(get_device))
        .route("/device/reset", post(reset_device))
}
