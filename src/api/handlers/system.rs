//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::DeviceState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    device_state: DeviceState,
    sessions: usize,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, tracked device state and session count. \
                   Reports `degraded` with 503 once status broadcasts have stopped.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Status broadcaster has stopped", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, status) = if state.gateway.is_broadcasting() {
        (StatusCode::OK, "healthy")
    } else {
        tracing::error!("status broadcaster is not running");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            device_state: state.gateway.interpreter().current_state(),
            sessions: state.gateway.registry().len(),
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::driver::SimulatedDriver;

    #[tokio::test]
    async fn health_reports_version_and_state() {
        let state = AppState::new(&GatewayConfig::default(), Box::new(SimulatedDriver::new()));
        let app = routes().with_state(state);

        let Ok(request) = Request::builder().uri("/health").body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::OK);

        let Ok(bytes) = to_bytes(response.into_body(), 64 * 1024).await else {
            panic!("body read failed");
        };
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["device_state"], "OFF");
        assert_eq!(body["sessions"], 0);
    }
}
