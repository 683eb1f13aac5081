//! Top-level router: REST API, WebSocket endpoint, static files and
//! middleware.

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::ws::handler::ws_handler;

/// Builds the complete application.
///
/// The request timeout covers REST routes only; `/ws` connections are
/// long-lived once upgraded.
pub fn build_app(state: AppState, config: &GatewayConfig) -> Router {
    let app = Router::new()
        .merge(api::build_router().layer(TimeoutLayer::new(config.request_timeout)))
        .route("/ws", get(ws_handler));

    let app = match &config.static_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "serving static files");
            app.fallback_service(ServeDir::new(dir))
        }
        None => app,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::driver::SimulatedDriver;

    fn request(uri: &str) -> Request<Body> {
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        request
    }

    #[tokio::test]
    async fn routes_health_and_api() {
        let config = GatewayConfig::default();
        let state = AppState::new(&config, Box::new(SimulatedDriver::new()));
        let app = build_app(state, &config);

        for uri in ["/health", "/api/v1/device", "/api/v1/sessions"] {
            let Ok(response) = app.clone().oneshot(request(uri)).await else {
                panic!("request failed");
            };
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let config = GatewayConfig::default();
        let state = AppState::new(&config, Box::new(SimulatedDriver::new()));
        let app = build_app(state, &config);

        let Ok(response) = app.oneshot(request("/ws")).await else {
            panic!("request failed");
        };
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_without_static_dir() {
        let config = GatewayConfig::default();
        let state = AppState::new(&config, Box::new(SimulatedDriver::new()));
        let app = build_app(state, &config);

        let Ok(response) = app.oneshot(request("/index.html")).await else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
