//! REST API layer: route handlers, DTOs, OpenAPI docs and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod docs;
pub mod dto;
pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints and the OpenAPI
/// document (plus Swagger UI with the `swagger-ui` feature).
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(openapi_routes())
}

#[cfg(feature = "swagger-ui")]
fn openapi_routes() -> Router<AppState> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url(docs::OPENAPI_PATH, docs::ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn openapi_routes() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;
    use utoipa::OpenApi;

    Router::new().route(
        docs::OPENAPI_PATH,
        get(|| async { Json(docs::ApiDoc::openapi()) }),
    )
}
