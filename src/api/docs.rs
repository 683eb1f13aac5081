//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::dto::{DeviceStatusResponse, ResetResponse, SessionListResponse};
use super::handlers::{device, sessions, system};
use crate::domain::{DeviceState, SessionSummary};
use crate::error::{ErrorBody, ErrorResponse};

/// Path of the served OpenAPI JSON document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "horse-gateway",
        description = "REST companion to the horse WebSocket gateway."
    ),
    paths(
        system::health_handler,
        device::get_device,
        device::reset_device,
        sessions::list_sessions,
    ),
    components(schemas(
        system::HealthResponse,
        DeviceStatusResponse,
        ResetResponse,
        SessionListResponse,
        SessionSummary,
        DeviceState,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Device", description = "Horse state and emergency-stop reset"),
        (name = "Sessions", description = "Connected WebSocket clients"),
    )
)]
pub struct ApiDoc;
