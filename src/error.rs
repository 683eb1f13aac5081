//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a numeric code, an HTTP status for the REST API, and a text
//! frame for WebSocket clients. [`DriverError`] describes failures at the
//! device boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Command, DeviceState, ServerMessage, SessionId};

/// Structured JSON error response body.
///
/// All REST error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "on_h rejected: emergency stop is engaged; reset required"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Failure reported by a [`crate::driver::DeviceDriver`].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// I/O failure on the device link.
    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller did not answer in time.
    #[error("no communication from horse")]
    NoResponse,

    /// The controller answered with an error line.
    #[error("controller rejected command: {0}")]
    Rejected(String),

    /// The controller answered, but not with the state the command should
    /// have produced. Also covers a late reply to an earlier command.
    #[error("controller reply {reply:?} does not confirm {command}")]
    Unconfirmed {
        /// Wire text of the command sent.
        command: &'static str,
        /// The line the controller sent back.
        reply: String,
    },

    /// The device link is closed.
    #[error("device link closed")]
    LinkClosed,

    /// The device refused to clear the emergency stop in its current state.
    #[error("device reports {0}; power-cycle the controller before resetting")]
    ResetRefused(DeviceState),
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                  |
/// |-----------|-------------------|------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request              |
/// | 2000–2999 | State / Not Found | 409 / 404 / 503              |
/// | 3000–3999 | Server            | 500 Internal Server Error    |
/// | 4000–4999 | Device            | 502 Bad Gateway              |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Inbound WebSocket text is not one of the four commands.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// `on_h` / `off_h` received while the emergency stop is latched.
    #[error("{0} rejected: emergency stop is engaged; reset required")]
    EmergencyStopLatched(Command),

    /// Direct send target is not registered.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The registry is full.
    #[error("too many sessions (limit {0})")]
    TooManySessions(usize),

    /// A session's outbound channel is broken or stalled; it was dropped.
    #[error("send to session {0} failed")]
    SendFailure(SessionId),

    /// A turn-on / turn-off call failed at the device.
    #[error("{operation} failed: {source}")]
    DriverFailure {
        /// Driver operation that failed.
        operation: &'static str,
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },

    /// The device could not confirm an emergency stop.
    #[error("emergency stop could not be confirmed: {0}")]
    EmergencyStopUnconfirmed(#[source] DriverError),

    /// A gateway task failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::UnknownCommand(_) => 1001,
            Self::EmergencyStopLatched(_) => 2001,
            Self::SessionNotFound(_) => 2002,
            Self::TooManySessions(_) => 2003,
            Self::Internal(_) => 3000,
            Self::SendFailure(_) => 3001,
            Self::DriverFailure { .. } => 4001,
            Self::EmergencyStopUnconfirmed(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownCommand(_) => StatusCode::BAD_REQUEST,
            Self::EmergencyStopLatched(_) => StatusCode::CONFLICT,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManySessions(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SendFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DriverFailure { .. } | Self::EmergencyStopUnconfirmed(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Renders this error as a frame for the issuing WebSocket client.
    #[must_use]
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error(self.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
