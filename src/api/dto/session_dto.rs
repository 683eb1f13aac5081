//! Session listing DTO.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SessionSummary;

/// Response body for `GET /api/v1/sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    /// Connected sessions, oldest first.
    pub sessions: Vec<SessionSummary>,
    /// Number of sessions.
    pub total: usize,
}
