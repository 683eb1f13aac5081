//! Device status and reset DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::DeviceState;

/// Response body for `GET /api/v1/device`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceStatusResponse {
    /// State tracked by the gateway; what clients are told.
    pub state: DeviceState,
    /// State the device answered to the most recent `stat_h`; `null` before
    /// the first one.
    pub reported_state: Option<DeviceState>,
    /// When `reported_state` was read.
    pub reported_at: Option<DateTime<Utc>>,
    /// Whether the emergency-stop latch is engaged.
    pub emergency_stopped: bool,
    /// Active driver name.
    pub driver: String,
    /// Number of connected WebSocket sessions.
    pub sessions: usize,
    /// When the status was read.
    pub checked_at: DateTime<Utc>,
}

/// Response body for `POST /api/v1/device/reset`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    /// State before the reset.
    pub previous_state: DeviceState,
    /// State after the reset.
    pub state: DeviceState,
    /// Whether the latch was cleared by this call.
    pub changed: bool,
    /// When the reset was processed.
    pub reset_at: DateTime<Utc>,
}
