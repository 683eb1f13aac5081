//! Outbound WebSocket frames.

use std::fmt;

use super::DeviceState;

/// A text frame sent from the gateway to a client.
///
/// Frames are plain text because the UI renders them verbatim into its
/// status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Current device state (`ON`, `OFF`, `EMERGENCY_STOPPED`).
    Status(DeviceState),
    /// Error addressed to a single client, rendered as `ERROR: <text>`.
    Error(String),
    /// Safety warning broadcast to everyone, rendered as `WARNING: <text>`.
    Warning(String),
}

impl ServerMessage {
    /// Renders the frame body.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(state) => f.write_str(state.status_text()),
            Self::Error(text) => write!(f, "ERROR: {text}"),
            Self::Warning(text) => write!(f, "WARNING: {text}"),
        }
    }
}

impl From<DeviceState> for ServerMessage {
    fn from(state: DeviceState) -> Self {
        Self::Status(state)
    }
}
