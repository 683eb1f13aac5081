//! Actuator state tracked by the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Power state of the horse actuator.
///
/// Exactly one value exists per process, owned by the
/// [`crate::service::CommandInterpreter`]. [`DeviceState::EmergencyStopped`]
/// is a latch: it is left only through an explicit reset, never through
/// `on_h` or `off_h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    /// Motor/relay de-energized. Initial state at startup.
    #[default]
    Off,
    /// Motor/relay energized.
    On,
    /// Emergency stop engaged; motion disabled until reset.
    EmergencyStopped,
}

impl DeviceState {
    /// Returns the status text sent to WebSocket clients.
    #[must_use]
    pub const fn status_text(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::EmergencyStopped => "EMERGENCY_STOPPED",
        }
    }

    /// Returns `true` while the emergency-stop latch is engaged.
    #[must_use]
    pub const fn is_emergency_stopped(&self) -> bool {
        matches!(self, Self::EmergencyStopped)
    }

    /// Parses a status reply from the motion controller.
    ///
    /// Matching is token based and case-insensitive, so replies such as
    /// `"horse ON"` or `"status: em_stop"` are understood. Returns `None`
    /// when no known token is present.
    #[must_use]
    pub fn from_controller_reply(reply: &str) -> Option<Self> {
        let mut found = None;
        for token in reply
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
        {
            match token.to_ascii_uppercase().as_str() {
                "EM_STOP" | "EMERGENCY_STOPPED" | "EMERGENCY" | "STOPPED" | "ESTOP" => {
                    return Some(Self::EmergencyStopped);
                }
                "ON" => found = found.or(Some(Self::On)),
                "OFF" => found = found.or(Some(Self::Off)),
                _ => {}
            }
        }
        found
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn default_is_off() {
        assert_eq!(DeviceState::default(), DeviceState::Off);
    }

    #[test]
    fn status_texts_are_distinct() {
        let texts = [
            DeviceState::Off.status_text(),
            DeviceState::On.status_text(),
            DeviceState::EmergencyStopped.status_text(),
        ];
        assert_ne!(texts[0], texts[1]);
        assert_ne!(texts[1], texts[2]);
        assert_ne!(texts[0], texts[2]);
    }

    #[test]
    fn serializes_as_status_text() {
        let json = serde_json::to_string(&DeviceState::EmergencyStopped).unwrap_or_default();
        assert_eq!(json, "\"EMERGENCY_STOPPED\"");
    }

    #[test]
    fn parses_controller_replies() {
        assert_eq!(
            DeviceState::from_controller_reply("horse ON"),
            Some(DeviceState::On)
        );
        assert_eq!(
            DeviceState::from_controller_reply("off"),
            Some(DeviceState::Off)
        );
        assert_eq!(
            DeviceState::from_controller_reply("status: em_stop"),
            Some(DeviceState::EmergencyStopped)
        );
        assert_eq!(
            DeviceState::from_controller_reply("ON but EMERGENCY_STOPPED"),
            Some(DeviceState::EmergencyStopped)
        );
    }

    #[test]
    fn rejects_replies_without_state_tokens() {
        assert_eq!(
            DeviceState::from_controller_reply("No communication from horse"),
            None
        );
        assert_eq!(DeviceState::from_controller_reply(""), None);
    }
}
