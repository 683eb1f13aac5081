//! Domain events reflecting device state changes.
//!
//! The interpreter publishes a [`DeviceEvent`] through the
//! [`super::EventBus`] while it still holds the device lock, so the order of
//! events on the bus is the order in which transitions were applied. The
//! broadcaster turns each event into a [`ServerMessage`] for all sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Command, DeviceState, ServerMessage, SessionId};

/// What caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeCause {
    /// A WebSocket command from a session.
    Command {
        /// Issuing session.
        session_id: SessionId,
        /// Wire text of the command.
        command: &'static str,
    },
    /// The explicit emergency-stop reset action.
    Reset,
}

impl ChangeCause {
    /// Builds a cause from a session command.
    #[must_use]
    pub const fn command(session_id: SessionId, command: Command) -> Self {
        Self::Command {
            session_id,
            command: command.as_str(),
        }
    }
}

/// Domain event emitted by the command interpreter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The tracked device state changed.
    StateChanged {
        /// State before the transition.
        previous: DeviceState,
        /// State after the transition.
        state: DeviceState,
        /// Who or what caused it.
        cause: ChangeCause,
        /// When the transition was applied.
        timestamp: DateTime<Utc>,
    },

    /// The driver failed to confirm an emergency stop. The software latch
    /// is engaged regardless.
    EmergencyStopUnconfirmed {
        /// Driver error text.
        reason: String,
        /// Who issued the stop.
        cause: ChangeCause,
        /// When the failure was observed.
        timestamp: DateTime<Utc>,
    },
}

impl DeviceEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::EmergencyStopUnconfirmed { .. } => "emergency_stop_unconfirmed",
        }
    }

    /// Renders the frame broadcast to every session for this event.
    #[must_use]
    pub fn to_message(&self) -> ServerMessage {
        match self {
            Self::StateChanged { state, .. } => ServerMessage::Status(*state),
            Self::EmergencyStopUnconfirmed { reason, .. } => ServerMessage::Warning(format!(
                "emergency stop could not be confirmed by the device ({reason}); \
                 treat the horse as unsafe"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changed_renders_status() {
        let event = DeviceEvent::StateChanged {
            previous: DeviceState::Off,
            state: DeviceState::On,
            cause: ChangeCause::command(SessionId::new(), Command::On),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "state_changed");
        assert_eq!(event.to_message(), ServerMessage::Status(DeviceState::On));
    }

    #[test]
    fn unconfirmed_stop_renders_warning() {
        let event = DeviceEvent::EmergencyStopUnconfirmed {
            reason: "no response".to_string(),
            cause: ChangeCause::command(SessionId::new(), Command::EmergencyStop),
            timestamp: Utc::now(),
        };
        let ServerMessage::Warning(text) = event.to_message() else {
            unreachable!("expected a warning");
        };
        assert!(text.contains("no response"));
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let event = DeviceEvent::StateChanged {
            previous: DeviceState::On,
            state: DeviceState::EmergencyStopped,
            cause: ChangeCause::Reset,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"state_changed\""));
        assert!(json.contains("EMERGENCY_STOPPED"));
    }
}
