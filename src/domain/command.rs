//! The closed set of WebSocket commands.

use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// A command a UI client may send over `/ws`.
///
/// The wire form is the exact, case-sensitive text of the frame. Adding a
/// command means adding a variant here and handling it in the
/// interpreter's match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `on_h`: energize the horse.
    On,
    /// `off_h`: de-energize the horse.
    Off,
    /// `em_stop`: engage the emergency-stop latch.
    EmergencyStop,
    /// `stat_h`: ask for the current status.
    Status,
}

impl Command {
    /// Returns the wire text of this command.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on_h",
            Self::Off => "off_h",
            Self::EmergencyStop => "em_stop",
            Self::Status => "stat_h",
        }
    }
}

impl FromStr for Command {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_h" => Ok(Self::On),
            "off_h" => Ok(Self::Off),
            "em_stop" => Ok(Self::EmergencyStop),
            "stat_h" => Ok(Self::Status),
            other => Err(GatewayError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
