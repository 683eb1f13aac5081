//! Domain layer: device state, commands, sessions, and the event system.
//!
//! This module holds the server-side model: the tracked [`DeviceState`],
//! the closed [`Command`] set, session identity and the
//! [`SessionRegistry`], and the [`EventBus`] that orders broadcasts.

pub mod command;
pub mod device_event;
pub mod device_state;
pub mod event_bus;
pub mod message;
pub mod session_id;
pub mod session_registry;

pub use command::Command;
pub use device_event::{ChangeCause, DeviceEvent};
pub use device_state::DeviceState;
pub use event_bus::EventBus;
pub use message::ServerMessage;
pub use session_id::SessionId;
pub use session_registry::{BroadcastReport, Session, SessionGuard, SessionRegistry, SessionSummary};
