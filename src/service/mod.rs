//! Service layer: command interpretation and dispatch orchestration.
//!
//! [`CommandInterpreter`] owns the device state machine,
//! [`GatewayService`] routes inbound frames and replies, and the
//! broadcaster forwards state changes from the event bus to every session.

pub mod broadcaster;
pub mod gateway_service;
pub mod interpreter;

pub use broadcaster::spawn_broadcaster;
pub use gateway_service::{Dispatch, GatewayService};
pub use interpreter::{CommandInterpreter, Interpretation, ReportedState, ResetOutcome};
