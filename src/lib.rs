//! # horse-gateway
//!
//! WebSocket command and telemetry gateway for a horse actuator driven by a
//! ClearCore motion controller.
//!
//! Clients connect over WebSocket and send short text commands (`on_h`,
//! `off_h`, `em_stop`, `stat_h`). A single command interpreter owns the
//! device state; every state change is broadcast to all connected sessions
//! in the order it happened. The emergency stop latches until it is reset
//! through the REST API.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Handler (ws/)
//!     ├── REST Handlers (api/)
//!     │
//!     ├── GatewayService (service/)
//!     │     ├── CommandInterpreter ── DeviceDriver (driver/)
//!     │     └── Broadcaster ◄── EventBus (domain/)
//!     │
//!     └── SessionRegistry (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod router;
pub mod service;
pub mod ws;
