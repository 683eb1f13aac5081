//! WebSocket layer: upgrade handling and the per-connection loop.
//!
//! The endpoint at `/ws` speaks a plain text protocol: clients send one of
//! `on_h`, `off_h`, `em_stop`, `stat_h` and receive status, error, and
//! warning frames.

pub mod connection;
pub mod handler;
