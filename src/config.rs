//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to the defaults documented on each field.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::driver::DriverKind;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (`LISTEN_ADDR`,
    /// default `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Device driver (`DEVICE_DRIVER`: `simulated` or `serial`).
    pub driver: DriverKind,

    /// Controller tty (`SERIAL_PORT`, default `/dev/clearCore`).
    pub serial_port: PathBuf,

    /// How long the serial driver waits for a controller reply
    /// (`DRIVER_RESPONSE_TIMEOUT_MS`, default 500).
    pub driver_response_timeout: Duration,

    /// Bound on every send to a session (`SEND_TIMEOUT_MS`, default 1000).
    pub send_timeout: Duration,

    /// Outbound frames buffered per session (`SESSION_BUFFER`, default 32).
    pub session_buffer: usize,

    /// Maximum concurrent sessions (`MAX_SESSIONS`, default 64).
    pub max_sessions: usize,

    /// Capacity of the device event bus (`EVENT_BUS_CAPACITY`, default 1024).
    pub event_bus_capacity: usize,

    /// Send `off_h` on behalf of a session when it disconnects
    /// (`OFF_ON_DISCONNECT`, default false).
    pub off_on_disconnect: bool,

    /// Directory of UI files served at `/` (`STATIC_DIR`, unset by default).
    pub static_dir: Option<PathBuf>,

    /// Timeout for REST requests (`REQUEST_TIMEOUT_SECS`, default 10).
    pub request_timeout: Duration,

    /// Log output format (`LOG_FORMAT`: `text` or `json`).
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            driver: DriverKind::Simulated,
            serial_port: PathBuf::from("/dev/clearCore"),
            driver_response_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(1000),
            session_buffer: 32,
            max_sessions: 64,
            event_bus_capacity: 1024,
            off_on_disconnect: false,
            static_dir: None,
            request_timeout: Duration::from_secs(10),
            log_format: LogFormat::Text,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`GatewayConfig::default`] values when a variable is
    /// not set. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or `DEVICE_DRIVER` is set but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr: SocketAddr = match std::env::var("LISTEN_ADDR") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.listen_addr,
        };

        let driver = match std::env::var("DEVICE_DRIVER") {
            Ok(v) => v.parse::<DriverKind>()?,
            Err(_) => defaults.driver,
        };

        let serial_port = std::env::var("SERIAL_PORT")
            .map(PathBuf::from)
            .unwrap_or(defaults.serial_port);

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            driver,
            serial_port,
            driver_response_timeout: Duration::from_millis(parse_env(
                "DRIVER_RESPONSE_TIMEOUT_MS",
                500,
            )),
            send_timeout: Duration::from_millis(parse_env("SEND_TIMEOUT_MS", 1000)),
            session_buffer: parse_env("SESSION_BUFFER", defaults.session_buffer),
            max_sessions: parse_env("MAX_SESSIONS", defaults.max_sessions),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            off_on_disconnect: parse_env_bool("OFF_ON_DISCONNECT", defaults.off_on_disconnect),
            static_dir: std::env::var("STATIC_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 10)),
            log_format,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
