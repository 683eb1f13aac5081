//! Device driver seam: the boundary to the physical horse actuator.
//!
//! [`DeviceDriver`] is implemented by [`SerialDriver`] (ClearCore motion
//! controller over a line-oriented serial link) and [`SimulatedDriver`]
//! (in-memory, used by tests and as the default).

pub mod serial;
pub mod simulated;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

pub use serial::SerialDriver;
pub use simulated::{SimulatedDriver, SimulatedFaults};

use crate::config::GatewayConfig;
use crate::domain::DeviceState;
use crate::error::DriverError;

/// Capability set of the horse actuator.
///
/// Calls are made one at a time by the command interpreter while it holds
/// the device lock, hence `&mut self`.
#[async_trait]
pub trait DeviceDriver: Send + fmt::Debug {
    /// Short driver name for logs and the status API.
    fn name(&self) -> &'static str;

    /// Energizes the horse.
    async fn turn_on(&mut self) -> Result<(), DriverError>;

    /// De-energizes the horse.
    async fn turn_off(&mut self) -> Result<(), DriverError>;

    /// Engages the emergency stop.
    ///
    /// Must be idempotent and must always issue the hardware call, even if
    /// the device already looks stopped. Failures are returned, never
    /// swallowed.
    async fn emergency_stop(&mut self) -> Result<(), DriverError>;

    /// Reads the state the device reports. Falls back to the last
    /// acknowledged state when the device cannot be read.
    async fn read_status(&mut self) -> DeviceState;

    /// Clears the emergency stop on the device side, if it has one.
    async fn reset(&mut self) -> Result<(), DriverError>;
}

/// Which [`DeviceDriver`] the gateway runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    /// [`SimulatedDriver`].
    #[default]
    Simulated,
    /// [`SerialDriver`] on `SERIAL_PORT`.
    Serial,
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Self::Simulated),
            "serial" | "clearcore" => Ok(Self::Serial),
            other => Err(format!("unknown device driver: {other}")),
        }
    }
}

/// Builds the driver selected by the configuration.
///
/// # Errors
///
/// Returns [`DriverError::Io`] if the serial device cannot be opened.
pub async fn build_driver(config: &GatewayConfig) -> Result<Box<dyn DeviceDriver>, DriverError> {
    match config.driver {
        DriverKind::Simulated => Ok(Box::new(SimulatedDriver::new())),
        DriverKind::Serial => {
            let driver = SerialDriver::open(&config.serial_port, config.driver_response_timeout)
                .await?;
            Ok(Box::new(driver))
        }
    }
}
