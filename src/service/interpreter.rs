//! Command interpreter: the device state machine.
//!
//! Owns the process-wide [`DeviceState`] and the driver behind one
//! exclusive lock. Every transition publishes a [`DeviceEvent`] before the
//! lock is released, which fixes the broadcast order.
//!
//! The tracked state and the last reported state are mirrored into watch
//! channels, so status readers never queue on the device lock.

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};

use crate::domain::{ChangeCause, Command, DeviceEvent, DeviceState, EventBus, SessionId};
use crate::driver::DeviceDriver;
use crate::error::GatewayError;

/// Result of a successfully interpreted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpretation {
    /// The parsed command.
    pub command: Command,
    /// Device state after the command.
    pub state: DeviceState,
    /// Whether the state changed (and a broadcast was queued).
    pub changed: bool,
}

/// Result of the explicit reset action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    /// State before the reset.
    pub previous: DeviceState,
    /// State after the reset.
    pub state: DeviceState,
    /// Whether the latch was cleared.
    pub changed: bool,
}

/// What the device last answered to a status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedState {
    /// State returned by the driver.
    pub state: DeviceState,
    /// When it was read.
    pub read_at: DateTime<Utc>,
}

/// State and driver, only reachable through the interpreter's lock.
#[derive(Debug)]
struct Device {
    state: DeviceState,
    driver: Box<dyn DeviceDriver>,
}

/// Serializes all device access and applies the state machine:
///
/// | Current            | Command       | Action             | Next               |
/// |--------------------|---------------|--------------------|--------------------|
/// | OFF                | `on_h`        | `turn_on()`        | ON                 |
/// | ON                 | `on_h`        | no-op              | ON                 |
/// | ON                 | `off_h`       | `turn_off()`       | OFF                |
/// | OFF                | `off_h`       | no-op              | OFF                |
/// | any                | `em_stop`     | `emergency_stop()` | EMERGENCY_STOPPED  |
/// | EMERGENCY_STOPPED  | `on_h`/`off_h`| rejected           | EMERGENCY_STOPPED  |
/// | any                | `stat_h`      | read-only          | unchanged          |
#[derive(Debug)]
pub struct CommandInterpreter {
    device: Mutex<Device>,
    tracked: watch::Sender<DeviceState>,
    reported: watch::Sender<Option<ReportedState>>,
    event_bus: EventBus,
    driver_name: &'static str,
}

impl CommandInterpreter {
    /// Creates an interpreter in the `Off` state.
    #[must_use]
    pub fn new(driver: Box<dyn DeviceDriver>, event_bus: EventBus) -> Self {
        let driver_name = driver.name();
        Self {
            device: Mutex::new(Device {
                state: DeviceState::Off,
                driver,
            }),
            tracked: watch::channel(DeviceState::Off).0,
            reported: watch::channel(None).0,
            event_bus,
            driver_name,
        }
    }

    /// Returns the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the driver's name.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    /// Parses and applies one command from `session_id`.
    ///
    /// The device lock is held for the single driver call the command
    /// needs and for publishing the resulting event.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownCommand`] for text outside the command set.
    /// - [`GatewayError::EmergencyStopLatched`] for `on_h`/`off_h` while
    ///   stopped.
    /// - [`GatewayError::DriverFailure`] if turning on or off failed; the
    ///   state is unchanged.
    /// - [`GatewayError::EmergencyStopUnconfirmed`] if the emergency stop
    ///   failed at the device. The state is latched to
    ///   `EmergencyStopped` anyway and a warning event is published.
    pub async fn interpret(
        &self,
        session_id: SessionId,
        text: &str,
    ) -> Result<Interpretation, GatewayError> {
        let command = text.parse::<Command>().inspect_err(|_| {
            tracing::info!(%session_id, text, "rejected unknown command");
        })?;
        let cause = ChangeCause::command(session_id, command);

        let mut device = self.device.lock().await;
        let current = device.state;

        let next = match (current, command) {
            (_, Command::Status) => {
                let reported = device.driver.read_status().await;
                self.reported.send_replace(Some(ReportedState {
                    state: reported,
                    read_at: Utc::now(),
                }));
                if reported != current {
                    tracing::warn!(
                        %session_id,
                        tracked = %current,
                        %reported,
                        "device reports a different state than tracked"
                    );
                }
                current
            }
            (_, Command::EmergencyStop) => {
                if let Err(e) = device.driver.emergency_stop().await {
                    self.latch(&mut device, DeviceState::EmergencyStopped);
                    tracing::error!(%session_id, error = %e, "emergency stop NOT confirmed by device");
                    self.event_bus.publish(DeviceEvent::EmergencyStopUnconfirmed {
                        reason: e.to_string(),
                        cause,
                        timestamp: Utc::now(),
                    });
                    return Err(GatewayError::EmergencyStopUnconfirmed(e));
                }
                DeviceState::EmergencyStopped
            }
            (DeviceState::EmergencyStopped, Command::On | Command::Off) => {
                tracing::warn!(%session_id, %command, "command rejected while emergency stopped");
                return Err(GatewayError::EmergencyStopLatched(command));
            }
            (DeviceState::Off, Command::On) => {
                device
                    .driver
                    .turn_on()
                    .await
                    .map_err(|source| GatewayError::DriverFailure {
                        operation: "turn_on",
                        source,
                    })?;
                DeviceState::On
            }
            (DeviceState::On, Command::Off) => {
                device
                    .driver
                    .turn_off()
                    .await
                    .map_err(|source| GatewayError::DriverFailure {
                        operation: "turn_off",
                        source,
                    })?;
                DeviceState::Off
            }
            (DeviceState::On, Command::On) | (DeviceState::Off, Command::Off) => current,
        };

        let changed = self.transition(&mut device, next, cause);
        drop(device);

        tracing::info!(%session_id, %command, state = %next, changed, "command applied");
        Ok(Interpretation {
            command,
            state: next,
            changed,
        })
    }

    /// Clears the emergency-stop latch. This is the only way out of
    /// `EmergencyStopped`; in any other state it does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DriverFailure`] if the driver refuses or
    /// fails the reset; the latch stays engaged.
    pub async fn reset(&self) -> Result<ResetOutcome, GatewayError> {
        let mut device = self.device.lock().await;
        let previous = device.state;
        if !previous.is_emergency_stopped() {
            return Ok(ResetOutcome {
                previous,
                state: previous,
                changed: false,
            });
        }

        device
            .driver
            .reset()
            .await
            .map_err(|source| GatewayError::DriverFailure {
                operation: "reset",
                source,
            })?;
        let changed = self.transition(&mut device, DeviceState::Off, ChangeCause::Reset);
        drop(device);

        tracing::warn!("emergency stop reset; device is OFF");
        Ok(ResetOutcome {
            previous,
            state: DeviceState::Off,
            changed,
        })
    }

    /// Returns the tracked device state without waiting for an in-flight
    /// command.
    #[must_use]
    pub fn current_state(&self) -> DeviceState {
        *self.tracked.borrow()
    }

    /// Returns what the device answered to the most recent `stat_h`, or
    /// `None` before the first one. Never touches the device.
    #[must_use]
    pub fn reported_state(&self) -> Option<ReportedState> {
        *self.reported.borrow()
    }

    fn latch(&self, device: &mut Device, next: DeviceState) {
        device.state = next;
        self.tracked.send_replace(next);
    }

    /// Applies `next` and publishes the change. Caller holds the lock.
    fn transition(&self, device: &mut Device, next: DeviceState, cause: ChangeCause) -> bool {
        let previous = device.state;
        if previous == next {
            return false;
        }
        self.latch(device, next);
        self.event_bus.publish(DeviceEvent::StateChanged {
            previous,
            state: next,
            cause,
            timestamp: Utc::now(),
        });
        true
    }
}
