//! In-memory stand-in for the horse actuator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::DeviceDriver;
use crate::domain::DeviceState;
use crate::error::DriverError;

/// Fault switches shared between a [`SimulatedDriver`] and its test.
///
/// Each flag makes the matching operation fail with
/// [`DriverError::NoResponse`] until cleared.
#[derive(Debug, Default)]
pub struct SimulatedFaults {
    /// Fail `turn_on`.
    pub fail_turn_on: AtomicBool,
    /// Fail `turn_off`.
    pub fail_turn_off: AtomicBool,
    /// Fail `emergency_stop`.
    pub fail_emergency_stop: AtomicBool,
    /// Fail `reset`.
    pub fail_reset: AtomicBool,
    /// Count of hardware calls made (all operations except `read_status`).
    pub calls: AtomicUsize,
}

impl SimulatedFaults {
    /// Sets every failure flag.
    pub fn fail_everything(&self, fail: bool) {
        self.fail_turn_on.store(fail, Ordering::SeqCst);
        self.fail_turn_off.store(fail, Ordering::SeqCst);
        self.fail_emergency_stop.store(fail, Ordering::SeqCst);
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of hardware calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Simulated actuator that tracks its own state.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    state: DeviceState,
    latency: Option<Duration>,
    faults: Arc<SimulatedFaults>,
}

impl SimulatedDriver {
    /// Creates a driver that starts `Off` with no latency and no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artificial delay to every hardware call.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the shared fault switches.
    #[must_use]
    pub fn faults(&self) -> Arc<SimulatedFaults> {
        Arc::clone(&self.faults)
    }

    async fn hardware_call(&self, fail: &AtomicBool) -> Result<(), DriverError> {
        self.faults.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if fail.load(Ordering::SeqCst) {
            return Err(DriverError::NoResponse);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn turn_on(&mut self) -> Result<(), DriverError> {
        self.hardware_call(&self.faults.fail_turn_on).await?;
        self.state = DeviceState::On;
        Ok(())
    }

    async fn turn_off(&mut self) -> Result<(), DriverError> {
        self.hardware_call(&self.faults.fail_turn_off).await?;
        self.state = DeviceState::Off;
        Ok(())
    }

    async fn emergency_stop(&mut self) -> Result<(), DriverError> {
        self.hardware_call(&self.faults.fail_emergency_stop).await?;
        self.state = DeviceState::EmergencyStopped;
        Ok(())
    }

    async fn read_status(&mut self) -> DeviceState {
        self.state
    }

    async fn reset(&mut self) -> Result<(), DriverError> {
        self.hardware_call(&self.faults.fail_reset).await?;
        self.state = DeviceState::Off;
        Ok(())
    }
}
