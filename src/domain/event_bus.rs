//! Ordered hand-off of device events from the interpreter to the
//! broadcaster.
//!
//! There is one publisher (the interpreter, under its device lock) and, in a
//! running gateway, one subscriber (the broadcaster task). Events reach the
//! subscriber in publish order.

use tokio::sync::broadcast;

use super::DeviceEvent;

/// Channel carrying [`DeviceEvent`]s in the order transitions were applied.
///
/// A subscriber that falls more than `capacity` events behind loses the
/// oldest ones and is told how many through `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Queues `event` for the broadcaster.
    ///
    /// Returns `false` when nothing is subscribed, in which case sessions
    /// will not hear about the event.
    pub fn publish(&self, event: DeviceEvent) -> bool {
        let event_type = event.event_type_str();
        if self.sender.send(event).is_ok() {
            return true;
        }
        tracing::warn!(event_type, "device event published with no broadcaster");
        false
    }

    /// Subscribes to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }
}
