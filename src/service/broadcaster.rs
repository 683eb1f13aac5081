//! Status broadcaster: drains the event bus into the session registry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{EventBus, SessionRegistry};

/// Spawns the single task that turns [`crate::domain::DeviceEvent`]s into
/// broadcasts.
///
/// The bus subscription is taken before this function returns, so no
/// event published afterwards is missed. Events are delivered one at a
/// time in publish order. The task ends when every bus sender is gone.
pub fn spawn_broadcaster(event_bus: &EventBus, registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    let mut event_rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let message = event.to_message();
                    let report = registry.broadcast(message).await;
                    tracing::debug!(
                        event_type = event.event_type_str(),
                        delivered = report.delivered,
                        dropped = report.dropped.len(),
                        "status broadcast"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "broadcaster lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("broadcaster stopped");
    })
}
