//! Concurrent registry of connected client sessions.
//!
//! [`SessionRegistry`] owns every [`Session`] and is the only way to reach
//! a client's outbound channel. The map lock is a `std::sync::RwLock` held
//! only for map access, never across an `.await`, which also lets
//! [`SessionGuard`] unregister synchronously from `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use super::{ServerMessage, SessionId};
use crate::error::GatewayError;

/// One connected client and its bounded outbound channel.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    sender: mpsc::Sender<ServerMessage>,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session with an outbound buffer of `buffer` frames.
    ///
    /// The returned receiver is drained by the connection's writer task.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let session = Self {
            id: SessionId::new(),
            sender,
            connected_at: Utc::now(),
        };
        (session, receiver)
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns when the WebSocket handshake completed.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

/// Lightweight view of a session for the REST API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    /// Session identifier.
    #[schema(value_type = String, format = Uuid)]
    pub session_id: SessionId,
    /// Connection-open timestamp.
    pub connected_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            connected_at: session.connected_at,
        }
    }
}

/// Outcome of a [`SessionRegistry::broadcast`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of sessions the frame was queued for.
    pub delivered: usize,
    /// Sessions whose send failed or timed out; already unregistered.
    pub dropped: Vec<SessionId>,
}

/// Central store for all live sessions.
///
/// # Concurrency
///
/// - Registration, removal and iteration may happen from any task.
/// - `broadcast` works on a snapshot taken under a short read lock, so
///   concurrent (un)registration never blocks on a slow client.
/// - Every send is bounded by the configured timeout.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    send_timeout: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(send_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            send_timeout,
            max_sessions,
        }
    }

    /// Returns the per-send timeout.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Returns the session limit.
    #[must_use]
    pub const fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Returns `true` while another session can be registered.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.len() < self.max_sessions
    }

    /// Adds a session, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TooManySessions`] when the registry already
    /// holds `max_sessions` sessions.
    pub fn register(&self, session: Session) -> Result<SessionId, GatewayError> {
        let mut map = self.write();
        if map.len() >= self.max_sessions {
            return Err(GatewayError::TooManySessions(self.max_sessions));
        }
        let id = session.id;
        map.insert(id, session);
        tracing::debug!(session_id = %id, sessions = map.len(), "session registered");
        Ok(id)
    }

    /// Removes a session. Dropping the returned value closes its channel.
    pub fn unregister(&self, session_id: SessionId) -> Option<Session> {
        let removed = self.write().remove(&session_id);
        if removed.is_some() {
            tracing::debug!(%session_id, "session unregistered");
        }
        removed
    }

    /// Sends a frame to one session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if the session is not
    /// registered, or [`GatewayError::SendFailure`] if its channel is
    /// closed or stays full past the send timeout. In the latter case the
    /// session has been unregistered.
    pub async fn send(
        &self,
        session_id: SessionId,
        message: ServerMessage,
    ) -> Result<(), GatewayError> {
        let sender = self
            .read()
            .get(&session_id)
            .map(|s| s.sender.clone())
            .ok_or(GatewayError::SessionNotFound(session_id))?;

        if deliver(&sender, message, self.send_timeout).await {
            Ok(())
        } else {
            tracing::warn!(%session_id, "direct send failed; dropping session");
            self.unregister(session_id);
            Err(GatewayError::SendFailure(session_id))
        }
    }

    /// Sends a frame to every registered session.
    ///
    /// Sends run concurrently and independently; sessions that fail are
    /// unregistered and listed in the report, never retried.
    pub async fn broadcast(&self, message: ServerMessage) -> BroadcastReport {
        let targets: Vec<(SessionId, mpsc::Sender<ServerMessage>)> = self
            .read()
            .values()
            .map(|s| (s.id, s.sender.clone()))
            .collect();

        let timeout = self.send_timeout;
        let outcomes = join_all(targets.into_iter().map(|(id, sender)| {
            let message = message.clone();
            async move { (id, deliver(&sender, message, timeout).await) }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (id, ok) in outcomes {
            if ok {
                report.delivered += 1;
            } else {
                tracing::warn!(session_id = %id, "broadcast send failed; dropping session");
                self.unregister(id);
                report.dropped.push(id);
            }
        }
        report
    }

    /// Returns `true` if the session is registered.
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.read().contains_key(&session_id)
    }

    /// Returns summaries of all sessions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.read().values().map(SessionSummary::from).collect();
        summaries.sort_by_key(|s| s.connected_at);
        summaries
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queues one frame, bounded by `timeout`. Returns `false` on a closed
/// channel or when the buffer stays full for the whole timeout.
async fn deliver(
    sender: &mpsc::Sender<ServerMessage>,
    message: ServerMessage,
    timeout: Duration,
) -> bool {
    matches!(
        tokio::time::timeout(timeout, sender.send(message)).await,
        Ok(Ok(()))
    )
}

/// Unregisters its session when dropped.
///
/// Held by the connection task for the lifetime of the socket, so the
/// session leaves the registry on every exit path.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
}

impl SessionGuard {
    /// Wraps an already registered session.
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>, session_id: SessionId) -> Self {
        Self {
            registry,
            session_id,
        }
    }

    /// Returns the guarded session's identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.session_id);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::DeviceState;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn registry() -> SessionRegistry {
        SessionRegistry::new(TIMEOUT, 8)
    }

    fn register(
        registry: &SessionRegistry,
        buffer: usize,
    ) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (session, rx) = Session::new(buffer);
        let Ok(id) = registry.register(session) else {
            panic!("registration failed");
        };
        (id, rx)
    }

    #[test]
    fn register_and_unregister() {
        let registry = registry();
        let (id, _rx) = register(&registry, 4);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id).is_some());
        assert!(registry.is_empty());
        assert!(registry.unregister(id).is_none());
    }

    #[test]
    fn register_refuses_past_capacity() {
        let registry = SessionRegistry::new(TIMEOUT, 1);
        let (_id, _rx) = register(&registry, 4);
        let (extra, _rx2) = Session::new(4);
        assert!(matches!(
            registry.register(extra),
            Err(GatewayError::TooManySessions(1))
        ));
    }

    #[tokio::test]
    async fn send_reaches_only_the_target() {
        let registry = registry();
        let (a, mut rx_a) = register(&registry, 4);
        let (_b, mut rx_b) = register(&registry, 4);

        let result = registry.send(a, ServerMessage::Status(DeviceState::On)).await;
        assert!(result.is_ok());
        assert_eq!(rx_a.try_recv().ok(), Some(ServerMessage::Status(DeviceState::On)));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_session_fails() {
        let registry = registry();
        let result = registry
            .send(SessionId::new(), ServerMessage::Status(DeviceState::Off))
            .await;
        assert!(matches!(result, Err(GatewayError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn send_to_closed_channel_drops_session() {
        let registry = registry();
        let (id, rx) = register(&registry, 4);
        drop(rx);

        let result = registry.send(id, ServerMessage::Status(DeviceState::Off)).await;
        assert!(matches!(result, Err(GatewayError::SendFailure(_))));
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let registry = registry();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            receivers.push(register(&registry, 4).1);
        }

        let report = registry
            .broadcast(ServerMessage::Status(DeviceState::EmergencyStopped))
            .await;
        assert_eq!(report.delivered, 3);
        assert!(report.dropped.is_empty());
        for rx in &mut receivers {
            assert_eq!(
                rx.try_recv().ok(),
                Some(ServerMessage::Status(DeviceState::EmergencyStopped))
            );
        }
    }

    #[tokio::test]
    async fn slow_session_is_dropped_without_blocking_others() {
        let registry = registry();
        // Buffer of one that nobody drains: the second frame cannot be queued.
        let (slow, _slow_rx) = register(&registry, 1);
        let mut fast: Vec<_> = (0..5).map(|_| register(&registry, 4)).collect();

        let first = registry.broadcast(ServerMessage::Status(DeviceState::On)).await;
        assert_eq!(first.delivered, 6);

        let started = std::time::Instant::now();
        let second = registry.broadcast(ServerMessage::Status(DeviceState::Off)).await;
        assert!(started.elapsed() < TIMEOUT * 10);
        assert_eq!(second.delivered, 5);
        assert_eq!(second.dropped, vec![slow]);
        assert!(!registry.contains(slow));

        for (id, rx) in &mut fast {
            assert!(registry.contains(*id));
            assert_eq!(rx.try_recv().ok(), Some(ServerMessage::Status(DeviceState::On)));
            assert_eq!(rx.try_recv().ok(), Some(ServerMessage::Status(DeviceState::Off)));
        }
    }

    #[tokio::test]
    async fn broadcast_skips_sessions_registered_afterwards() {
        let registry = registry();
        let (_a, mut rx_a) = register(&registry, 4);
        let _ = registry.broadcast(ServerMessage::Status(DeviceState::On)).await;
        let (_b, mut rx_b) = register(&registry, 4);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn broadcast_during_registration_churn_reaches_stable_sessions() {
        const ROUNDS: usize = 50;
        let registry = Arc::new(SessionRegistry::new(Duration::from_millis(500), 64));
        let (a, mut rx_a) = register(&registry, ROUNDS);
        let (b, mut rx_b) = register(&registry, ROUNDS);

        let churn: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let (session, _rx) = Session::new(1);
                        let Ok(id) = registry.register(session) else {
                            panic!("churn registration failed");
                        };
                        tokio::task::yield_now().await;
                        let _ = registry.unregister(id);
                    }
                })
            })
            .collect();

        for round in 0..ROUNDS {
            let state = if round % 2 == 0 {
                DeviceState::On
            } else {
                DeviceState::Off
            };
            let report = registry.broadcast(ServerMessage::Status(state)).await;
            assert!(report.delivered >= 2);
            assert!(!report.dropped.contains(&a));
            assert!(!report.dropped.contains(&b));
        }
        for task in churn {
            assert!(task.await.is_ok());
        }

        assert_eq!(registry.len(), 2);
        for rx in [&mut rx_a, &mut rx_b] {
            for round in 0..ROUNDS {
                let expected = if round % 2 == 0 {
                    DeviceState::On
                } else {
                    DeviceState::Off
                };
                assert_eq!(rx.try_recv().ok(), Some(ServerMessage::Status(expected)));
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let registry = Arc::new(registry());
        let (id, _rx) = register(&registry, 4);
        {
            let guard = SessionGuard::new(Arc::clone(&registry), id);
            assert_eq!(guard.session_id(), id);
            assert!(registry.contains(id));
        }
        assert!(!registry.contains(id));
    }

    #[test]
    fn list_is_ordered_by_connection_time() {
        let registry = registry();
        let (a, _rx_a) = register(&registry, 4);
        let (b, _rx_b) = register(&registry, 4);
        let listed: Vec<SessionId> = registry.list().into_iter().map(|s| s.session_id).collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a));
        assert!(listed.contains(&b));
    }
}
