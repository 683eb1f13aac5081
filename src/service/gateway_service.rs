//! Gateway service: per-command dispatch and session lifecycle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::broadcaster::spawn_broadcaster;
use super::interpreter::{CommandInterpreter, Interpretation};
use crate::config::GatewayConfig;
use crate::domain::{
    Command, EventBus, ServerMessage, Session, SessionGuard, SessionId, SessionRegistry,
};
use crate::driver::DeviceDriver;
use crate::error::GatewayError;

/// What [`GatewayService::dispatch`] did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// State changed; the broadcaster delivers the new status to everyone.
    Broadcast(Interpretation),
    /// A frame was sent to the issuing session only.
    Replied(ServerMessage),
    /// No-op command; nothing was sent.
    Ignored(Interpretation),
}

/// Orchestration layer between connections, the interpreter, and the
/// session registry.
///
/// Owns references to the [`CommandInterpreter`] for device state and the
/// [`SessionRegistry`] for delivery, plus the broadcaster task that links
/// them. Connection tasks only talk to this type.
#[derive(Debug)]
pub struct GatewayService {
    interpreter: Arc<CommandInterpreter>,
    registry: Arc<SessionRegistry>,
    broadcaster: JoinHandle<()>,
    session_buffer: usize,
    off_on_disconnect: bool,
}

impl GatewayService {
    /// Wires the event bus, registry, interpreter and broadcaster task for
    /// `driver`. Must be called from within a tokio runtime.
    #[must_use]
    pub fn from_config(config: &GatewayConfig, driver: Box<dyn DeviceDriver>) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let registry = Arc::new(SessionRegistry::new(
            config.send_timeout,
            config.max_sessions,
        ));
        let interpreter = Arc::new(CommandInterpreter::new(driver, event_bus.clone()));
        let broadcaster = spawn_broadcaster(&event_bus, Arc::clone(&registry));
        Self {
            interpreter,
            registry,
            broadcaster,
            session_buffer: config.session_buffer,
            off_on_disconnect: config.off_on_disconnect,
        }
    }

    /// Returns `false` once the broadcaster task has ended, after which
    /// state changes no longer reach any session.
    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        !self.broadcaster.is_finished()
    }

    /// Returns the command interpreter.
    #[must_use]
    pub fn interpreter(&self) -> &Arc<CommandInterpreter> {
        &self.interpreter
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Registers a new session.
    ///
    /// The guard unregisters the session when dropped; the receiver yields
    /// the frames to write to the socket.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TooManySessions`] when the registry is full.
    pub fn open_session(
        &self,
    ) -> Result<(SessionGuard, mpsc::Receiver<ServerMessage>), GatewayError> {
        let (session, outbound) = Session::new(self.session_buffer);
        let session_id = self.registry.register(session)?;
        tracing::info!(%session_id, sessions = self.registry.len(), "session opened");
        Ok((
            SessionGuard::new(Arc::clone(&self.registry), session_id),
            outbound,
        ))
    }

    /// Handles one inbound text frame from `session_id`.
    ///
    /// - state changed: nothing sent here; the broadcaster reaches every
    ///   session, the sender included;
    /// - `stat_h`: the status goes to the sender only;
    /// - any error: an `ERROR:` frame goes to the sender only.
    pub async fn dispatch(&self, session_id: SessionId, text: &str) -> Dispatch {
        match self.interpreter.interpret(session_id, text).await {
            Ok(outcome) if outcome.changed => Dispatch::Broadcast(outcome),
            Ok(outcome) if outcome.command == Command::Status => {
                self.reply(session_id, ServerMessage::Status(outcome.state))
                    .await
            }
            Ok(outcome) => Dispatch::Ignored(outcome),
            Err(e) => self.reply(session_id, e.to_message()).await,
        }
    }

    /// Tears a session down and applies the disconnect policy.
    pub async fn close_session(&self, guard: SessionGuard) {
        let session_id = guard.session_id();
        drop(guard);
        tracing::info!(%session_id, sessions = self.registry.len(), "session closed");

        if self.off_on_disconnect {
            match self
                .interpreter
                .interpret(session_id, Command::Off.as_str())
                .await
            {
                Ok(outcome) if outcome.changed => {
                    tracing::info!(%session_id, "horse turned off after disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%session_id, error = %e, "off on disconnect not applied");
                }
            }
        }
    }

    async fn reply(&self, session_id: SessionId, message: ServerMessage) -> Dispatch {
        if let Err(e) = self.registry.send(session_id, message.clone()).await {
            tracing::debug!(%session_id, error = %e, "reply not delivered");
        }
        Dispatch::Replied(message)
    }
}

impl Drop for GatewayService {
    fn drop(&mut self) {
        self.broadcaster.abort();
    }
}
