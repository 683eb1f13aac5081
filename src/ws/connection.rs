//! WebSocket connection lifecycle.
//!
//! Each connection runs two tasks: a reader that dispatches inbound
//! commands and a writer that drains the session's outbound channel into
//! the socket. When either ends, the other is stopped and the session is
//! closed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::{ServerMessage, SessionId};
use crate::error::GatewayError;
use crate::service::GatewayService;

/// Runs one WebSocket connection to completion.
///
/// The session is registered here, after the handshake, and leaves the
/// registry on every exit path: normal close, read error, write timeout,
/// or the session being dropped by a broadcast.
pub async fn run_connection(socket: WebSocket, gateway: Arc<GatewayService>) {
    let (mut ws_tx, ws_rx) = socket.split();

    let (guard, outbound) = match gateway.open_session() {
        Ok(opened) => opened,
        Err(e) => {
            tracing::warn!(error = %e, "refusing websocket session");
            let _ = ws_tx.send(Message::text(e.to_message().to_text())).await;
            let _ = ws_tx.close().await;
            return;
        }
    };
    let session_id = guard.session_id();
    let send_timeout = gateway.registry().send_timeout();

    let mut send_task = tokio::spawn(write_loop(ws_tx, outbound, send_timeout, session_id));
    let mut recv_task = tokio::spawn(read_loop(ws_rx, Arc::clone(&gateway), session_id));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.close_session(guard).await;
}

/// Reads frames until the client goes away.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    gateway: Arc<GatewayService>,
    session_id: SessionId,
) {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let text = text.as_str().to_owned();
                tracing::debug!(%session_id, %text, "ws frame received");
                // Own task: aborting this loop must not cancel a device command.
                let dispatcher = Arc::clone(&gateway);
                let dispatch =
                    tokio::spawn(async move { dispatcher.dispatch(session_id, &text).await });
                if let Err(e) = dispatch.await {
                    tracing::error!(%session_id, error = %e, "dispatch task failed");
                    let failure = GatewayError::Internal("command dispatch failed".to_string());
                    let _ = gateway.registry().send(session_id, failure.to_message()).await;
                }
            }
            Ok(Message::Binary(_)) => {
                let notice = ServerMessage::Error("binary frames are not supported".to_string());
                let _ = gateway.registry().send(session_id, notice).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "ws read failed");
                break;
            }
        }
    }
}

/// Writes outbound frames until the channel closes or a write stalls.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
    send_timeout: Duration,
    session_id: SessionId,
) {
    while let Some(message) = outbound.recv().await {
        let frame = Message::text(message.to_text());
        match tokio::time::timeout(send_timeout, ws_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(%session_id, error = %e, "ws write failed");
                return;
            }
            Err(_) => {
                tracing::warn!(%session_id, "ws write timed out; closing connection");
                return;
            }
        }
    }
    let _ = tokio::time::timeout(send_timeout, ws_tx.close()).await;
}
