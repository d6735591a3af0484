//! Connection handles: the registry's view of one physical socket session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_common::id::{prefix, prefixed_ulid};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{GatewayError, Result};

/// Why the gateway is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal teardown after the peer went away.
    Closed,
    /// A newer connection for the same identity took over.
    Replaced,
    /// The handshake or a lifecycle hook refused the connection.
    Rejected,
    /// Forcibly disconnected by an operator.
    Kicked,
}

/// One physical socket session.
///
/// Handle ids are transport-assigned and never reused, so a handle must not
/// be used again once it has been disconnected.
pub trait ConnectionHandle: Send + Sync {
    /// Transport-assigned session id, distinct from the client identity.
    fn id(&self) -> &str;

    /// Whether the session can still accept writes.
    fn is_connected(&self) -> bool;

    /// Queue an event for delivery. Best effort, single attempt.
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Ask the transport to close the session. Idempotent.
    fn disconnect(&self, reason: CloseReason) -> Result<()>;
}

pub type Handle = Arc<dyn ConnectionHandle>;

/// Frames queued by a [`WsHandle`] for its socket task.
#[derive(Debug)]
pub enum Outbound {
    Dispatch { event: String, payload: Value },
    Close(CloseReason),
}

/// Websocket-backed handle. Writes go through an unbounded channel drained
/// by the connection's own task, so callers never block on the socket.
pub struct WsHandle {
    id: String,
    tx: mpsc::UnboundedSender<Outbound>,
    connected: AtomicBool,
}

impl WsHandle {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            id: prefixed_ulid(prefix::CONNECTION),
            tx,
            connected: AtomicBool::new(true),
        });
        (handle, rx)
    }

    /// Called by the socket task once the peer is gone.
    pub fn mark_closed(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl ConnectionHandle for WsHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(GatewayError::Transport(format!("{} is closed", self.id)));
        }
        self.tx
            .send(Outbound::Dispatch {
                event: event.to_string(),
                payload,
            })
            .map_err(|_| GatewayError::Transport(format!("{} is closed", self.id)))
    }

    fn disconnect(&self, reason: CloseReason) -> Result<()> {
        // Only the first caller queues the close frame.
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.tx
            .send(Outbound::Close(reason))
            .map_err(|_| GatewayError::Transport(format!("{} socket task has exited", self.id)))
    }
}
