//! WebSocket upgrade handler and per-connection event loop.
//!
//! This is the socket server the [`Gateway`](super::Gateway) callbacks hang
//! off: the upgrade handler runs the authenticate phase, the upgraded task
//! runs connect, its event loop, and finally disconnect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::config::Config;
use crate::AppState;

use super::events::{ClientMessage, EventName, GatewayMessage, HeartbeatPayload, OP_HEARTBEAT};
use super::handle::{CloseReason, Handle, Outbound, WsHandle};

/// Close codes (4000-range for application-level).
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_SESSION_REPLACED: u16 = 4005;
const CLOSE_KICKED: u16 = 4006;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    /// Bearer credential for the connecting client.
    #[serde(default)]
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

/// Counts live sockets against `max_connections`; released on drop.
struct ConnectionPermit {
    active: Arc<AtomicUsize>,
}

impl ConnectionPermit {
    /// `max == 0` means unlimited.
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            active: active.clone(),
        })
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(permit) = ConnectionPermit::acquire(&state.connections, state.config.max_connections)
    else {
        tracing::warn!(max = state.config.max_connections, "connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    // Rejections carry no body; the client just sees a failed upgrade.
    let correlation = match state.gateway.authenticate(query.token.as_deref()).await {
        Ok(token) => token,
        Err(err) => {
            tracing::debug!(?err, "gateway upgrade denied");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, state, correlation).await;
        drop(permit);
    })
}

async fn handle_connection(socket: WebSocket, state: AppState, correlation: String) {
    let (ws_handle, outbound_rx) = WsHandle::new();
    let handle: Handle = ws_handle.clone();
    let (mut ws_tx, ws_rx) = socket.split();

    match state.gateway.on_connect(&correlation, handle.clone()).await {
        Ok(identity) => {
            let ready = GatewayMessage::dispatch(
                EventName::READY,
                1,
                serde_json::json!({
                    "identity": identity,
                    "connection_id": handle.id(),
                    "heartbeat_interval": state.config.heartbeat_interval.as_millis() as u64,
                }),
            );
            if ws_tx.send(Message::Text(ready.to_json().into())).await.is_ok() {
                run_session(&identity, handle.id(), &state.config, ws_tx, ws_rx, outbound_rx).await;
            }
        }
        Err(err) => {
            tracing::debug!(?err, handle_id = %handle.id(), "connection refused");
            let (code, reason) = close_frame_for(CloseReason::Rejected);
            let _ = send_close(&mut ws_tx, code, reason).await;
        }
    }

    ws_handle.mark_closed();
    state.gateway.on_disconnect(&handle).await;
}

/// Main session event loop: read client messages, write queued signals,
/// enforce heartbeat.
async fn run_session(
    identity: &str,
    handle_id: &str,
    config: &Config,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut heartbeat_timer = time::interval(config.heartbeat_timeout);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;
    // READY was seq 1.
    let mut seq: u64 = 1;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = GatewayMessage::heartbeat_ack(payload.seq);
                                if ws_tx.send(Message::Text(ack.to_json().into())).await.is_err() {
                                    break;
                                }
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %identity, %handle_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Signal queued by the registry, or a close request.
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Dispatch { event, payload }) => {
                        seq += 1;
                        let msg = GatewayMessage::dispatch(&event, seq, payload);
                        if ws_tx.send(Message::Text(msg.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        tracing::debug!(%identity, %handle_id, ?reason, "closing connection");
                        let (code, text) = close_frame_for(reason);
                        let _ = send_close(&mut ws_tx, code, text).await;
                        break;
                    }
                    None => break,
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(%identity, %handle_id, "heartbeat timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

fn close_frame_for(reason: CloseReason) -> (u16, &'static str) {
    match reason {
        CloseReason::Closed => (CLOSE_NORMAL, "Closed"),
        CloseReason::Replaced => (CLOSE_SESSION_REPLACED, "Session replaced"),
        CloseReason::Rejected => (CLOSE_NOT_AUTHENTICATED, "Handshake rejected"),
        CloseReason::Kicked => (CLOSE_KICKED, "Disconnected by server"),
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
