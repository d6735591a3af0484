mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start an actual TCP server for WebSocket testing.
/// Returns (addr, state). The server runs in the background.
async fn start_ws_server(state: relay_gateway::AppState) -> SocketAddr {
    let app = relay_gateway::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Helper: open a gateway connection with `token` and read READY.
async fn connect(addr: SocketAddr, token: &str) -> (WsStream, serde_json::Value) {
    let url = format!("ws://{addr}/gateway?token={token}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let ready = next_json(&mut ws).await;
    assert_eq!(ready["op"], 0, "READY should be op=0 (DISPATCH)");
    assert_eq!(ready["t"], "READY");
    (ws, ready)
}

/// Helper: read the next text frame as JSON.
async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse json")
}

/// Helper: read the next frame and assert it is a close with `code`.
async fn expect_close(ws: &mut WsStream, code: u16) {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");

    match msg {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(code)
            );
        }
        other => panic!("Expected Close frame, got: {other:?}"),
    }
}

/// Helper: assert the upgrade was refused with an HTTP status.
async fn expect_http_rejection(url: &str, status: u16) {
    match tokio_tungstenite::connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), status),
        Err(other) => panic!("expected HTTP {status}, got error: {other:?}"),
        Ok(_) => panic!("expected HTTP {status}, upgrade succeeded"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gateway_connect_returns_ready_and_registers() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;

    let token = common::mint_token("u1", serde_json::json!({"kind": "agent"}));
    let (_ws, ready) = connect(addr, &token).await;

    assert_eq!(ready["s"], 1);
    let d = &ready["d"];
    assert_eq!(d["identity"], "u1");
    assert!(d["connection_id"].as_str().unwrap().starts_with("conn_"));
    assert_eq!(d["heartbeat_interval"], 1000);

    let registry = state.gateway.registry();
    assert!(registry.exists("u1"));
    let connection_id = d["connection_id"].as_str().unwrap();
    assert_eq!(registry.client_id(connection_id).as_deref(), Some("u1"));
    assert_eq!(registry.client_data("u1").unwrap()["kind"], "agent");
    assert_eq!(state.gateway.pending_handshakes(), 0);
}

#[tokio::test]
async fn gateway_rejects_missing_and_invalid_tokens() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;

    expect_http_rejection(&format!("ws://{addr}/gateway"), 401).await;
    expect_http_rejection(&format!("ws://{addr}/gateway?token=garbage"), 401).await;

    let expired = common::mint_expired_token("u1");
    expect_http_rejection(&format!("ws://{addr}/gateway?token={expired}"), 401).await;

    assert!(!state.gateway.registry().exists("u1"));
    assert_eq!(state.gateway.pending_handshakes(), 0);
}

#[tokio::test]
async fn gateway_heartbeat_returns_ack() {
    let state = common::test_state();
    let addr = start_ws_server(state).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_hb", serde_json::Value::Null)).await;

    let heartbeat = serde_json::json!({ "op": 1, "d": { "seq": 1 } });
    ws.send(tungstenite::Message::Text(heartbeat.to_string().into()))
        .await
        .expect("send heartbeat");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["op"], 6);
    assert_eq!(ack["d"]["ack"], 1);
}

#[tokio::test]
async fn gateway_unknown_opcode_closes_and_unbinds() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_unk", serde_json::Value::Null)).await;

    let unknown = serde_json::json!({ "op": 99, "d": {} });
    ws.send(tungstenite::Message::Text(unknown.to_string().into()))
        .await
        .expect("send unknown");

    expect_close(&mut ws, 4001).await;

    let registry = state.gateway.registry();
    assert!(common::wait_until(|| !registry.exists("u_unk")).await);
}

#[tokio::test]
async fn gateway_delivers_signal_to_bound_connection() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_sig", serde_json::Value::Null)).await;

    state
        .gateway
        .send("u_sig", "OFFER", serde_json::json!({ "sdp": "v=0" }))
        .expect("send signal");

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["op"], 0);
    assert_eq!(msg["t"], "OFFER");
    assert_eq!(msg["s"], 2);
    assert_eq!(msg["d"]["sdp"], "v=0");
}

#[tokio::test]
async fn gateway_reconnect_evicts_previous_connection() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;

    let (mut first, first_ready) =
        connect(addr, &common::mint_token("u_dup", serde_json::Value::Null)).await;
    let (mut second, second_ready) =
        connect(addr, &common::mint_token("u_dup", serde_json::Value::Null)).await;

    // The first socket is told it was replaced.
    expect_close(&mut first, 4005).await;

    let registry = state.gateway.registry();
    let first_id = first_ready["d"]["connection_id"].as_str().unwrap();
    let second_id = second_ready["d"]["connection_id"].as_str().unwrap();
    assert!(registry.client_id(first_id).is_none());
    assert_eq!(registry.client_id(second_id).as_deref(), Some("u_dup"));

    // Let the evicted socket's disconnect run; the new binding must survive.
    drop(first);
    time::sleep(Duration::from_millis(100)).await;
    assert!(registry.exists("u_dup"));

    state
        .gateway
        .send("u_dup", "PING", serde_json::json!({}))
        .expect("send to new connection");
    let msg = next_json(&mut second).await;
    assert_eq!(msg["t"], "PING");
}

#[tokio::test]
async fn gateway_client_close_cleans_up_registry_and_waiting() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_bye", serde_json::Value::Null)).await;

    let registry = state.gateway.registry();
    registry.waiting("u_bye");
    registry.waiting("u_bye");
    assert_eq!(registry.idle_clients(), vec!["u_bye".to_string()]);

    ws.close(None).await.expect("close");

    assert!(common::wait_until(|| !registry.exists("u_bye")).await);
    assert!(registry.idle_clients().is_empty());
    assert!(matches!(
        state.gateway.send("u_bye", "OFFER", serde_json::Value::Null),
        Err(relay_gateway::error::GatewayError::TargetOffline(_))
    ));
}

#[tokio::test]
async fn gateway_kick_closes_with_kick_code() {
    let state = common::test_state();
    let addr = start_ws_server(state.clone()).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_kick", serde_json::Value::Null)).await;

    state.gateway.registry().kick("u_kick").expect("kick");
    expect_close(&mut ws, 4006).await;

    let registry = state.gateway.registry();
    assert!(common::wait_until(|| !registry.exists("u_kick")).await);
}

#[tokio::test]
async fn gateway_missed_heartbeat_closes_connection() {
    let mut config = common::test_config();
    config.heartbeat_timeout = Duration::from_millis(200);
    let state = common::test_state_with(config);
    let addr = start_ws_server(state.clone()).await;
    let (mut ws, _) = connect(addr, &common::mint_token("u_idle", serde_json::Value::Null)).await;

    expect_close(&mut ws, 4009).await;

    let registry = state.gateway.registry();
    assert!(common::wait_until(|| !registry.exists("u_idle")).await);
}

#[tokio::test]
async fn gateway_enforces_connection_limit() {
    let mut config = common::test_config();
    config.max_connections = 1;
    let state = common::test_state_with(config);
    let addr = start_ws_server(state.clone()).await;

    let (ws, _) = connect(addr, &common::mint_token("u_a", serde_json::Value::Null)).await;

    let token = common::mint_token("u_b", serde_json::Value::Null);
    expect_http_rejection(&format!("ws://{addr}/gateway?token={token}"), 503).await;
    assert!(!state.gateway.registry().exists("u_b"));

    // Closing the first socket frees the slot.
    drop(ws);
    let registry = state.gateway.registry();
    assert!(common::wait_until(|| !registry.exists("u_a")).await);
    let connections = state.connections.clone();
    assert!(common::wait_until(|| connections.load(std::sync::atomic::Ordering::SeqCst) == 0).await);
    let (_ws, ready) = connect(addr, &token).await;
    assert_eq!(ready["d"]["identity"], "u_b");
}
