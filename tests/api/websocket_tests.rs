//! WebSocket Transport Tests
//!
//! Drive the real upgrade path over a local socket.

use std::time::Duration;

use axum_test::TestWebSocket;
use serde_json::{json, Value};

use chat_sync::domain::ChannelId;

use crate::common::TestApp;

const WAIT: Duration = Duration::from_secs(5);

/// Read frames until one named `event` arrives.
async fn next_event(ws: &mut TestWebSocket, event: &str) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame: Value = ws.receive_json().await;
            if frame["event"] == event {
                return frame;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {} frame within {:?}", event, WAIT))
}

/// Poll until `check` holds; the protocol has no join acknowledgment.
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn open_socket(app: &TestApp, user: &str) -> TestWebSocket {
    let mut ws = app
        .server
        .get_websocket("/ws")
        .authorization_bearer(app.token_for(user))
        .await
        .into_websocket()
        .await;

    ws.send_json(&json!({ "event": "setup_socket", "data": { "userId": user } }))
        .await;
    ws
}

#[tokio::test]
async fn test_upgrade_without_token_is_unauthorized() {
    let app = TestApp::with_http_transport();

    let response = app.server.get_websocket("/ws").expect_failure().await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_token_query_parameter_is_accepted() {
    let app = TestApp::with_http_transport();
    let token = app.token_for("alice");

    let mut ws = app
        .server
        .get_websocket("/ws")
        .add_query_param("token", &token)
        .await
        .into_websocket()
        .await;
    ws.send_json(&json!({ "event": "setup_socket", "data": { "userId": "alice" } }))
        .await;

    let registry = app.state.gateway.registry().clone();
    eventually(|| registry.connection_count() == 1).await;
}

#[tokio::test]
async fn test_message_round_trip_over_sockets() {
    let app = TestApp::with_http_transport();
    let registry = app.state.gateway.registry().clone();
    let router = app.state.gateway.router().clone();
    let general = ChannelId::from("general");

    let mut alice = open_socket(&app, "alice").await;
    eventually(|| registry.connection_count() == 1).await;
    let mut bob = open_socket(&app, "bob").await;
    eventually(|| registry.connection_count() == 2).await;

    for ws in [&mut alice, &mut bob] {
        ws.send_json(&json!({ "event": "join_channel", "data": { "channelId": "general" } }))
            .await;
    }
    eventually(|| router.subscribers_of(&general).len() == 2).await;

    alice
        .send_json(&json!({
            "event": "send_message",
            "data": {
                "senderId": "alice",
                "channelId": "general",
                "content": "hello over the wire",
                "tempId": "tmp-1"
            }
        }))
        .await;

    let ack = next_event(&mut alice, "message_sent").await;
    assert_eq!(ack["data"]["tempId"], "tmp-1");
    let id = ack["data"]["message"]["id"].clone();
    assert!(id.is_string());

    let delivered = next_event(&mut bob, "new_message").await;
    assert_eq!(delivered["data"]["id"], id);
    assert_eq!(delivered["data"]["content"], "hello over the wire");
    assert!(delivered["data"].get("tempId").is_none());
}

#[tokio::test]
async fn test_invalid_frames_keep_connection_open() {
    let app = TestApp::with_http_transport();
    let registry = app.state.gateway.registry().clone();

    let mut alice = open_socket(&app, "alice").await;
    eventually(|| registry.connection_count() == 1).await;

    alice.send_text("definitely not json").await;
    alice
        .send_json(&json!({ "event": "self_destruct", "data": {} }))
        .await;
    alice
        .send_json(&json!({
            "event": "send_message",
            "data": {
                "senderId": "alice",
                "recipientId": "bob",
                "content": "still here",
                "tempId": "tmp-2"
            }
        }))
        .await;

    let ack = next_event(&mut alice, "message_sent").await;
    assert_eq!(ack["data"]["tempId"], "tmp-2");
    assert_eq!(registry.connection_count(), 1);
}
