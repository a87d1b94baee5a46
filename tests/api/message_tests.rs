//! Message History API Tests

use axum::http::StatusCode;
use serde_json::Value;

use chat_sync::domain::{ChannelId, MessageRepository, MessageType, NewMessage, MessageDestination, UserId};

use crate::common::TestApp;

async fn seed(app: &TestApp, sender: &str, destination: MessageDestination, content: &str) {
    app.store
        .insert_message(NewMessage {
            sender_id: UserId::from(sender),
            destination,
            content: content.into(),
            message_type: MessageType::Text,
            reply_to: None,
        })
        .await
        .unwrap();
}

fn contents(body: &Value) -> Vec<String> {
    body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|message| message["content"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn test_history_requires_bearer_token() {
    let app = TestApp::new();

    let response = app
        .server
        .get("/api/v1/channels/general/messages")
        .expect_failure()
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_history_rejects_invalid_token() {
    let app = TestApp::new();

    let response = app
        .server
        .get("/api/v1/channels/general/messages")
        .authorization_bearer("not-a-jwt")
        .expect_failure()
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_channel_history_is_newest_first_and_paginated() {
    let app = TestApp::new();
    for content in ["one", "two", "three"] {
        seed(&app, "alice", MessageDestination::Channel(ChannelId::from("general")), content).await;
    }
    seed(&app, "alice", MessageDestination::Channel(ChannelId::from("random")), "elsewhere").await;
    let token = app.token_for("bob");

    let first: Value = app
        .server
        .get("/api/v1/channels/general/messages")
        .add_query_param("limit", 2)
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(contents(&first), vec!["three", "two"]);

    let cursor = first["messages"][1]["id"].as_str().unwrap().to_owned();
    let second: Value = app
        .server
        .get("/api/v1/channels/general/messages")
        .add_query_param("before", &cursor)
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(contents(&second), vec!["one"]);
}

#[tokio::test]
async fn test_direct_history_covers_both_directions_only() {
    let app = TestApp::new();
    seed(&app, "alice", MessageDestination::Direct(UserId::from("bob")), "hi bob").await;
    seed(&app, "bob", MessageDestination::Direct(UserId::from("alice")), "hi alice").await;
    seed(&app, "carol", MessageDestination::Direct(UserId::from("alice")), "hi from carol").await;

    let body: Value = app
        .server
        .get("/api/v1/dm/bob/messages")
        .authorization_bearer(app.token_for("alice"))
        .await
        .json();

    assert_eq!(contents(&body), vec!["hi alice", "hi bob"]);
}

#[tokio::test]
async fn test_history_reports_storage_outage() {
    let app = TestApp::new();
    app.store.set_unavailable(true);

    let response = app
        .server
        .get("/api/v1/channels/general/messages")
        .authorization_bearer(app.token_for("bob"))
        .expect_failure()
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
