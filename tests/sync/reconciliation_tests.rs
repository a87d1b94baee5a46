//! Client timelines driven by real gateway output.

use pretty_assertions::assert_eq;

use chat_sync::application::dto::{ClientEvent, MessageResponse};
use chat_sync::client::{MessageTimeline, TimelineEntry};
use chat_sync::domain::{
    ChannelId, MessageDestination, MessageFilter, MessageRepository, MessageScope, MessageType,
    UserId,
};

use crate::common::{started_gateway, TestClient};

fn general() -> MessageDestination {
    MessageDestination::Channel(ChannelId::from("general"))
}

#[tokio::test]
async fn test_optimistic_entry_is_replaced_by_confirmed_message() {
    let (gateway, _store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut phone = TestClient::connect(&gateway, "alice");
    alice.join(&gateway, "general").await;
    phone.join(&gateway, "general").await;
    alice.drain();
    phone.drain();

    let mut laptop_view = MessageTimeline::new(UserId::from("alice"));
    let mut phone_view = MessageTimeline::new(UserId::from("alice"));

    let payload = laptop_view.compose(general(), "hello", MessageType::Text);
    assert_eq!(laptop_view.pending_count(), 1);

    gateway
        .dispatch(alice.connection_id, ClientEvent::SendMessage(payload))
        .await
        .unwrap();

    for event in alice.drain() {
        laptop_view.apply(&event);
    }
    for event in phone.drain() {
        phone_view.apply(&event);
    }

    assert_eq!(laptop_view.pending_count(), 0);
    assert_eq!(laptop_view.len(), 1);
    assert_eq!(phone_view.len(), 1);
    assert_eq!(
        laptop_view.entries()[0].message_id(),
        phone_view.entries()[0].message_id()
    );
}

#[tokio::test]
async fn test_failed_send_retries_with_same_temp_id() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    alice.join(&gateway, "general").await;
    alice.drain();

    let mut timeline = MessageTimeline::new(UserId::from("alice"));
    let payload = timeline.compose(general(), "eventually", MessageType::Text);
    let temp_id = payload.temp_id.clone().unwrap();

    store.set_unavailable(true);
    let _ = gateway
        .dispatch(alice.connection_id, ClientEvent::SendMessage(payload))
        .await;
    for event in alice.drain() {
        timeline.apply(&event);
    }
    assert!(timeline.pending(&temp_id).unwrap().is_failed());

    store.set_unavailable(false);
    let retry = timeline.retry(&temp_id).unwrap();
    assert_eq!(retry.temp_id.as_deref(), Some(temp_id.as_str()));
    gateway
        .dispatch(alice.connection_id, ClientEvent::SendMessage(retry))
        .await
        .unwrap();
    for event in alice.drain() {
        timeline.apply(&event);
    }

    assert_eq!(timeline.len(), 1);
    assert!(matches!(timeline.entries()[0], TimelineEntry::Confirmed(_)));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_history_merge_after_reconnect_skips_known_messages() {
    let (gateway, store) = started_gateway();
    let sender = TestClient::connect(&gateway, "alice");
    let mut reader = TestClient::connect(&gateway, "bob");
    sender.join(&gateway, "general").await;
    reader.join(&gateway, "general").await;
    reader.drain();

    let mut timeline = MessageTimeline::new(UserId::from("bob"));

    gateway
        .dispatch(sender.connection_id, sender.channel_message("general", "seen", "t-1"))
        .await
        .unwrap();
    for event in reader.drain() {
        timeline.apply(&event);
    }

    // Bob drops off and misses one message
    gateway.disconnect(reader.connection_id);
    gateway
        .dispatch(sender.connection_id, sender.channel_message("general", "missed", "t-2"))
        .await
        .unwrap();

    let page = store
        .list_messages(&MessageFilter::new(MessageScope::Channel(ChannelId::from("general"))))
        .await
        .unwrap();
    let added = timeline.merge_history(page.into_iter().map(MessageResponse::from).collect());

    assert_eq!(added, 1);
    let contents: Vec<&str> = timeline.entries().iter().map(|entry| entry.content()).collect();
    assert_eq!(contents, vec!["seen", "missed"]);
}
