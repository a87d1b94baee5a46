//! Acknowledgment, fan-out and rejection paths through the gateway.

use pretty_assertions::assert_eq;

use chat_sync::application::dto::{ClientEvent, MarkReadPayload, ServerEvent};
use chat_sync::domain::{ChannelId, MessageId, UserId};
use chat_sync::shared::error::{FailureKind, SyncError};

use crate::common::{started_gateway, TestClient};

#[tokio::test]
async fn test_send_acknowledges_sender_and_fans_out_to_subscribers() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut alice_phone = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    alice.join(&gateway, "general").await;
    alice_phone.join(&gateway, "general").await;
    bob.join(&gateway, "general").await;
    alice.drain();
    alice_phone.drain();
    bob.drain();

    gateway
        .dispatch(alice.connection_id, alice.channel_message("general", "hello", "t-1"))
        .await
        .unwrap();

    let acked = alice.drain();
    assert_eq!(acked.len(), 1);
    let ServerEvent::MessageSent(ack) = &acked[0] else {
        panic!("expected message_sent, got {:?}", acked[0]);
    };
    assert_eq!(ack.temp_id.as_deref(), Some("t-1"));
    assert_eq!(ack.message.content, "hello");

    for observer in [&mut bob, &mut alice_phone] {
        let events = observer.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.id, ack.message.id);
                assert_eq!(message.channel_id, Some(ChannelId::from("general")));
            }
            other => panic!("expected new_message, got {:?}", other),
        }
    }

    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_storage_outage_reports_persistence_failure_and_skips_fan_out() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    alice.join(&gateway, "general").await;
    bob.join(&gateway, "general").await;
    alice.drain();
    bob.drain();

    store.set_unavailable(true);
    let result = gateway
        .dispatch(alice.connection_id, alice.channel_message("general", "hello", "t-1"))
        .await;
    assert!(matches!(result, Err(SyncError::Persistence(_))));

    let events = alice.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::MessageFailed(failed) => {
            assert_eq!(failed.temp_id.as_deref(), Some("t-1"));
            assert_eq!(failed.error.kind, FailureKind::Persistence);
        }
        other => panic!("expected message_failed, got {:?}", other),
    }
    assert!(bob.drain().is_empty());

    store.set_unavailable(false);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_blank_content_is_rejected_before_storage() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    alice.join(&gateway, "general").await;
    bob.join(&gateway, "general").await;
    alice.drain();
    bob.drain();

    let result = gateway
        .dispatch(alice.connection_id, alice.channel_message("general", "   ", "t-1"))
        .await;
    assert!(matches!(result, Err(SyncError::Validation(_))));

    match alice.drain().as_slice() {
        [ServerEvent::MessageFailed(failed)] => {
            assert_eq!(failed.error.kind, FailureKind::Validation)
        }
        other => panic!("expected one message_failed, got {:?}", other),
    }
    assert!(bob.drain().is_empty());
    assert!(store.is_empty());
}

fn reply(event: ClientEvent, reply_to: MessageId) -> ClientEvent {
    match event {
        ClientEvent::SendMessage(mut payload) => {
            payload.reply_to = Some(reply_to);
            ClientEvent::SendMessage(payload)
        }
        other => other,
    }
}

#[tokio::test]
async fn test_reply_to_unknown_message_is_rejected_before_storage() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    alice.join(&gateway, "general").await;
    alice.drain();

    let result = gateway
        .dispatch(
            alice.connection_id,
            reply(
                alice.channel_message("general", "re", "t-1"),
                MessageId::new(987_654_321),
            ),
        )
        .await;
    assert!(matches!(result, Err(SyncError::Validation(_))));

    match alice.drain().as_slice() {
        [ServerEvent::MessageFailed(failed)] => {
            assert_eq!(failed.error.kind, FailureKind::Validation)
        }
        other => panic!("expected one message_failed, got {:?}", other),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_reply_within_direct_conversation_is_accepted() {
    let (gateway, store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let bob = TestClient::connect(&gateway, "bob");
    let carol = TestClient::connect(&gateway, "carol");

    gateway
        .dispatch(alice.connection_id, alice.direct_message("bob", "ping", "t-1"))
        .await
        .unwrap();
    let original = match alice.drain().pop() {
        Some(ServerEvent::MessageSent(ack)) => ack.message.id,
        other => panic!("expected message_sent, got {:?}", other),
    };

    gateway
        .dispatch(bob.connection_id, reply(bob.direct_message("alice", "pong", "t-2"), original))
        .await
        .unwrap();

    let outsider = gateway
        .dispatch(
            carol.connection_id,
            reply(carol.direct_message("alice", "me too", "t-3"), original),
        )
        .await;
    assert!(matches!(outsider, Err(SyncError::Validation(_))));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_direct_message_reaches_both_parties_devices() {
    let (gateway, _store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut alice_phone = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    let mut carol = TestClient::connect(&gateway, "carol");
    for client in [&mut alice, &mut alice_phone, &mut bob, &mut carol] {
        client.drain();
    }

    gateway
        .dispatch(alice.connection_id, alice.direct_message("bob", "psst", "t-9"))
        .await
        .unwrap();

    assert!(matches!(alice.drain().as_slice(), [ServerEvent::MessageSent(_)]));
    for observer in [&mut bob, &mut alice_phone] {
        match observer.drain().as_slice() {
            [ServerEvent::NewMessage(message)] => {
                assert_eq!(message.recipient_id, Some(UserId::from("bob")));
                assert_eq!(message.content, "psst");
            }
            other => panic!("expected one new_message, got {:?}", other),
        }
    }
    assert!(carol.drain().is_empty());
}

#[tokio::test]
async fn test_typing_relays_to_channel_peers_only() {
    let (gateway, _store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    let mut carol = TestClient::connect(&gateway, "carol");
    alice.join(&gateway, "general").await;
    bob.join(&gateway, "general").await;
    for client in [&mut alice, &mut bob, &mut carol] {
        client.drain();
    }

    gateway
        .dispatch(alice.connection_id, alice.typing("general"))
        .await
        .unwrap();

    match bob.drain().as_slice() {
        [ServerEvent::UserTyping(typing)] => {
            assert_eq!(typing.user_id, UserId::from("alice"));
            assert_eq!(typing.channel_id, ChannelId::from("general"));
        }
        other => panic!("expected one user_typing, got {:?}", other),
    }
    assert!(alice.drain().is_empty());
    assert!(carol.drain().is_empty());
    assert_eq!(gateway.ephemeral().typing_in(&ChannelId::from("general")).len(), 1);
}

#[tokio::test]
async fn test_mark_read_broadcasts_receipt_to_channel() {
    let (gateway, _store) = started_gateway();
    let mut alice = TestClient::connect(&gateway, "alice");
    let mut bob = TestClient::connect(&gateway, "bob");
    alice.join(&gateway, "general").await;
    bob.join(&gateway, "general").await;

    gateway
        .dispatch(alice.connection_id, alice.channel_message("general", "read me", "t-1"))
        .await
        .unwrap();
    let message_id = match bob.drain().pop() {
        Some(ServerEvent::NewMessage(message)) => message.id,
        other => panic!("expected new_message, got {:?}", other),
    };
    alice.drain();

    gateway
        .dispatch(
            bob.connection_id,
            ClientEvent::MarkRead(MarkReadPayload {
                message_id,
                user_id: UserId::from("bob"),
            }),
        )
        .await
        .unwrap();

    match alice.drain().as_slice() {
        [ServerEvent::MessageRead(receipt)] => {
            assert_eq!(receipt.message_id, message_id);
            assert_eq!(receipt.user_id, UserId::from("bob"));
            assert_eq!(receipt.channel_id, Some(ChannelId::from("general")));
        }
        other => panic!("expected one message_read, got {:?}", other),
    }
    assert!(bob.drain().is_empty());
}
