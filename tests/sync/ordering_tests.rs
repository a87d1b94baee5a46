//! Per-channel ordering under concurrent submitters.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use chat_sync::application::dto::ServerEvent;
use chat_sync::domain::MessageId;

use crate::common::{started_gateway, TestClient};

const SENDERS: usize = 4;
const MESSAGES_PER_SENDER: usize = 25;

fn delivered_ids(client: &mut TestClient) -> Vec<MessageId> {
    client
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::NewMessage(message) => Some(message.id),
            _ => None,
        })
        .collect()
}

fn is_strictly_increasing(ids: &[MessageId]) -> bool {
    ids.windows(2).all(|pair| pair[0] < pair[1])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_subscribers_observe_the_same_channel_order() {
    let (gateway, store) = started_gateway();

    let mut observers = Vec::new();
    for name in ["observer-a", "observer-b", "observer-c"] {
        let observer = TestClient::connect(&gateway, name);
        observer.join(&gateway, "busy").await;
        observers.push(observer);
    }

    let mut senders = Vec::new();
    for i in 0..SENDERS {
        let sender = TestClient::connect(&gateway, &format!("sender-{}", i));
        sender.join(&gateway, "busy").await;
        senders.push(sender);
    }
    for client in observers.iter_mut().chain(senders.iter_mut()) {
        client.drain();
    }

    let mut tasks = Vec::new();
    for (i, sender) in senders.iter().enumerate() {
        let gateway = Arc::clone(&gateway);
        let connection_id = sender.connection_id;
        let events: Vec<_> = (0..MESSAGES_PER_SENDER)
            .map(|n| sender.channel_message("busy", &format!("{}-{}", i, n), &format!("t-{}-{}", i, n)))
            .collect();
        tasks.push(tokio::spawn(async move {
            for event in events {
                gateway.dispatch(connection_id, event).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = SENDERS * MESSAGES_PER_SENDER;
    assert_eq!(store.len(), total);

    let reference = delivered_ids(&mut observers[0]);
    assert_eq!(reference.len(), total);
    assert!(is_strictly_increasing(&reference));
    for observer in observers.iter_mut().skip(1) {
        assert_eq!(delivered_ids(observer), reference);
    }
}

#[tokio::test]
async fn test_one_sender_sees_its_messages_in_submission_order() {
    let (gateway, _store) = started_gateway();
    let sender = TestClient::connect(&gateway, "alice");
    let mut reader = TestClient::connect(&gateway, "bob");
    sender.join(&gateway, "general").await;
    reader.join(&gateway, "general").await;
    reader.drain();

    for n in 0..10 {
        gateway
            .dispatch(
                sender.connection_id,
                sender.channel_message("general", &format!("m{}", n), &format!("t{}", n)),
            )
            .await
            .unwrap();
    }

    let contents: Vec<String> = reader
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::NewMessage(message) => Some(message.content),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..10).map(|n| format!("m{}", n)).collect();
    assert_eq!(contents, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_channel_delivery_follows_persistence_order() {
    for round in 0..20 {
        let (gateway, store) = started_gateway();
        let mut observer = TestClient::connect(&gateway, "observer");
        observer.join(&gateway, "busy").await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let sender = TestClient::connect(&gateway, &format!("sender-{}", i));
            sender.join(&gateway, "busy").await;
            let gateway = Arc::clone(&gateway);
            tasks.push(tokio::spawn(async move {
                for n in 0..50 {
                    let event = sender.channel_message("busy", "m", &format!("t-{}-{}", i, n));
                    gateway.dispatch(sender.connection_id, event).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let ids = delivered_ids(&mut observer);
        assert_eq!(ids.len(), 400, "round {}", round);
        assert_eq!(store.len(), 400, "round {}", round);
        assert!(is_strictly_increasing(&ids), "round {} delivered out of order", round);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_direct_delivery_follows_persistence_order() {
    let (gateway, _store) = started_gateway();
    let mut watcher = TestClient::connect(&gateway, "alice");

    let mut tasks = Vec::new();
    for (i, (user, recipient)) in [("alice", "bob"), ("bob", "alice"), ("alice", "bob"), ("bob", "alice")]
        .into_iter()
        .enumerate()
    {
        let sender = TestClient::connect(&gateway, user);
        let gateway = Arc::clone(&gateway);
        tasks.push(tokio::spawn(async move {
            for n in 0..50 {
                let event = sender.direct_message(recipient, "m", &format!("d-{}-{}", i, n));
                gateway.dispatch(sender.connection_id, event).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let ids = delivered_ids(&mut watcher);
    assert_eq!(ids.len(), 200);
    assert!(is_strictly_increasing(&ids));
}
