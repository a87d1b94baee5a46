//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use tokio::sync::mpsc::UnboundedReceiver;

use chat_sync::application::dto::{
    ChannelPayload, ClientEvent, SendMessagePayload, ServerEvent, TypingPayload,
};
use chat_sync::application::services::{Gateway, GatewayOptions};
use chat_sync::config::*;
use chat_sync::domain::{ChannelId, ConnectionId, IdentityProvider, MessageRepository, UserId};
use chat_sync::infrastructure::identity::JwtIdentityProvider;
use chat_sync::infrastructure::repositories::InMemoryMessageRepository;
use chat_sync::startup::{build_router, AppState};

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// A gateway over a fresh in-memory store, already started
pub fn started_gateway() -> (Arc<Gateway>, Arc<InMemoryMessageRepository>) {
    let store = Arc::new(InMemoryMessageRepository::new());
    let gateway = Arc::new(Gateway::new(store.clone(), GatewayOptions::default()));
    gateway.start();
    (gateway, store)
}

/// One registered connection and its outbound queue
pub struct TestClient {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub events: UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    pub fn connect(gateway: &Gateway, user: &str) -> Self {
        let user_id = UserId::from(user);
        let (connection_id, events) = gateway.connect(user_id.clone()).unwrap();
        Self {
            user_id,
            connection_id,
            events,
        }
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn join(&self, gateway: &Gateway, channel: &str) {
        gateway
            .dispatch(
                self.connection_id,
                ClientEvent::JoinChannel(ChannelPayload {
                    channel_id: ChannelId::from(channel),
                }),
            )
            .await
            .unwrap();
    }

    pub fn channel_message(&self, channel: &str, content: &str, temp_id: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            sender_id: self.user_id.clone(),
            channel_id: Some(ChannelId::from(channel)),
            recipient_id: None,
            content: content.into(),
            temp_id: Some(temp_id.into()),
            message_type: None,
            reply_to: None,
        })
    }

    pub fn direct_message(&self, recipient: &str, content: &str, temp_id: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            sender_id: self.user_id.clone(),
            channel_id: None,
            recipient_id: Some(UserId::from(recipient)),
            content: content.into(),
            temp_id: Some(temp_id.into()),
            message_type: None,
            reply_to: None,
        })
    }

    pub fn typing(&self, channel: &str) -> ClientEvent {
        ClientEvent::Typing(TypingPayload {
            channel_id: ChannelId::from(channel),
            user_id: self.user_id.clone(),
            user_name: None,
        })
    }
}

/// Settings for the HTTP suites: in-memory store, no CORS origins
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        storage: StorageSettings {
            backend: StorageBackend::Memory,
        },
        database: DatabaseSettings {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 1,
            run_migrations: false,
        },
        jwt: JwtSettings {
            secret: TEST_SECRET.into(),
            issuer: None,
        },
        snowflake: SnowflakeSettings {
            machine_id: 1,
            node_id: 1,
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
            max_frame_size: 16384,
            setup_timeout_secs: 5,
        },
        messaging: MessagingSettings {
            max_content_length: 4000,
        },
        presence: PresenceSettings {
            offline_grace_ms: 0,
        },
        telemetry: TelemetrySettings { json: false },
        environment: "test".into(),
    }
}

/// Test application over the full router
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<InMemoryMessageRepository>,
    pub tokens: JwtIdentityProvider,
}

impl TestApp {
    /// Router served through the mock transport
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Router served over a real socket, needed for WebSocket upgrades
    pub fn with_http_transport() -> Self {
        Self::build(true)
    }

    fn build(http_transport: bool) -> Self {
        let settings = test_settings();
        let store = Arc::new(InMemoryMessageRepository::new());
        let tokens = JwtIdentityProvider::new(&settings.jwt);
        let identity: Arc<dyn IdentityProvider> = Arc::new(JwtIdentityProvider::new(&settings.jwt));
        let messages: Arc<dyn MessageRepository> = store.clone();

        let state = AppState::new(settings, messages, identity);
        state.gateway.start();

        let router = build_router(state.clone());
        let server = if http_transport {
            TestServer::builder().http_transport().build(router).unwrap()
        } else {
            TestServer::new(router).unwrap()
        };

        Self {
            server,
            state,
            store,
            tokens,
        }
    }

    pub fn token_for(&self, user: &str) -> String {
        self.tokens
            .issue(&UserId::from(user), chrono::Duration::hours(1))
            .unwrap()
    }
}
