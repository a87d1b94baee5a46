//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::application::services::{Gateway, GatewayOptions};
use crate::config::{Settings, StorageBackend};
use crate::domain::{IdentityProvider, MessageRepository};
use crate::infrastructure::database;
use crate::infrastructure::identity::JwtIdentityProvider;
use crate::infrastructure::repositories::{InMemoryMessageRepository, PgMessageRepository};
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::middleware::{create_cors_layer, create_trace_layer};
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub messages: Arc<dyn MessageRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire a gateway over `messages` with options taken from `settings`.
    /// The gateway is returned stopped.
    pub fn new(
        settings: Settings,
        messages: Arc<dyn MessageRepository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let options = GatewayOptions {
            max_content_length: settings.messaging.max_content_length,
            offline_grace: settings.presence.offline_grace(),
        };
        let gateway = Arc::new(Gateway::new(messages.clone(), options));

        Self {
            gateway,
            messages,
            identity,
            settings: Arc::new(settings),
        }
    }
}

/// Build the full router with middleware applied
pub fn build_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.settings.cors);
    routes::create_router(state)
        .layer(create_trace_layer())
        .layer(cors)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    gateway: Arc<Gateway>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        let ids = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id,
            settings.snowflake.node_id,
        ));

        let messages: Arc<dyn MessageRepository> = match settings.storage.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory message store");
                Arc::new(InMemoryMessageRepository::with_generator(ids))
            }
            StorageBackend::Postgres => {
                let pool = database::create_pool(&settings.database).await?;
                tracing::info!("Database connection pool created");

                if settings.database.run_migrations {
                    database::run_migrations(&pool).await?;
                    tracing::info!("Database migrations applied");
                }

                Arc::new(PgMessageRepository::new(pool, ids))
            }
        };

        let identity: Arc<dyn IdentityProvider> =
            Arc::new(JwtIdentityProvider::new(&settings.jwt));

        let addr = settings.server.socket_addr()?;
        let state = AppState::new(settings, messages, identity);
        state.gateway.start();
        let gateway = state.gateway.clone();

        let router = build_router(state);

        // Bind to address
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            gateway,
        })
    }

    /// Run the server until Ctrl-C, then stop the gateway
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.gateway.stop();
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
