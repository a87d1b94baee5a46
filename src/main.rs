//! # Chat Sync Server
//!
//! Real-time message synchronization server.
//!
//! This is the application entry point that initializes:
//! - Configuration loading
//! - Tracing/logging subsystem
//! - Message store (in-memory or PostgreSQL)
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use chat_sync::config::Settings;
use chat_sync::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment and config files
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    chat_sync::telemetry::init_tracing(settings.telemetry.json);

    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        storage = ?settings.storage.backend,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
