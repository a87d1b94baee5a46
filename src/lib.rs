//! # Chat Sync Library
//!
//! Real-time message synchronization core for a chat system:
//! - Connection registry with presence transitions
//! - Channel membership routing with ordered fan-out
//! - Persist-then-acknowledge message ingestion
//! - Ephemeral typing, read receipt and status events
//! - Client-side timeline reconciliation
//!
//! ## Architecture
//!
//! - **Domain Layer**: Entities, value objects and collaborator traits
//! - **Application Layer**: Protocol events and the sync services
//! - **Infrastructure Layer**: Message stores, JWT identity, metrics
//! - **Presentation Layer**: HTTP handlers and the WebSocket transport
//! - **Client**: Optimistic timeline and typing expiry
//!
//! ## Module Structure
//!
//! ```text
//! chat_sync/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, and traits
//! +-- application/    Sync services and protocol DTOs
//! +-- client/         Reconciliation layer
//! +-- infrastructure/ Storage, identity, and metrics
//! +-- presentation/   HTTP routes and WebSocket handler
//! +-- shared/         Errors, validation, snowflake IDs
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Sync services
pub mod application;

// Client reconciliation layer
pub mod client;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
