//! Infrastructure Layer
//!
//! Contains implementations for external collaborators:
//! - Message stores (PostgreSQL, in-memory)
//! - JWT identity provider
//! - Prometheus metrics

pub mod database;
pub mod identity;
pub mod metrics;
pub mod repositories;
