//! Repository Implementations
//!
//! Message stores backing the `MessageRepository` trait:
//!
//! - **PgMessageRepository** - PostgreSQL, keyset pagination, read markers
//! - **InMemoryMessageRepository** - process-local store with identical semantics
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crate::infrastructure::repositories::PgMessageRepository;
//! use crate::shared::snowflake::SnowflakeGenerator;
//!
//! let ids = Arc::new(SnowflakeGenerator::new(1, 1));
//! let messages = PgMessageRepository::new(pool.clone(), ids);
//! ```

pub mod memory;
pub mod message_repository;

pub use memory::InMemoryMessageRepository;
pub use message_repository::PgMessageRepository;
