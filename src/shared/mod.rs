//! Shared Utilities
//!
//! Error taxonomy, submission validation and message id generation used
//! across all layers.

pub mod error;
pub mod snowflake;
pub mod validation;
