//! HTTP Presentation
//!
//! Routes, extractors and handlers for the REST surface.

pub mod extractors;
pub mod handlers;
pub mod routes;
