//! HTTP handlers for bucket and health endpoints.

pub mod bucket_handlers;
pub mod health_handlers;
