//! Core data models for the bucket namespace service.
//!
//! These entities map cleanly to database tables via `sqlx::FromRow` and
//! serialize naturally as JSON via `serde`.

pub mod bucket;
pub mod object;
