//! S3-compatible bucket namespace service.
//!
//! Buckets live in SQLite ([`services::metadata_store`]); names are guarded by
//! short-lived leases ([`services::namespace`]); enumeration is cursor-paged
//! ([`services::listing`]); [`services::bucket_service`] ties them together
//! behind the axum routes in [`routes`].

pub mod config;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;
