//! Defines routes for all S3-like bucket operations.
//!
//! ## Structure
//! - **Service-level endpoints**
//!   - `GET    /`: list the caller's buckets (supports prefix, cursor, max-keys)
//!
//! - **Bucket-level endpoints**
//!   - `PUT    /{bucket}`: create bucket (`?acl` replaces its canned ACL)
//!   - `GET    /{bucket}?acl`: read the bucket ACL
//!   - `HEAD   /{bucket}`: check bucket existence
//!   - `DELETE /{bucket}`: delete an empty bucket
//!
//! - **Object records** (metadata only, no payload)
//!   - `PUT    /{bucket}/{*key}`: record an object
//!   - `DELETE /{bucket}/{*key}`: remove an object record
//!
//! Static health routes take precedence over the `{bucket}` capture.

use crate::{
    handlers::{
        bucket_handlers::{
            delete_bucket, delete_object, get_bucket, head_bucket, list_buckets, put_bucket,
            put_object,
        },
        health_handlers::{healthz, readyz},
    },
    services::bucket_service::BucketService,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for all S3-compatible routes.
///
/// The router carries shared state (`BucketService`) to all handlers. Call
/// `.with_state(service)` to obtain a servable `Router`.
pub fn routes() -> Router<BucketService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Service-level routes
        .route("/", get(list_buckets))
        // Bucket-level routes
        .route(
            "/{bucket}",
            put(put_bucket)
                .get(get_bucket)
                .head(head_bucket)
                .delete(delete_bucket),
        )
        // Object-record routes
        .route("/{bucket}/{*key}", put(put_object).delete(delete_object))
}
