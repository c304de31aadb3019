//! Represents an object record owned by a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for a single object within a bucket.
///
/// Payload bytes are not tracked here; the record only ties a key to its
/// parent bucket so the bucket cannot be removed while it still owns data.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Name of the parent bucket.
    pub bucket_name: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,
}
