//! src/services/metadata_store.rs
//!
//! MetadataStore: durable bucket records backed by SQLite. Every mutation is
//! committed with `synchronous = FULL` under a WAL journal, so a successful
//! return means the change survives a crash. Every call is bounded by the
//! configured I/O timeout.

use crate::models::{
    bucket::{Bucket, CannedAcl},
    object::ObjectRecord,
};
use chrono::Utc;
use sqlx::{
    QueryBuilder, SqlitePool,
    sqlite::{
        Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
    },
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    NotFound(String),
    #[error("bucket `{0}` already exists")]
    AlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    NotEmpty(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("metadata store call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Connection settings for [`MetadataStore::connect`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub max_connections: u32,
    /// Upper bound for a single store call, pool acquisition, and SQLite
    /// lock waits.
    pub io_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            io_timeout: Duration::from_secs(5),
        }
    }
}

/// Range and filters for an ordered scan over bucket names.
#[derive(Clone, Debug, Default)]
pub struct ScanParams {
    /// Exclusive lower bound on the bucket name.
    pub start_after: Option<String>,
    /// Only names beginning with this prefix.
    pub prefix: Option<String>,
    /// Only buckets owned by this principal.
    pub owner_id: Option<String>,
    pub limit: usize,
}

/// Durable key-value persistence for bucket records.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    io_timeout: Duration,
}

impl MetadataStore {
    /// Wrap an existing pool.
    pub fn new(db: Arc<SqlitePool>, io_timeout: Duration) -> Self {
        Self { db, io_timeout }
    }

    /// Open (or create) the SQLite database at `url` with durable settings.
    pub async fn connect(url: &str, options: &StoreOptions) -> StoreResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .busy_timeout(options.io_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.io_timeout)
            .connect_with(connect_options)
            .await?;

        Ok(Self::new(Arc::new(pool), options.io_timeout))
    }

    /// Apply the embedded schema migrations. Safe to call on every startup.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&*self.db).await?;
        Ok(())
    }

    /// Run `fut`, failing with [`StoreError::Timeout`] once the I/O budget is spent.
    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.io_timeout)),
        }
    }

    /// Insert a new bucket record.
    ///
    /// Returns AlreadyExists if the name is taken; the primary key is the
    /// final arbiter of uniqueness.
    pub async fn put(&self, bucket: &Bucket) -> StoreResult<()> {
        self.bounded(async {
            let result = sqlx::query(
                "INSERT INTO buckets (name, owner_id, region, acl, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&bucket.name)
            .bind(&bucket.owner_id)
            .bind(&bucket.region)
            .bind(bucket.acl)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await;

            match result {
                Ok(_) => {
                    debug!(bucket = %bucket.name, "bucket record committed");
                    Ok(())
                }
                Err(err) if is_unique_violation(&err) => {
                    Err(StoreError::AlreadyExists(bucket.name.clone()))
                }
                Err(err) => Err(StoreError::Sqlx(err)),
            }
        })
        .await
    }

    /// Fetch a bucket record by name.
    pub async fn get(&self, name: &str) -> StoreResult<Bucket> {
        self.bounded(async {
            sqlx::query_as::<_, Bucket>(
                "SELECT name, owner_id, region, acl, created_at FROM buckets WHERE name = ?",
            )
            .bind(name)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
        })
        .await
    }

    /// Replace the canned ACL of an existing bucket.
    pub async fn set_acl(&self, name: &str, acl: CannedAcl) -> StoreResult<()> {
        self.bounded(async {
            let result = sqlx::query("UPDATE buckets SET acl = ? WHERE name = ?")
                .bind(acl)
                .bind(name)
                .execute(&*self.db)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(name.to_string()));
            }
            debug!(bucket = %name, %acl, "bucket acl updated");
            Ok(())
        })
        .await
    }

    /// Delete a bucket record if it owns no objects.
    ///
    /// The emptiness check and the delete are a single statement: the
    /// `objects.bucket_name` foreign key is `ON DELETE RESTRICT`, so a delete
    /// racing an object insert either wins cleanly or fails with NotEmpty.
    pub async fn delete(&self, name: &str) -> StoreResult<()> {
        self.bounded(async {
            let result = sqlx::query("DELETE FROM buckets WHERE name = ?")
                .bind(name)
                .execute(&*self.db)
                .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => {
                    Err(StoreError::NotFound(name.to_string()))
                }
                Ok(_) => {
                    debug!(bucket = %name, "bucket record removed");
                    Ok(())
                }
                Err(err) if is_foreign_key_violation(&err) => {
                    Err(StoreError::NotEmpty(name.to_string()))
                }
                Err(err) => Err(StoreError::Sqlx(err)),
            }
        })
        .await
    }

    /// Ordered scan over bucket names.
    ///
    /// Results are in strict byte-wise ascending order (SQLite BINARY
    /// collation), strictly after `start_after`, at most `limit` rows.
    pub async fn scan(&self, params: &ScanParams) -> StoreResult<Vec<Bucket>> {
        self.bounded(async {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT name, owner_id, region, acl, created_at FROM buckets WHERE 1 = 1",
            );

            if let Some(after) = &params.start_after {
                builder.push(" AND name > ");
                builder.push_bind(after.clone());
            }

            if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
                // The range bound lets SQLite use the primary key; the substr
                // comparison does the exact match without LIKE wildcards.
                builder.push(" AND name >= ");
                builder.push_bind(prefix.to_string());
                builder.push(" AND substr(name, 1, length(");
                builder.push_bind(prefix.to_string());
                builder.push(")) = ");
                builder.push_bind(prefix.to_string());
            }

            if let Some(owner) = &params.owner_id {
                builder.push(" AND owner_id = ");
                builder.push_bind(owner.clone());
            }

            builder.push(" ORDER BY name ASC LIMIT ");
            builder.push_bind(i64::try_from(params.limit).unwrap_or(i64::MAX));

            let rows: Vec<Bucket> = builder.build_query_as().fetch_all(&*self.db).await?;
            Ok(rows)
        })
        .await
    }

    /// Record (or overwrite) an object owned by `bucket`.
    ///
    /// Returns NotFound if the bucket does not exist.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        size_bytes: i64,
    ) -> StoreResult<ObjectRecord> {
        self.bounded(async {
            let result = sqlx::query_as::<_, ObjectRecord>(
                r#"
                INSERT INTO objects (bucket_name, key, size_bytes, last_modified)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(bucket_name, key) DO UPDATE SET
                    size_bytes = excluded.size_bytes,
                    last_modified = excluded.last_modified
                RETURNING bucket_name, key, size_bytes, last_modified
                "#,
            )
            .bind(bucket)
            .bind(key)
            .bind(size_bytes)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await;

            match result {
                Ok(record) => Ok(record),
                Err(err) if is_foreign_key_violation(&err) => {
                    Err(StoreError::NotFound(bucket.to_string()))
                }
                Err(err) => Err(StoreError::Sqlx(err)),
            }
        })
        .await
    }

    /// Remove an object record.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.bounded(async {
            let result = sqlx::query("DELETE FROM objects WHERE bucket_name = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .execute(&*self.db)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Ok(())
        })
        .await
    }

    /// Number of objects currently owned by `bucket`.
    pub async fn object_count(&self, bucket: &str) -> StoreResult<i64> {
        self.bounded(async {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM objects WHERE bucket_name = ?",
            )
            .bind(bucket)
            .fetch_one(&*self.db)
            .await?;
            Ok(count)
        })
        .await
    }

    /// Lightweight liveness query used by the readiness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        self.bounded(async {
            sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&*self.db)
                .await?;
            Ok(())
        })
        .await
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Return true if SQLx error indicates a foreign key constraint violation.
fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}
