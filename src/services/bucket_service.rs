//! BucketService: create, delete, look up, and list buckets.
//!
//! Per bucket name the lifecycle is `Absent -> Reserving -> Present ->
//! Deleting -> Absent`. `Reserving` and `Deleting` are namespace leases; they
//! are never visible to listings, which read committed store rows only.

use crate::{
    models::{
        bucket::{Bucket, CannedAcl},
        object::ObjectRecord,
    },
    services::{
        listing::{ListError, ListPage, ListRequest, ListingEngine},
        metadata_store::{MetadataStore, StoreError},
        namespace::{Intent, NamespaceError, NamespaceManager},
    },
};
use futures::{Stream, TryStreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const MAX_OBJECT_KEY_LEN: usize = 1024;

const SUPPORTED_REGIONS: [&str; 16] = [
    "local",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-2",
    "ap-northeast-3",
    "me-south-1",
];

/// Why a create or delete lost a race for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCause {
    /// A committed bucket already has the name.
    Exists,
    /// The caller already owns the committed bucket with this name.
    OwnedByCaller,
    /// Another create or delete on the name is still in flight.
    InFlight(Intent),
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("listing cursor is malformed")]
    InvalidCursor,
    #[error("bucket `{name}` conflict: {cause:?}")]
    Conflict { name: String, cause: ConflictCause },
    #[error("bucket `{0}` not found")]
    NotFound(String),
    #[error("object key `{key}` invalid: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{0}` is not empty")]
    NotEmpty(String),
    #[error("metadata store failure: {0}")]
    Io(#[source] StoreError),
}

pub type BucketResult<T> = Result<T, BucketError>;

impl From<StoreError> for BucketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => BucketError::NotFound(name),
            StoreError::AlreadyExists(name) => BucketError::Conflict {
                name,
                cause: ConflictCause::Exists,
            },
            StoreError::NotEmpty(name) => BucketError::NotEmpty(name),
            StoreError::ObjectNotFound { bucket, key } => {
                BucketError::ObjectNotFound { bucket, key }
            }
            other => BucketError::Io(other),
        }
    }
}

impl From<NamespaceError> for BucketError {
    fn from(err: NamespaceError) -> Self {
        match err {
            NamespaceError::InvalidName { name, reason } => {
                BucketError::InvalidName { name, reason }
            }
            NamespaceError::Conflict { name, intent } => BucketError::Conflict {
                name,
                cause: ConflictCause::InFlight(intent),
            },
        }
    }
}

impl From<ListError> for BucketError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::InvalidCursor => BucketError::InvalidCursor,
            ListError::Store(err) => err.into(),
        }
    }
}

/// Request-level orchestration over the store, namespace, and listing engine.
#[derive(Clone, Debug)]
pub struct BucketService {
    /// Durable bucket and object records.
    pub store: MetadataStore,

    /// Name validation and in-flight leases.
    pub namespace: NamespaceManager,

    listing: ListingEngine,
    default_region: String,
    default_owner: String,
}

impl BucketService {
    pub fn new(
        store: MetadataStore,
        namespace: NamespaceManager,
        default_region: impl Into<String>,
        default_owner: impl Into<String>,
    ) -> Self {
        Self {
            listing: ListingEngine::new(store.clone()),
            store,
            namespace,
            default_region: default_region.into(),
            default_owner: default_owner.into(),
        }
    }

    /// Owner used when a request carries no recognizable principal.
    pub fn default_owner(&self) -> &str {
        &self.default_owner
    }

    /// Validate region string against SUPPORTED_REGIONS.
    ///
    /// Case-insensitive comparison. Returns UnsupportedRegion on mismatch.
    fn ensure_region_valid(region: &str) -> BucketResult<()> {
        if SUPPORTED_REGIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(region))
        {
            Ok(())
        } else {
            Err(BucketError::UnsupportedRegion(region.to_string()))
        }
    }

    /// Create a private bucket.
    pub async fn create_bucket(
        &self,
        name: &str,
        owner_id: &str,
        region: Option<&str>,
    ) -> BucketResult<Bucket> {
        self.create_bucket_with_acl(name, owner_id, region, CannedAcl::Private)
            .await
    }

    /// Create a bucket.
    ///
    /// The name is validated before anything else, then leased for the
    /// duration of the store write. The lease is released whether the write
    /// commits or fails.
    pub async fn create_bucket_with_acl(
        &self,
        name: &str,
        owner_id: &str,
        region: Option<&str>,
        acl: CannedAcl,
    ) -> BucketResult<Bucket> {
        NamespaceManager::validate(name)?;
        let region = region
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map_or_else(|| self.default_region.clone(), str::to_ascii_lowercase);
        Self::ensure_region_valid(&region)?;

        let lease = self.namespace.reserve(name, Intent::Create)?;
        let bucket = Bucket::new(name, owner_id, region).with_acl(acl);
        let result = match self.store.put(&bucket).await {
            Err(StoreError::AlreadyExists(_)) => {
                Err(self.existing_conflict(name, owner_id).await)
            }
            other => other.map_err(BucketError::from),
        };
        self.namespace.release(lease);

        match result {
            Ok(()) => {
                info!(
                    bucket = %bucket.name,
                    owner = %bucket.owner_id,
                    region = %bucket.region,
                    acl = %bucket.acl,
                    "bucket created"
                );
                Ok(bucket)
            }
            Err(err) => Err(self.log_failure("create", name, err)),
        }
    }

    /// Tell a name taken by someone else apart from one the caller already owns.
    async fn existing_conflict(&self, name: &str, owner_id: &str) -> BucketError {
        let cause = match self.store.get(name).await {
            Ok(existing) if existing.owner_id == owner_id => ConflictCause::OwnedByCaller,
            _ => ConflictCause::Exists,
        };
        BucketError::Conflict {
            name: name.to_string(),
            cause,
        }
    }

    /// Replace the canned ACL of an existing bucket.
    pub async fn set_bucket_acl(&self, name: &str, acl: CannedAcl) -> BucketResult<()> {
        NamespaceManager::validate(name)?;
        match self.store.set_acl(name, acl).await {
            Ok(()) => {
                info!(bucket = %name, %acl, "bucket acl set");
                Ok(())
            }
            Err(err) => Err(self.log_failure("put-acl", name, err.into())),
        }
    }

    /// Record an object under `bucket`. Only metadata is kept; it makes the
    /// bucket non-empty until the record is deleted.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        size_bytes: i64,
    ) -> BucketResult<ObjectRecord> {
        NamespaceManager::validate(bucket)?;
        ensure_key_valid(key)?;

        match self.store.put_object(bucket, key, size_bytes).await {
            Ok(record) => {
                debug!(bucket = %bucket, key = %key, size_bytes, "object recorded");
                Ok(record)
            }
            Err(err) => Err(self.log_failure("put-object", bucket, err.into())),
        }
    }

    /// Remove an object record.
    ///
    /// A missing bucket reports NotFound, a missing key ObjectNotFound.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> BucketResult<()> {
        NamespaceManager::validate(bucket)?;
        ensure_key_valid(key)?;

        let result = match self.store.delete_object(bucket, key).await {
            // Report a missing bucket ahead of a missing key.
            Err(StoreError::ObjectNotFound { .. }) => match self.store.get(bucket).await {
                Ok(_) => Err(BucketError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                Err(err) => Err(err.into()),
            },
            other => other.map_err(BucketError::from),
        };

        match result {
            Ok(()) => {
                debug!(bucket = %bucket, key = %key, "object record removed");
                Ok(())
            }
            Err(err) => Err(self.log_failure("delete-object", bucket, err)),
        }
    }

    /// Delete a bucket that owns no objects.
    ///
    /// A NotEmpty failure leaves the bucket in place.
    pub async fn delete_bucket(&self, name: &str) -> BucketResult<()> {
        let lease = self.namespace.reserve(name, Intent::Delete)?;
        let result = self.store.delete(name).await;
        self.namespace.release(lease);

        match result {
            Ok(()) => {
                info!(bucket = %name, "bucket deleted");
                Ok(())
            }
            Err(err) => Err(self.log_failure("delete", name, err.into())),
        }
    }

    /// Look up a committed bucket.
    pub async fn get_bucket(&self, name: &str) -> BucketResult<Bucket> {
        NamespaceManager::validate(name)?;
        Ok(self.store.get(name).await?)
    }

    /// One page of committed buckets.
    pub async fn list_buckets(&self, request: &ListRequest) -> BucketResult<ListPage> {
        let page = self.listing.list(request).await?;
        debug!(
            returned = page.buckets.len(),
            truncated = page.is_truncated(),
            "bucket page listed"
        );
        Ok(page)
    }

    /// Every committed bucket matching `request`, fetched page by page.
    pub fn stream_buckets(
        &self,
        request: ListRequest,
    ) -> impl Stream<Item = BucketResult<Bucket>> + Send + 'static {
        self.listing.stream(request).map_err(BucketError::from)
    }

    fn log_failure(&self, op: &str, name: &str, err: BucketError) -> BucketError {
        match &err {
            BucketError::Io(source) => {
                error!(bucket = %name, op, error = %source, "metadata store failure");
            }
            BucketError::Conflict { .. } | BucketError::NotEmpty(_) => {
                warn!(bucket = %name, op, error = %err, "bucket operation rejected");
            }
            _ => debug!(bucket = %name, op, error = %err, "bucket operation failed"),
        }
        err
    }
}

/// Object keys are 1..=1024 bytes without control characters.
fn ensure_key_valid(key: &str) -> BucketResult<()> {
    let invalid = |reason| BucketError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(invalid("must be at most 1024 bytes"));
    }
    if key.chars().any(char::is_control) {
        return Err(invalid("must not contain control characters"));
    }
    Ok(())
}
