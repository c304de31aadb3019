//! Represents a logical bucket, a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A storage bucket in the S3-compatible namespace.
///
/// The name is the primary key: it is globally unique and never changes for
/// the lifetime of the bucket.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Globally unique bucket name (must conform to DNS naming rules).
    pub name: String,

    /// ID of the principal that owns this bucket.
    pub owner_id: String,

    /// Region where the bucket is hosted (e.g. "us-west-2").
    pub region: String,

    /// Canned access policy applied to the bucket.
    pub acl: CannedAcl,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

impl Bucket {
    /// Build a new private bucket record stamped with the current time.
    pub fn new(
        name: impl Into<String>,
        owner_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner_id: owner_id.into(),
            region: region.into(),
            acl: CannedAcl::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }
}

/// Canned bucket ACLs, as sent in the `x-amz-acl` header.
#[derive(
    Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, Default, PartialEq, Eq,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Owner gets `FULL_CONTROL`. No one else has access rights.
    #[default]
    Private,
    /// Owner gets `FULL_CONTROL`. The `AllUsers` group gets `READ`.
    PublicRead,
    /// Owner gets `FULL_CONTROL`. The `AllUsers` group gets `READ` and `WRITE`.
    PublicReadWrite,
    /// Owner gets `FULL_CONTROL`. The `AuthenticatedUsers` group gets `READ`.
    AuthenticatedRead,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown canned ACL `{0}`")]
pub struct UnknownCannedAcl(pub String);

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CannedAcl {
    type Err = UnknownCannedAcl;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            other => Err(UnknownCannedAcl(other.to_string())),
        }
    }
}
