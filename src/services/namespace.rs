//! Global bucket-name namespace: naming rules and transient leases.
//!
//! A [`Lease`] is an exclusive claim on one bucket name for the duration of a
//! create or delete. Claims are a compare-and-swap on a concurrent map: a
//! second claim on a held name fails at once with [`NamespaceError::Conflict`]
//! instead of waiting. Dropping the lease releases the name, so every exit
//! path (success, error, panic, cancelled task) gives it back.

use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("bucket `{name}` has an in-flight {intent} operation")]
    Conflict { name: String, intent: Intent },
}

/// What the lease holder is about to do with the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Delete,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Create => f.write_str("create"),
            Intent::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug)]
struct Reservation {
    token: Uuid,
    intent: Intent,
    acquired_at: Instant,
}

/// Hands out exclusive, short-lived claims on bucket names.
#[derive(Clone, Debug)]
pub struct NamespaceManager {
    holders: Arc<DashMap<String, Reservation>>,

    /// A reservation older than this is treated as abandoned and may be
    /// taken over.
    lease_ttl: Duration,
}

impl NamespaceManager {
    pub fn new(lease_ttl: Duration) -> Self {
        Self {
            holders: Arc::new(DashMap::new()),
            lease_ttl,
        }
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    pub fn validate(name: &str) -> Result<(), NamespaceError> {
        let invalid = |reason: &str| NamespaceError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    /// Claim `name` for a create or delete.
    ///
    /// Validates the name first; invalid names never touch the map.
    pub fn reserve(&self, name: &str, intent: Intent) -> Result<Lease, NamespaceError> {
        Self::validate(name)?;

        let token = Uuid::new_v4();
        let reservation = Reservation {
            token,
            intent,
            acquired_at: Instant::now(),
        };

        match self.holders.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(reservation);
            }
            Entry::Occupied(mut held) => {
                let current = held.get();
                if current.acquired_at.elapsed() < self.lease_ttl {
                    warn!(
                        bucket = %name,
                        held = %current.intent,
                        wanted = %intent,
                        "namespace conflict"
                    );
                    return Err(NamespaceError::Conflict {
                        name: name.to_string(),
                        intent: current.intent,
                    });
                }
                warn!(
                    bucket = %name,
                    held = %current.intent,
                    age_ms = current.acquired_at.elapsed().as_millis() as u64,
                    "taking over expired namespace reservation"
                );
                held.insert(reservation);
            }
        }

        debug!(bucket = %name, %intent, "namespace reservation acquired");
        Ok(Lease {
            name: name.to_string(),
            token,
            intent,
            holders: Arc::clone(&self.holders),
        })
    }

    /// Give the name back. Equivalent to dropping the lease.
    pub fn release(&self, lease: Lease) {
        drop(lease);
    }

    /// The intent of the active reservation on `name`, if any.
    pub fn holder(&self, name: &str) -> Option<Intent> {
        self.holders.get(name).map(|r| r.intent)
    }

    /// Number of names currently reserved.
    pub fn in_flight(&self) -> usize {
        self.holders.len()
    }
}

/// An exclusive claim on one bucket name. Released on drop.
#[derive(Debug)]
pub struct Lease {
    name: String,
    token: Uuid,
    intent: Intent,
    holders: Arc<DashMap<String, Reservation>>,
}

impl Lease {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Only remove our own reservation; a taken-over name belongs to
        // someone else now.
        let removed = self
            .holders
            .remove_if(&self.name, |_, r| r.token == self.token)
            .is_some();
        if removed {
            debug!(bucket = %self.name, intent = %self.intent, "namespace reservation released");
        }
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}
