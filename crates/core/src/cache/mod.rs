//! Size-bounded response cache.
//!
//! This module provides a key/value cache for server responses with:
//!
//! - One JSON file per entry, named by the SHA-256 of its key
//! - Optional expiration, checked lazily on read and swept by `prune`
//! - A total size budget; writes that would exceed it are rejected, not evicted
//! - A free disk space guard
//!
//! The size counter is reconciled once at open by scanning the directory.
//! Changes made to the directory by other processes afterwards are not seen.

pub mod disk;
pub mod entry;
pub mod hash;

pub use crate::Error;

pub use disk::{DiskCache, DiskSpace};
pub use entry::CacheEntry;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Key/value store for cached server responses.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// Returns `Ok(false)` when the write would push the cache past its
    /// capacity; nothing is changed in that case and the caller may `prune`
    /// and retry.
    fn set(&self, key: &str, value: &Value, expires_at: Option<DateTime<Utc>>) -> Result<bool, Error>;

    /// Fetch the value for `key`. Missing and expired entries are both `None`.
    fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Delete the entry for `key`. Deleting a missing key is a no-op.
    fn remove(&self, key: &str) -> Result<(), Error>;

    /// Delete every entry.
    fn clear(&self) -> Result<(), Error>;

    /// Delete expired entries, returning how many were removed.
    fn prune(&self) -> Result<u64, Error>;
}
