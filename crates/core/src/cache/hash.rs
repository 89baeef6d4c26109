//! Deterministic cache file naming.

use sha2::{Digest, Sha256};

/// Extension shared by every cache entry file.
pub const ENTRY_EXTENSION: &str = "entry";

/// Compute the file stem for a cache key (SHA-256, lowercase hex).
pub fn cache_file_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the full file name (`<stem>.entry`) for a cache key.
pub fn cache_file_name(key: &str) -> String {
    format!("{}.{}", cache_file_stem(key), ENTRY_EXTENSION)
}
