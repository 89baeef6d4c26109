//! On-disk cache entry format: `{"e": <unix seconds or null>, "v": <value>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached value with its optional expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Expiration as unix seconds, rounded up; `None` never expires.
    #[serde(rename = "e")]
    pub expires_at: Option<i64>,

    #[serde(rename = "v")]
    pub value: Value,
}

impl CacheEntry {
    pub fn new(value: Value, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { expires_at: expires_at.map(ceil_seconds), value }
    }

    /// An entry is expired once the current time has reached its expiration.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now.timestamp())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiration as a timestamp, if any.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expires_at.and_then(|e| DateTime::from_timestamp(e, 0))
    }
}

/// Whole seconds at or after `t`, so an entry never expires early.
fn ceil_seconds(t: DateTime<Utc>) -> i64 {
    if t.timestamp_subsec_nanos() > 0 { t.timestamp() + 1 } else { t.timestamp() }
}
