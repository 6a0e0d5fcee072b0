//! Response cache for conditional requests.
//!
//! Holds the last successful body for each request target together with the
//! validators the server sent (`ETag`, `Last-Modified`). Entries carry no TTL:
//! freshness is decided by the server answering `304 Not Modified`. The
//! cache is bounded by capacity and evicts with `moka`'s TinyLFU policy.

use bytes::Bytes;
use moka::future::Cache;
use url::form_urlencoded;

/// A cached response body and its validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Entity tag from the `ETag` header.
    pub etag: Option<String>,
    /// Timestamp from the `Last-Modified` header.
    pub last_modified: Option<String>,
    /// `Content-Type` of the cached body.
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl CacheEntry {
    /// Returns true if the entry can be revalidated with a conditional request.
    #[must_use]
    pub const fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Shared response cache keyed by request target.
///
/// Cheap to clone; every clone shares the same entries.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, CacheEntry>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` responses.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Look up the entry for a request target.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).await
    }

    /// Store an entry, replacing whatever was cached for the target.
    pub async fn insert(&self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry).await;
    }

    /// Drop a single target.
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

/// Build the cache key for a request target: the path plus its encoded query.
///
/// Query parameters keep their original order, so `?a=1&b=2` and `?b=2&a=1`
/// are distinct targets, matching how the server sees them.
#[must_use]
pub fn cache_key(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish();
    format!("{path}?{encoded}")
}
