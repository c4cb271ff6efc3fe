//! Cache headers derived from items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cache metadata for one item or a whole response.
///
/// The etag maps to `ETag` / `If-None-Match`, `updated_at` to
/// `Last-Modified` / `If-Modified-Since` in an HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    /// Etag / cache key.
    pub cache_key: String,

    /// When the underlying data last changed, if known.
    pub updated_at: Option<DateTime<Utc>>,

    /// When a cached copy must be discarded, if bounded.
    pub expire_at: Option<DateTime<Utc>>,
}

impl CacheHeader {
    /// Creates a header with only a cache key.
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            updated_at: None,
            expire_at: None,
        }
    }

    /// Sets the last-modified time.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Sets the expiry time.
    pub fn with_expire_at(mut self, expire_at: DateTime<Utc>) -> Self {
        self.expire_at = Some(expire_at);
        self
    }

    /// Combines this header with others into one response-level header.
    ///
    /// The combined key hashes every member key in order, `updated_at` is the
    /// latest member value and `expire_at` the earliest.
    pub fn combine_with<'a, I>(&self, others: I) -> CacheHeader
    where
        I: IntoIterator<Item = &'a CacheHeader>,
    {
        let mut hasher = Sha256::new();
        hasher.update(self.cache_key.as_bytes());
        let mut updated_at = self.updated_at;
        let mut expire_at = self.expire_at;

        for other in others {
            hasher.update(b"\n");
            hasher.update(other.cache_key.as_bytes());
            updated_at = max_opt(updated_at, other.updated_at);
            expire_at = min_opt(expire_at, other.expire_at);
        }

        CacheHeader {
            cache_key: hex(&hasher.finalize()),
            updated_at,
            expire_at,
        }
    }

    /// Renders transport headers (`ETag`, `Last-Modified`, `Expires`).
    pub fn http_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("ETag", format!("\"{}\"", self.cache_key))];
        if let Some(updated_at) = self.updated_at {
            headers.push((
                "Last-Modified",
                updated_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ));
        }
        if let Some(expire_at) = self.expire_at {
            headers.push((
                "Expires",
                expire_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ));
        }
        headers
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
