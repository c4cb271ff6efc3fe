//! Cache header derivation.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::{Clock, parse_timestamp};
use crate::types::{CacheHeader, Item, hex};

/// How a storage derives [`CacheHeader`]s for its items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheControl {
    /// Etag is a SHA-256 of the canonical item JSON.
    #[default]
    SecureHash,
    /// Etag and `Last-Modified` come from an update timestamp attribute.
    Timestamp {
        /// Attribute holding the last update time.
        updated_at_attr: String,
    },
    /// Adds an expiry `ttl_ms` after the header is produced.
    Ttl {
        /// Time to live in milliseconds.
        ttl_ms: u64,
        /// Control producing the rest of the header.
        inner: Box<CacheControl>,
    },
}

impl CacheControl {
    /// Builds the cache header for one item.
    pub fn header(&self, key: &str, item: &Item, clock: &dyn Clock) -> CacheHeader {
        match self {
            CacheControl::SecureHash => {
                let json = serde_json::to_vec(item).unwrap_or_default();
                CacheHeader::new(hex(&Sha256::digest(&json)))
            }
            CacheControl::Timestamp { updated_at_attr } => {
                let raw = item
                    .get(updated_at_attr)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let mut hasher = Sha256::new();
                hasher.update(key.as_bytes());
                hasher.update(b"@");
                hasher.update(raw.as_bytes());
                let header = CacheHeader::new(hex(&hasher.finalize()));
                match parse_timestamp(raw) {
                    Some(updated_at) => header.with_updated_at(updated_at),
                    None => header,
                }
            }
            CacheControl::Ttl { ttl_ms, inner } => {
                let ttl = Duration::milliseconds(i64::try_from(*ttl_ms).unwrap_or(i64::MAX));
                inner
                    .header(key, item, clock)
                    .with_expire_at(clock.now() + ttl)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_secure_hash_changes_with_content() {
        let a = json!({"id": "a", "v": 1}).as_object().cloned().unwrap();
        let b = json!({"id": "a", "v": 2}).as_object().cloned().unwrap();
        let control = CacheControl::SecureHash;
        assert_ne!(
            control.header("a", &a, &clock()).cache_key,
            control.header("a", &b, &clock()).cache_key
        );
    }

    #[test]
    fn test_timestamp_sets_last_modified() {
        let item = json!({"id": "a", "updated_at": "2024-02-01T00:00:00.000000Z"})
            .as_object()
            .cloned()
            .unwrap();
        let control = CacheControl::Timestamp {
            updated_at_attr: "updated_at".to_string(),
        };
        let header = control.header("a", &item, &clock());
        assert_eq!(
            header.updated_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_ttl_sets_expiry() {
        let clock = clock();
        let control = CacheControl::Ttl {
            ttl_ms: 30_000,
            inner: Box::new(CacheControl::SecureHash),
        };
        let header = control.header("a", &Item::new(), &clock);
        assert_eq!(header.expire_at, Some(clock.now() + Duration::seconds(30)));
    }
}
