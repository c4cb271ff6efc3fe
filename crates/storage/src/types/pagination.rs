//! Pagination types for search results.
//!
//! Every backend hands out page keys produced by [`PageCursor::encode`], so a
//! caller only ever sees one opaque token format. The position inside a
//! cursor is backend specific: SQL and the in-memory backend resume from an
//! offset, DynamoDB from the key attributes of the last returned item.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::types::Item;

const CURSOR_VERSION: u8 = 1;

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T = Item> {
    /// The items in this page.
    pub items: Vec<T>,

    /// Opaque key for the next page; `None` means there is no more data.
    pub next_page_key: Option<String>,
}

impl<T> Page<T> {
    /// Creates a new page.
    pub fn new(items: Vec<T>, next_page_key: Option<String>) -> Self {
        Self {
            items,
            next_page_key,
        }
    }

    /// Creates an empty, final page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_key: None,
        }
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there is another page after this one.
    pub fn has_next(&self) -> bool {
        self.next_page_key.is_some()
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_key: self.next_page_key,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where a cursor resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CursorPosition {
    /// Skip this many items of the ordered result.
    Offset {
        /// Number of items already returned.
        offset: u64,
    },
    /// Resume strictly after the item with these key attributes.
    Key {
        /// Key attribute values of the last returned item.
        key: Item,
    },
}

/// An opaque pagination cursor.
///
/// # Encoding
///
/// Cursors are URL-safe base64 JSON containing:
/// - A format version
/// - The resume position
/// - An optional fingerprint of the search that produced it, so a cursor
///   replayed against a different filter or ordering is rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    #[serde(rename = "v")]
    version: u8,

    #[serde(rename = "pos")]
    position: CursorPosition,

    #[serde(rename = "hash", default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

impl PageCursor {
    /// Creates an offset cursor.
    pub fn offset(offset: u64, fingerprint: Option<String>) -> Self {
        Self {
            version: CURSOR_VERSION,
            position: CursorPosition::Offset { offset },
            fingerprint,
        }
    }

    /// Creates a cursor resuming after the item with the given key attributes.
    pub fn after_key(key: Item, fingerprint: Option<String>) -> Self {
        Self {
            version: CURSOR_VERSION,
            position: CursorPosition::Key { key },
            fingerprint,
        }
    }

    /// Returns the resume position.
    pub fn position(&self) -> &CursorPosition {
        &self.position
    }

    /// Returns the offset if this is an offset cursor.
    pub fn offset_value(&self) -> Option<u64> {
        match &self.position {
            CursorPosition::Offset { offset } => Some(*offset),
            CursorPosition::Key { .. } => None,
        }
    }

    /// Returns the key attributes if this is a key cursor.
    pub fn key_value(&self) -> Option<&Item> {
        match &self.position {
            CursorPosition::Key { key } => Some(key),
            CursorPosition::Offset { .. } => None,
        }
    }

    /// Returns the embedded search fingerprint.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(page_key: &str, storage: &str) -> StorageResult<Self> {
        let invalid = || StorageError::InvalidPageKey {
            storage: storage.to_string(),
            page_key: page_key.to_string(),
        };

        let bytes = URL_SAFE_NO_PAD.decode(page_key).map_err(|_| invalid())?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if cursor.version != CURSOR_VERSION {
            return Err(invalid());
        }
        Ok(cursor)
    }

    /// Decodes a cursor and checks that it was issued for the same search.
    ///
    /// A cursor without a fingerprint is accepted for any search.
    pub fn decode_for(
        page_key: &str,
        storage: &str,
        fingerprint: Option<&str>,
    ) -> StorageResult<Self> {
        let cursor = Self::decode(page_key, storage)?;
        match (cursor.fingerprint(), fingerprint) {
            (Some(issued), Some(current)) if issued != current => {
                Err(StorageError::InvalidPageKey {
                    storage: storage.to_string(),
                    page_key: page_key.to_string(),
                })
            }
            _ => Ok(cursor),
        }
    }
}
