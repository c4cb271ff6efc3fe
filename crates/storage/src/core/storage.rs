//! The storage contract.
//!
//! This module defines the [`Storage`] trait that every backend and wrapper
//! implements, together with the helpers that provide its default behaviour.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Edit, EditResult, Item, Page, PageCursor};

/// A lazy, unbounded sequence of search results.
///
/// Results are pulled on demand; dropping the iterator stops the search.
pub type ItemIter<'a> = Box<dyn Iterator<Item = StorageResult<Item>> + 'a>;

/// Uniform operations over a keyed collection of items.
///
/// Every backend produces the same results for the same filter and comparator
/// against the same logical dataset; backends only differ in where filtering
/// and sorting are executed.
///
/// All calls are synchronous and blocking. Implementations must be shareable
/// across threads, but concurrent mutation of one key is arbitrated by the
/// backend, never by wrappers.
///
/// # Example
///
/// ```
/// use persisty_storage::backends::memory::MemStorage;
/// use persisty_storage::core::Storage;
/// use persisty_storage::filter::{SearchFilter, attr};
/// use persisty_storage::meta::{Attr, StorageMeta};
/// use serde_json::json;
///
/// let meta = StorageMeta::builder("books")
///     .attr(Attr::string("id"))
///     .attr(Attr::int("year"))
///     .build()
///     .unwrap();
/// let storage = MemStorage::new(meta);
///
/// let book = json!({"id": "b", "year": 1970}).as_object().cloned().unwrap();
/// let key = storage.create(book).unwrap();
/// assert_eq!(key, "b");
///
/// let found: Vec<_> = storage
///     .search(&SearchFilter::new(attr("year").gte(1970)))
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub trait Storage: Send + Sync {
    /// Returns the metadata describing this storage.
    fn meta(&self) -> &StorageMeta;

    /// Creates a new item.
    ///
    /// A key is assigned first if the key strategy generates one.
    ///
    /// # Returns
    ///
    /// The key of the new item.
    ///
    /// # Errors
    ///
    /// * `StorageError::DuplicateKey` - If an item with the same key exists
    /// * `StorageError::Validation` - If the item has no usable key
    fn create(&self, item: Item) -> StorageResult<String>;

    /// Reads an item by key, returning `None` if it does not exist.
    fn read(&self, key: &str) -> StorageResult<Option<Item>>;

    /// Reads several items, preserving the order of `keys`.
    ///
    /// # Arguments
    ///
    /// * `keys` - The keys to read
    /// * `error_on_missing` - Fail on the first absent key instead of
    ///   yielding `None` for it
    ///
    /// # Errors
    ///
    /// * `StorageError::MissingItem` - If a key is absent and
    ///   `error_on_missing` is set
    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        let items = keys
            .iter()
            .map(|key| self.read(key))
            .collect::<StorageResult<Vec<_>>>()?;
        require_all(self.meta(), keys, items, error_on_missing)
    }

    /// Replaces an existing item in full.
    ///
    /// # Errors
    ///
    /// * `StorageError::MissingItem` - If no item has the item's key
    fn update(&self, item: Item) -> StorageResult<Item>;

    /// Deletes an item, returning true if something was deleted.
    fn destroy(&self, key: &str) -> StorageResult<bool>;

    /// Streams every matching item in order.
    ///
    /// The default implementation follows `paged_search` page keys with the
    /// storage's batch size until the results are exhausted.
    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        Ok(Box::new(PageFollower::new(self, search.clone())))
    }

    /// Counts the matching items.
    fn count(&self, filter: &Filter) -> StorageResult<u64>;

    /// Returns one bounded page of matching items.
    ///
    /// # Arguments
    ///
    /// * `search` - Filter and ordering; must be identical on every page
    /// * `page_key` - The `next_page_key` of the previous page, if any
    /// * `limit` - Maximum page size, defaulting to the batch size
    ///
    /// # Errors
    ///
    /// * `StorageError::InvalidLimit` - If `limit` is 0 or above the batch size
    /// * `StorageError::InvalidPageKey` - If `page_key` was not issued for
    ///   this search
    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page>;

    /// Applies edits in order, returning one result per edit.
    ///
    /// Not atomic. The default stops at the first failure and reports the
    /// remaining edits as skipped.
    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        Ok(apply_edits(self, edits))
    }
}

/// Applies edits one at a time through `create`, `update` and `destroy`.
pub fn apply_edits<S: Storage + ?Sized>(storage: &S, edits: Vec<Edit>) -> Vec<EditResult> {
    let mut results = Vec::with_capacity(edits.len());
    let mut failed = false;
    for edit in edits {
        if failed {
            results.push(EditResult::Skipped);
            continue;
        }
        let outcome = match edit {
            Edit::Create(item) => storage.create(item).map(|key| EditResult::Created { key }),
            Edit::Update(item) => storage
                .meta()
                .key_of(&item)
                .and_then(|key| storage.update(item).map(|_| EditResult::Updated { key })),
            Edit::Destroy(key) => storage
                .destroy(&key)
                .map(|existed| EditResult::Destroyed { key, existed }),
        };
        results.push(outcome.unwrap_or_else(|error| {
            failed = true;
            EditResult::Failed { error }
        }));
    }
    results
}

/// Enforces `error_on_missing` over the results of a batch read.
pub fn require_all(
    meta: &StorageMeta,
    keys: &[String],
    items: Vec<Option<Item>>,
    error_on_missing: bool,
) -> StorageResult<Vec<Option<Item>>> {
    if error_on_missing {
        if let Some((key, _)) = keys.iter().zip(&items).find(|(_, item)| item.is_none()) {
            return Err(StorageError::missing(meta.name(), key.as_str()));
        }
    }
    Ok(items)
}

/// Decodes the offset of a page key issued for the search with `fingerprint`.
///
/// A missing page key starts at offset 0.
pub fn decode_offset(
    meta: &StorageMeta,
    page_key: Option<&str>,
    fingerprint: &str,
) -> StorageResult<usize> {
    let Some(page_key) = page_key else {
        return Ok(0);
    };
    let cursor = PageCursor::decode_for(page_key, meta.name(), Some(fingerprint))?;
    cursor
        .offset_value()
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| StorageError::InvalidPageKey {
            storage: meta.name().to_string(),
            page_key: page_key.to_string(),
        })
}

/// Trims a look-ahead fetch of `limit + 1` items starting at `offset` into a
/// page, issuing an offset page key only if the extra item was found.
pub fn look_ahead_page(mut items: Vec<Item>, offset: usize, limit: usize, fingerprint: String) -> Page {
    let next_page_key = if items.len() > limit {
        items.truncate(limit);
        Some(PageCursor::offset((offset + limit) as u64, Some(fingerprint)).encode())
    } else {
        None
    };
    Page::new(items, next_page_key)
}

/// Slices one page out of a fully filtered and sorted result set, issuing an
/// offset cursor bound to the search's fingerprint.
pub fn offset_page(
    meta: &StorageMeta,
    search: &SearchFilter,
    items: Vec<Item>,
    page_key: Option<&str>,
    limit: Option<usize>,
) -> StorageResult<Page> {
    let limit = meta.check_limit(limit)?;
    let fingerprint = search.fingerprint();
    let offset = decode_offset(meta, page_key, &fingerprint)?;
    let page = items.into_iter().skip(offset).take(limit + 1).collect();
    Ok(look_ahead_page(page, offset, limit, fingerprint))
}

/// Iterator that walks `paged_search` pages.
struct PageFollower<'a, S: Storage + ?Sized> {
    storage: &'a S,
    search: SearchFilter,
    buffer: VecDeque<Item>,
    next_page_key: Option<String>,
    started: bool,
    failed: bool,
}

impl<'a, S: Storage + ?Sized> PageFollower<'a, S> {
    fn new(storage: &'a S, search: SearchFilter) -> Self {
        Self {
            storage,
            search,
            buffer: VecDeque::new(),
            next_page_key: None,
            started: false,
            failed: false,
        }
    }

    fn fetch(&mut self) -> StorageResult<()> {
        let page = self
            .storage
            .paged_search(&self.search, self.next_page_key.as_deref(), None)?;
        self.started = true;
        self.buffer.extend(page.items);
        self.next_page_key = page.next_page_key;
        Ok(())
    }
}

impl<S: Storage + ?Sized> Iterator for PageFollower<'_, S> {
    type Item = StorageResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.failed || (self.started && self.next_page_key.is_none()) {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

macro_rules! delegate_storage {
    ($($ptr:ident),*) => {
        $(
            impl<S: Storage + ?Sized> Storage for $ptr<S> {
                fn meta(&self) -> &StorageMeta {
                    (**self).meta()
                }

                fn create(&self, item: Item) -> StorageResult<String> {
                    (**self).create(item)
                }

                fn read(&self, key: &str) -> StorageResult<Option<Item>> {
                    (**self).read(key)
                }

                fn read_all(
                    &self,
                    keys: &[String],
                    error_on_missing: bool,
                ) -> StorageResult<Vec<Option<Item>>> {
                    (**self).read_all(keys, error_on_missing)
                }

                fn update(&self, item: Item) -> StorageResult<Item> {
                    (**self).update(item)
                }

                fn destroy(&self, key: &str) -> StorageResult<bool> {
                    (**self).destroy(key)
                }

                fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
                    (**self).search(search)
                }

                fn count(&self, filter: &Filter) -> StorageResult<u64> {
                    (**self).count(filter)
                }

                fn paged_search(
                    &self,
                    search: &SearchFilter,
                    page_key: Option<&str>,
                    limit: Option<usize>,
                ) -> StorageResult<Page> {
                    (**self).paged_search(search, page_key, limit)
                }

                fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
                    (**self).edit_all(edits)
                }
            }
        )*
    };
}

delegate_storage!(Box, Arc);
