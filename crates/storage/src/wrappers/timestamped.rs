//! Creation and update timestamps.

use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, SystemClock, format_timestamp};
use crate::core::{ItemIter, Storage};
use crate::error::{StorageResult, ValidationError};
use crate::filter::{Filter, SearchFilter};
use crate::meta::{CacheControl, StorageMeta};
use crate::types::{Edit, EditResult, Item, Page};

/// Default creation timestamp attribute.
pub const DEFAULT_CREATED_AT: &str = "created_at";

/// Default update timestamp attribute.
pub const DEFAULT_UPDATED_AT: &str = "updated_at";

/// Storage that owns an item's creation and update timestamps.
///
/// `create` sets both attributes to the current time; `update` sets the
/// update time and carries the creation time over from the stored item.
/// Callers cannot supply either value: the published meta marks both
/// attributes as neither creatable nor updatable, and switches cache control
/// to [`CacheControl::Timestamp`] on the update attribute.
#[derive(Debug)]
pub struct TimestampedStorage<S> {
    inner: S,
    meta: StorageMeta,
    created_at: String,
    updated_at: String,
    clock: Arc<dyn Clock>,
}

impl<S: Storage> TimestampedStorage<S> {
    /// Wraps `inner` using the default attribute names and the system clock.
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidMeta` - If either attribute is not declared
    pub fn new(inner: S) -> StorageResult<Self> {
        Self::with_clock(inner, Arc::new(SystemClock))
    }

    /// Wraps `inner` using the default attribute names and `clock`.
    pub fn with_clock(inner: S, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        Self::with_attr_names(inner, DEFAULT_CREATED_AT, DEFAULT_UPDATED_AT, clock)
    }

    /// Wraps `inner`, stamping the named attributes.
    pub fn with_attr_names(
        inner: S,
        created_at: impl Into<String>,
        updated_at: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> StorageResult<Self> {
        let created_at = created_at.into();
        let updated_at = updated_at.into();
        let inner_meta = inner.meta();
        for name in [&created_at, &updated_at] {
            if inner_meta.attr(name).is_none() {
                return Err(ValidationError::InvalidMeta {
                    storage: inner_meta.name().to_string(),
                    message: format!("timestamp attribute '{name}' is not declared"),
                }
                .into());
            }
        }

        let meta = inner_meta
            .derive_attrs(|attr| {
                let mut attr = attr.clone();
                if attr.name == created_at || attr.name == updated_at {
                    attr.creatable = false;
                    attr.updatable = false;
                    attr.readable = true;
                }
                attr
            })
            .derive_cache_control(CacheControl::Timestamp {
                updated_at_attr: updated_at.clone(),
            });

        Ok(Self {
            inner,
            meta,
            created_at,
            updated_at,
            clock,
        })
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn stamp_create(&self, item: &mut Item) {
        let now = Value::String(format_timestamp(self.clock.now()));
        item.insert(self.created_at.clone(), now.clone());
        item.insert(self.updated_at.clone(), now);
    }

    fn stamp_update(&self, item: &mut Item) -> StorageResult<()> {
        let now = format_timestamp(self.clock.now());
        item.insert(self.updated_at.clone(), Value::String(now));
        item.remove(&self.created_at);

        // Absent items keep no creation time; the inner update reports them.
        let key = self.meta.key_of(item)?;
        if let Some(created) = self
            .inner
            .read(&key)?
            .and_then(|stored| stored.get(&self.created_at).cloned())
        {
            item.insert(self.created_at.clone(), created);
        }
        Ok(())
    }
}

impl<S: Storage> Storage for TimestampedStorage<S> {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    fn create(&self, mut item: Item) -> StorageResult<String> {
        self.stamp_create(&mut item);
        self.inner.create(item)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.read(key)
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        self.inner.read_all(keys, error_on_missing)
    }

    fn update(&self, mut item: Item) -> StorageResult<Item> {
        self.stamp_update(&mut item)?;
        self.inner.update(item)
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        self.inner.destroy(key)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        self.inner.search(search)
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        self.inner.count(filter)
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        self.inner.paged_search(search, page_key, limit)
    }

    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        let mut stamped = Vec::with_capacity(edits.len());
        for edit in edits {
            stamped.push(match edit {
                Edit::Create(mut item) => {
                    self.stamp_create(&mut item);
                    Edit::Create(item)
                }
                Edit::Update(mut item) => {
                    self.stamp_update(&mut item)?;
                    Edit::Update(item)
                }
                destroy => destroy,
            });
        }
        self.inner.edit_all(stamped)
    }
}
