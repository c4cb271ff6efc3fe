//! Read-through item cache with expiry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::core::{ItemIter, Storage, require_all};
use crate::error::StorageResult;
use crate::filter::{Filter, SearchFilter};
use crate::meta::{CacheControl, StorageMeta};
use crate::types::{Edit, EditResult, Item, Page};

#[derive(Debug, Clone)]
struct CacheEntry {
    item: Item,
    expire_at: DateTime<Utc>,
}

/// Cached entries plus the time of the next expiry sweep.
#[derive(Debug)]
struct Cache {
    entries: HashMap<String, CacheEntry>,
    next_sweep: DateTime<Utc>,
}

impl Cache {
    /// Drops expired entries at most once per `ttl`, so the map holds only
    /// entries stored within the last two periods.
    fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) {
        if now < self.next_sweep {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expire_at > now);
        self.next_sweep = now + ttl;
        let swept = before - self.entries.len();
        if swept > 0 {
            debug!(swept, "expired cache entries dropped");
        }
    }
}

/// Storage that caches items by key for a fixed time to live.
///
/// `read` and `read_all` are served from the cache while an entry is fresh,
/// so changes made behind the wrapper stay invisible until the entry expires.
/// Writes through the wrapper refresh the cache, destroys evict, and search
/// results warm it without being served from it.
///
/// The cache map sits behind a mutex, which keeps single calls consistent;
/// a read racing a write through another handle may still cache the older
/// item until it expires.
#[derive(Debug)]
pub struct TtlCacheStorage<S> {
    inner: S,
    meta: StorageMeta,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<Cache>,
}

impl<S: Storage> TtlCacheStorage<S> {
    /// Wraps `inner`, expiring entries `ttl` after they are cached.
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    /// Wraps `inner`, measuring expiry with `clock`.
    pub fn with_clock(inner: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let inner_meta = inner.meta();
        let ttl_ms = u64::try_from(ttl.num_milliseconds()).unwrap_or(0);
        let meta = inner_meta.derive_cache_control(CacheControl::Ttl {
            ttl_ms,
            inner: Box::new(inner_meta.cache_control().clone()),
        });
        let cache = Cache {
            entries: HashMap::new(),
            next_sweep: clock.now() + ttl,
        };
        Self {
            inner,
            meta,
            ttl,
            clock,
            cache: Mutex::new(cache),
        }
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.cache.lock().entries.clear();
    }

    /// Number of cached entries, fresh or not.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    fn cached(&self, key: &str) -> Option<Item> {
        let now = self.clock.now();
        let mut cache = self.cache.lock();
        match cache.entries.get(key) {
            Some(entry) if entry.expire_at > now => Some(entry.item.clone()),
            Some(_) => {
                cache.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, item: Item) {
        let now = self.clock.now();
        let mut cache = self.cache.lock();
        cache.sweep(now, self.ttl);
        cache.entries.insert(
            key,
            CacheEntry {
                item,
                expire_at: now + self.ttl,
            },
        );
    }

    fn store_item(&self, item: &Item) {
        if let Some(key) = self.meta.key_config().get_key(item) {
            self.store(key, item.clone());
        }
    }

    fn evict(&self, key: &str) {
        self.cache.lock().entries.remove(key);
    }
}

impl<S: Storage> Storage for TtlCacheStorage<S> {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    /// Caches the stored item, read back so generated attributes are kept.
    fn create(&self, item: Item) -> StorageResult<String> {
        let key = self.inner.create(item)?;
        match self.inner.read(&key)? {
            Some(stored) => self.store(key.clone(), stored),
            None => self.evict(&key),
        }
        Ok(key)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        if let Some(item) = self.cached(key) {
            debug!(storage = %self.meta.name(), key = %key, "cache hit");
            return Ok(Some(item));
        }
        let item = self.inner.read(key)?;
        if let Some(item) = &item {
            self.store(key.to_string(), item.clone());
        }
        Ok(item)
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        let mut items: Vec<Option<Item>> = keys.iter().map(|key| self.cached(key)).collect();
        let misses: Vec<String> = keys
            .iter()
            .zip(&items)
            .filter(|(_, item)| item.is_none())
            .map(|(key, _)| key.clone())
            .collect();

        if !misses.is_empty() {
            let fetched: HashMap<String, Item> = misses
                .iter()
                .cloned()
                .zip(self.inner.read_all(&misses, false)?)
                .filter_map(|(key, item)| item.map(|item| (key, item)))
                .collect();
            for (key, slot) in keys.iter().zip(items.iter_mut()) {
                if slot.is_none() {
                    if let Some(item) = fetched.get(key) {
                        self.store(key.clone(), item.clone());
                        *slot = Some(item.clone());
                    }
                }
            }
        }
        require_all(&self.meta, keys, items, error_on_missing)
    }

    fn update(&self, item: Item) -> StorageResult<Item> {
        let key = self.meta.key_of(&item)?;
        match self.inner.update(item) {
            Ok(updated) => {
                self.store(key, updated.clone());
                Ok(updated)
            }
            Err(e) => {
                self.evict(&key);
                Err(e)
            }
        }
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        self.evict(key);
        self.inner.destroy(key)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        let results = self.inner.search(search)?;
        Ok(Box::new(results.inspect(|result| {
            if let Ok(item) = result {
                self.store_item(item);
            }
        })))
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
        let page = self.inner.paged_search(search, page_key, limit)?;
        page.items.iter().for_each(|item| self.store_item(item));
        Ok(page)
    }

    /// Delegates the batch, then evicts every key it touched.
    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        let mut touched: Vec<String> = edits
            .iter()
            .filter_map(|edit| match edit {
                Edit::Create(item) | Edit::Update(item) => self.meta.key_config().get_key(item),
                Edit::Destroy(key) => Some(key.clone()),
            })
            .collect();
        let results = self.inner.edit_all(edits)?;
        touched.extend(results.iter().filter_map(|result| match result {
            EditResult::Created { key } => Some(key.clone()),
            _ => None,
        }));

        let mut cache = self.cache.lock();
        for key in &touched {
            cache.entries.remove(key);
        }
        Ok(results)
    }
}
