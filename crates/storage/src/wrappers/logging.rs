//! Structured logging of storage calls.

use tracing::{debug, info, warn};

use crate::core::{ItemIter, Storage};
use crate::error::StorageResult;
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Edit, EditResult, Item, Page};

/// Storage that logs every mutation and search result through `tracing`.
///
/// Mutations log at `info` before and after the inner call, failures at
/// `warn`, and each search result at `debug`. Nothing else changes.
#[derive(Debug)]
pub struct LoggingStorage<S> {
    inner: S,
}

impl<S: Storage> LoggingStorage<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn name(&self) -> &str {
        self.inner.meta().name()
    }

    fn log_outcome<T>(&self, op: &'static str, key: Option<&str>, result: &StorageResult<T>) {
        let key = key.unwrap_or("-");
        match result {
            Ok(_) => info!(storage = %self.name(), op, key = %key, "storage call completed"),
            Err(e) => warn!(storage = %self.name(), op, key = %key, error = %e, "storage call failed"),
        }
    }
}

impl<S: Storage> Storage for LoggingStorage<S> {
    fn meta(&self) -> &StorageMeta {
        self.inner.meta()
    }

    fn create(&self, item: Item) -> StorageResult<String> {
        info!(storage = %self.name(), attrs = item.len(), "create");
        let result = self.inner.create(item);
        self.log_outcome("create", result.as_deref().ok(), &result);
        result
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        let result = self.inner.read(key);
        if let Ok(item) = &result {
            debug!(storage = %self.name(), key = %key, found = item.is_some(), "read");
        }
        result
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        let result = self.inner.read_all(keys, error_on_missing);
        if let Ok(items) = &result {
            let found = items.iter().flatten().count();
            debug!(storage = %self.name(), requested = keys.len(), found, "read_all");
        }
        result
    }

    fn update(&self, item: Item) -> StorageResult<Item> {
        let key = self.inner.meta().key_config().get_key(&item);
        info!(storage = %self.name(), key = ?key, "update");
        let result = self.inner.update(item);
        self.log_outcome("update", key.as_deref(), &result);
        result
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        info!(storage = %self.name(), key = %key, "destroy");
        let result = self.inner.destroy(key);
        self.log_outcome("destroy", Some(key), &result);
        result
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        debug!(storage = %self.name(), filter = ?search.filter, order = ?search.order, "search");
        let results = self.inner.search(search)?;
        let name = self.name();
        let key_config = self.inner.meta().key_config();
        Ok(Box::new(results.inspect(move |result| match result {
            Ok(item) => debug!(storage = %name, key = ?key_config.get_key(item), "search result"),
            Err(e) => warn!(storage = %name, error = %e, "search failed"),
        })))
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        let result = self.inner.count(filter);
        if let Ok(count) = &result {
            debug!(storage = %self.name(), filter = ?filter, count, "count");
        }
        result
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        let result = self.inner.paged_search(search, page_key, limit);
        if let Ok(page) = &result {
            let key_config = self.inner.meta().key_config();
            for item in &page.items {
                debug!(storage = %self.name(), key = ?key_config.get_key(item), "search result");
            }
            debug!(
                storage = %self.name(),
                items = page.len(),
                has_next = page.has_next(),
                "paged_search"
            );
        }
        result
    }

    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        info!(storage = %self.name(), edits = edits.len(), "edit_all");
        let result = self.inner.edit_all(edits);
        if let Ok(results) = &result {
            let applied = results.iter().filter(|r| r.is_applied()).count();
            if applied == results.len() {
                info!(storage = %self.name(), applied, "edit_all completed");
            } else {
                warn!(storage = %self.name(), applied, total = results.len(), "edit_all partially applied");
            }
        } else {
            self.log_outcome("edit_all", None, &result);
        }
        result
    }
}
