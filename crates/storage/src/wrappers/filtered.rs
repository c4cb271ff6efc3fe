//! Dataset restriction by filter.

use crate::core::{ItemIter, Storage, apply_edits, require_all};
use crate::error::{StorageError, StorageResult, ValidationError};
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Edit, EditResult, Item, Page};

use super::precheck_edits;

/// Storage that exposes only the items matching a filter.
///
/// - searches and counts are narrowed by conjoining the filter
/// - `create` and `update` of items outside the filter are rejected with
///   `ValidationError::FilterRejected`
/// - items outside the filter read as absent, and destroying one is a
///   no-op returning `false`
#[derive(Debug)]
pub struct FilteredStorage<S> {
    inner: S,
    filter: Filter,
}

impl<S: Storage> FilteredStorage<S> {
    /// Wraps `inner`, restricting it to `filter`.
    pub fn new(inner: S, filter: Filter) -> Self {
        Self { inner, filter }
    }

    /// Returns the restricting filter.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn visible(&self, item: &Item) -> bool {
        self.filter.matches(item, self.inner.meta().attrs())
    }

    fn rejected(&self, item: &Item) -> StorageError {
        StorageError::Validation(ValidationError::FilterRejected {
            storage: self.inner.meta().name().to_string(),
            key: self.inner.meta().key_config().get_key(item),
        })
    }

    fn check_write(&self, item: &Item) -> StorageResult<()> {
        if self.visible(item) {
            Ok(())
        } else {
            Err(self.rejected(item))
        }
    }

    fn read_visible(&self, key: &str) -> StorageResult<Option<Item>> {
        Ok(self.inner.read(key)?.filter(|item| self.visible(item)))
    }
}

impl<S: Storage> Storage for FilteredStorage<S> {
    fn meta(&self) -> &StorageMeta {
        self.inner.meta()
    }

    fn create(&self, item: Item) -> StorageResult<String> {
        self.check_write(&item)?;
        self.inner.create(item)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        self.read_visible(key)
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        let items = self
            .inner
            .read_all(keys, false)?
            .into_iter()
            .map(|item| item.filter(|item| self.visible(item)))
            .collect();
        require_all(self.meta(), keys, items, error_on_missing)
    }

    /// Both the replacement and the stored item must match the filter; a
    /// stored item outside the filter is reported as missing.
    fn update(&self, item: Item) -> StorageResult<Item> {
        self.check_write(&item)?;
        let key = self.meta().key_of(&item)?;
        if self.read_visible(&key)?.is_none() {
            return Err(StorageError::missing(self.meta().name(), key));
        }
        self.inner.update(item)
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        if self.read_visible(key)?.is_none() {
            return Ok(false);
        }
        self.inner.destroy(key)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        self.inner.search(&search.and_filter(&self.filter))
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        self.inner
            .count(&Filter::and([filter.clone(), self.filter.clone()]))
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        self.inner
            .paged_search(&search.and_filter(&self.filter), page_key, limit)
    }

    /// Returns one result per submitted edit.
    ///
    /// Creates and updates outside the filter reject the whole batch before
    /// anything is applied. The remaining edits run in order, so a destroy
    /// sees items created earlier in the same batch.
    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        let rejected = precheck_edits(&edits, |edit| match edit {
            Edit::Create(item) | Edit::Update(item) => self.check_write(item),
            Edit::Destroy(_) => Ok(()),
        });
        if let Some(results) = rejected {
            return Ok(results);
        }
        Ok(apply_edits(self, edits))
    }
}
