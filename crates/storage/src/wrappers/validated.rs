//! Schema validation before delegation.

use crate::core::{ItemIter, Storage};
use crate::error::StorageResult;
use crate::filter::{Filter, SearchFilter};
use crate::meta::{ItemSchema, StorageMeta};
use crate::types::{Edit, EditResult, Item, Page};

use super::precheck_edits;

/// Storage that validates inputs against schemas derived from the inner meta.
///
/// Creates and updates are checked against different schemas (generated
/// attributes are optional on create, keys are required on update). Search
/// filters and comparators must only reference searchable / sortable
/// attributes. Failures raise `StorageError::Validation` and never reach the
/// inner storage.
#[derive(Debug)]
pub struct SchemaValidatedStorage<S> {
    inner: S,
    create_schema: ItemSchema,
    update_schema: ItemSchema,
}

impl<S: Storage> SchemaValidatedStorage<S> {
    /// Wraps `inner`, deriving both schemas from its meta.
    pub fn new(inner: S) -> Self {
        let create_schema = inner.meta().create_schema();
        let update_schema = inner.meta().update_schema();
        Self {
            inner,
            create_schema,
            update_schema,
        }
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_edit(&self, edit: &Edit) -> StorageResult<()> {
        match edit {
            Edit::Create(item) => self.create_schema.validate(item)?,
            Edit::Update(item) => self.update_schema.validate(item)?,
            Edit::Destroy(_) => {}
        }
        Ok(())
    }
}

impl<S: Storage> Storage for SchemaValidatedStorage<S> {
    fn meta(&self) -> &StorageMeta {
        self.inner.meta()
    }

    fn create(&self, item: Item) -> StorageResult<String> {
        self.create_schema.validate(&item)?;
        self.inner.create(item)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.read(key)
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        self.inner.read_all(keys, error_on_missing)
    }

    fn update(&self, item: Item) -> StorageResult<Item> {
        self.update_schema.validate(&item)?;
        self.inner.update(item)
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        self.inner.destroy(key)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        search.validate(self.meta())?;
        self.inner.search(search)
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        filter.validate(self.meta())?;
        self.inner.count(filter)
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        search.validate(self.meta())?;
        self.inner.paged_search(search, page_key, limit)
    }

    /// Validates every edit first; an invalid edit rejects the whole batch
    /// with one result per edit.
    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        if let Some(results) = precheck_edits(&edits, |edit| self.check_edit(edit)) {
            return Ok(results);
        }
        self.inner.edit_all(edits)
    }
}
