//! Capability enforcement.

use crate::core::{ItemIter, Storage};
use crate::error::{Operation, StorageError, StorageResult};
use crate::filter::{Filter, SearchFilter};
use crate::meta::{AccessControl, StorageMeta};
use crate::types::{Edit, EditResult, Item, Page};

/// Storage that only permits the operations both it and its inner storage
/// allow.
///
/// The effective access control is the intersection of the configured one
/// and the inner storage's, and is published through [`Storage::meta`].
/// Denied operations fail with `AccessDenied` before the inner storage is
/// called.
///
/// # Examples
///
/// ```
/// use persisty_storage::backends::memory::MemStorage;
/// use persisty_storage::core::Storage;
/// use persisty_storage::meta::{AccessControl, Attr, StorageMeta};
/// use persisty_storage::wrappers::AccessFilteredStorage;
///
/// let meta = StorageMeta::builder("books")
///     .attr(Attr::string("id"))
///     .access_control(AccessControl::ALL_ACCESS - AccessControl::DELETE_ONLY)
///     .build()
///     .unwrap();
/// let storage = AccessFilteredStorage::new(MemStorage::new(meta), AccessControl::READ_ONLY);
///
/// let access = storage.meta().access_control();
/// assert!(access.readable && access.searchable);
/// assert!(!access.creatable && !access.deletable);
/// ```
#[derive(Debug)]
pub struct AccessFilteredStorage<S> {
    inner: S,
    meta: StorageMeta,
}

impl<S: Storage> AccessFilteredStorage<S> {
    /// Wraps `inner`, intersecting `access_control` with its own.
    pub fn new(inner: S, access_control: AccessControl) -> Self {
        let inner_meta = inner.meta();
        let meta = inner_meta.derive_access_control(inner_meta.access_control() & access_control);
        Self { inner, meta }
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Consumes the wrapper, returning the inner storage.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn check(&self, operation: Operation) -> StorageResult<()> {
        self.meta
            .access_control()
            .check(self.meta.name(), operation)
    }

    fn check_key(&self, operation: Operation, key: &str) -> StorageResult<()> {
        if self.meta.access_control().allows(operation) {
            return Ok(());
        }
        Err(StorageError::AccessDenied {
            storage: self.meta.name().to_string(),
            operation,
            key: Some(key.to_string()),
        })
    }
}

impl<S: Storage> Storage for AccessFilteredStorage<S> {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    fn create(&self, item: Item) -> StorageResult<String> {
        self.check(Operation::Create)?;
        self.inner.create(item)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        self.check_key(Operation::Read, key)?;
        self.inner.read(key)
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        self.check(Operation::Read)?;
        self.inner.read_all(keys, error_on_missing)
    }

    fn update(&self, item: Item) -> StorageResult<Item> {
        match self.meta.key_config().get_key(&item) {
            Some(key) => self.check_key(Operation::Update, &key)?,
            None => self.check(Operation::Update)?,
        }
        self.inner.update(item)
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        self.check_key(Operation::Destroy, key)?;
        self.inner.destroy(key)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        self.check(Operation::Search)?;
        self.inner.search(search)
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        self.check(Operation::Search)?;
        self.inner.count(filter)
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        self.check(Operation::Search)?;
        self.inner.paged_search(search, page_key, limit)
    }

    /// Fails without applying anything if any edit is denied.
    fn edit_all(&self, edits: Vec<Edit>) -> StorageResult<Vec<EditResult>> {
        for edit in &edits {
            match edit {
                Edit::Destroy(key) => self.check_key(Operation::Destroy, key)?,
                other => self.check(other.operation())?,
            }
        }
        self.inner.edit_all(edits)
    }
}
