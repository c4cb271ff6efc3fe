//! Explicit registry of named storages.
//!
//! A [`StorageRegistry`] is built once at startup and handed to whatever needs
//! to look storages up by name. There is no process-wide default registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::core::Storage;
use crate::error::{StorageResult, ValidationError};
use crate::meta::StorageMeta;

/// A shared, type-erased storage.
pub type DynStorage = Arc<dyn Storage>;

/// Name to storage map.
///
/// Storages are registered under their meta name. The registry is safe to
/// share between threads; lookups hand out cheap `Arc` clones.
///
/// # Examples
///
/// ```
/// use persisty_storage::backends::memory::MemStorage;
/// use persisty_storage::meta::{Attr, StorageMeta};
/// use persisty_storage::registry::StorageRegistry;
/// use persisty_storage::wrappers::StorageExt;
///
/// let meta = StorageMeta::builder("books").attr(Attr::string("id")).build().unwrap();
/// let registry = StorageRegistry::new();
/// registry.register(MemStorage::new(meta).logged().shared()).unwrap();
///
/// assert_eq!(registry.names(), vec!["books".to_string()]);
/// assert!(registry.get("books").is_some());
/// ```
#[derive(Default)]
pub struct StorageRegistry {
    storages: RwLock<BTreeMap<String, DynStorage>>,
}

impl StorageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a storage under its meta name.
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidMeta` - If the name is already taken
    pub fn register(&self, storage: DynStorage) -> StorageResult<()> {
        let name = storage.meta().name().to_string();
        let mut storages = self.storages.write();
        if storages.contains_key(&name) {
            return Err(ValidationError::InvalidMeta {
                storage: name,
                message: "a storage with this name is already registered".to_string(),
            }
            .into());
        }
        info!(storage = %name, "registered storage");
        storages.insert(name, storage);
        Ok(())
    }

    /// Looks up a storage by name.
    pub fn get(&self, name: &str) -> Option<DynStorage> {
        self.storages.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.storages.read().keys().cloned().collect()
    }

    /// Metas of every registered storage, sorted by name.
    pub fn metas(&self) -> Vec<StorageMeta> {
        self.storages
            .read()
            .values()
            .map(|storage| storage.meta().clone())
            .collect()
    }

    /// Removes and returns a storage.
    pub fn remove(&self, name: &str) -> Option<DynStorage> {
        self.storages.write().remove(name)
    }

    /// Number of registered storages.
    pub fn len(&self) -> usize {
        self.storages.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.storages.read().is_empty()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemStorage;
    use crate::error::StorageError;
    use crate::meta::{AccessControl, Attr};
    use crate::wrappers::StorageExt;

    fn storage(name: &str) -> DynStorage {
        let meta = StorageMeta::builder(name)
            .attr(Attr::string("id"))
            .build()
            .unwrap();
        Arc::new(MemStorage::new(meta))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = StorageRegistry::new();
        registry.register(storage("b")).unwrap();
        registry.register(storage("a")).unwrap();

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().meta().name(), "a");
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = StorageRegistry::new();
        registry.register(storage("a")).unwrap();
        let err = registry.register(storage("a")).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Validation(ValidationError::InvalidMeta { .. })
        ));
    }

    #[test]
    fn test_metas_reflect_wrappers() {
        let registry = StorageRegistry::new();
        let meta = StorageMeta::builder("ro")
            .attr(Attr::string("id"))
            .build()
            .unwrap();
        registry
            .register(
                MemStorage::new(meta)
                    .with_access(AccessControl::READ_ONLY)
                    .shared(),
            )
            .unwrap();
        let metas = registry.metas();
        assert_eq!(metas.len(), 1);
        assert!(!metas[0].access_control().creatable);
    }

    #[test]
    fn test_remove() {
        let registry = StorageRegistry::new();
        registry.register(storage("a")).unwrap();
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }
}
