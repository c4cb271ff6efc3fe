//! Composable storage wrappers.
//!
//! Each wrapper holds exactly one inner [`Storage`] and adds one cross-cutting
//! policy on top of it:
//!
//! | Wrapper | Policy |
//! |---------|--------|
//! | [`AccessFilteredStorage`] | capability checks before delegating |
//! | [`FilteredStorage`] | restricts the visible dataset to a filter |
//! | [`TimestampedStorage`] | stamps `created_at` / `updated_at` |
//! | [`SchemaValidatedStorage`] | validates items, filters and comparators |
//! | [`TtlCacheStorage`] | read-through cache with expiry |
//! | [`LoggingStorage`] | logs mutations and search results |
//!
//! Wrappers read their meta from the inner storage and only rewrite the
//! fields they own, so they compose in any order.
//!
//! # Example
//!
//! ```
//! use persisty_storage::backends::memory::MemStorage;
//! use persisty_storage::core::Storage;
//! use persisty_storage::filter::attr;
//! use persisty_storage::meta::{AccessControl, Attr, StorageMeta};
//! use persisty_storage::wrappers::StorageExt;
//! use serde_json::json;
//!
//! let meta = StorageMeta::builder("books")
//!     .attr(Attr::string("id"))
//!     .attr(Attr::string("genre"))
//!     .build()
//!     .unwrap();
//!
//! let storage = MemStorage::new(meta)
//!     .with_filter(attr("genre").eq("poetry"))
//!     .with_access(AccessControl::ALL_ACCESS - AccessControl::DELETE_ONLY)
//!     .logged();
//!
//! let poem = json!({"id": "p1", "genre": "poetry"}).as_object().cloned().unwrap();
//! storage.create(poem).unwrap();
//! assert!(!storage.meta().access_control().deletable);
//! assert!(storage.destroy("p1").is_err());
//! ```

mod access;
mod filtered;
mod logging;
mod timestamped;
mod ttl_cache;
mod validated;

use std::sync::Arc;

use chrono::Duration;

pub use access::AccessFilteredStorage;
pub use filtered::FilteredStorage;
pub use logging::LoggingStorage;
pub use timestamped::{DEFAULT_CREATED_AT, DEFAULT_UPDATED_AT, TimestampedStorage};
pub use ttl_cache::TtlCacheStorage;
pub use validated::SchemaValidatedStorage;

use crate::core::Storage;
use crate::error::{StorageError, StorageResult};
use crate::filter::Filter;
use crate::meta::AccessControl;
use crate::types::{Edit, EditResult};

/// Fluent construction of wrapper stacks.
///
/// Each call wraps `self`, so the first call is the innermost layer.
pub trait StorageExt: Storage + Sized {
    /// Restricts the permitted operations.
    fn with_access(self, access_control: AccessControl) -> AccessFilteredStorage<Self> {
        AccessFilteredStorage::new(self, access_control)
    }

    /// Restricts the visible dataset to items matching `filter`.
    fn with_filter(self, filter: Filter) -> FilteredStorage<Self> {
        FilteredStorage::new(self, filter)
    }

    /// Stamps `created_at` and `updated_at` using the system clock.
    ///
    /// # Errors
    ///
    /// Fails if either attribute is not declared by the storage.
    fn timestamped(self) -> StorageResult<TimestampedStorage<Self>> {
        TimestampedStorage::new(self)
    }

    /// Validates writes and searches against the storage's schemas.
    fn validated(self) -> SchemaValidatedStorage<Self> {
        SchemaValidatedStorage::new(self)
    }

    /// Caches reads for `ttl` using the system clock.
    fn with_ttl_cache(self, ttl: Duration) -> TtlCacheStorage<Self> {
        TtlCacheStorage::new(self, ttl)
    }

    /// Logs mutations and search results.
    fn logged(self) -> LoggingStorage<Self> {
        LoggingStorage::new(self)
    }

    /// Erases the concrete type.
    fn boxed(self) -> Box<dyn Storage>
    where
        Self: 'static,
    {
        Box::new(self)
    }

    /// Erases the concrete type behind a shared pointer.
    fn shared(self) -> Arc<dyn Storage>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<S: Storage> StorageExt for S {}

/// Runs `check` over every edit before any of them is applied.
///
/// If any edit is rejected, nothing is forwarded: rejected edits report their
/// error and the others are reported as skipped.
pub(crate) fn precheck_edits<F>(edits: &[Edit], mut check: F) -> Option<Vec<EditResult>>
where
    F: FnMut(&Edit) -> Result<(), StorageError>,
{
    let outcomes: Vec<Result<(), StorageError>> = edits.iter().map(&mut check).collect();
    if outcomes.iter().all(Result::is_ok) {
        return None;
    }
    Some(
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(()) => EditResult::Skipped,
                Err(error) => EditResult::Failed { error },
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemStorage;
    use crate::error::ValidationError;
    use crate::meta::{Attr, StorageMeta};
    use serde_json::json;

    fn meta() -> StorageMeta {
        StorageMeta::builder("notes")
            .attr(Attr::string("id"))
            .attr(Attr::string("body"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_precheck_passes_when_all_edits_accepted() {
        let edits = vec![Edit::Destroy("a".into()), Edit::Destroy("b".into())];
        assert!(precheck_edits(&edits, |_| Ok(())).is_none());
    }

    #[test]
    fn test_precheck_reports_every_edit() {
        let edits = vec![Edit::Destroy("a".into()), Edit::Destroy("b".into())];
        let results = precheck_edits(&edits, |edit| match edit {
            Edit::Destroy(key) if key == "b" => Err(StorageError::Validation(
                ValidationError::FilterRejected {
                    storage: "notes".into(),
                    key: Some(key.clone()),
                },
            )),
            _ => Ok(()),
        })
        .unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], EditResult::Skipped));
        assert!(results[1].error().is_some());
    }

    #[test]
    fn test_ext_builds_boxed_stack() {
        let storage = MemStorage::new(meta())
            .validated()
            .with_access(AccessControl::READ_ONLY)
            .boxed();
        assert!(!storage.meta().access_control().creatable);
        let note = json!({"id": "n1", "body": "hi"}).as_object().cloned().unwrap();
        assert!(matches!(
            storage.create(note),
            Err(StorageError::AccessDenied { .. })
        ));
    }
}
