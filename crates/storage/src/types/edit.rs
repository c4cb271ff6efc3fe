//! Bulk edit requests.

use crate::error::StorageError;
use crate::types::Item;

/// A single edit in a bulk `edit_all` request.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Create a new item.
    Create(Item),
    /// Replace an existing item.
    Update(Item),
    /// Delete the item with the given key.
    Destroy(String),
}

impl Edit {
    /// Returns the access-controlled operation this edit performs.
    pub fn operation(&self) -> crate::error::Operation {
        match self {
            Edit::Create(_) => crate::error::Operation::Create,
            Edit::Update(_) => crate::error::Operation::Update,
            Edit::Destroy(_) => crate::error::Operation::Destroy,
        }
    }
}

/// The outcome of one submitted edit.
///
/// `edit_all` always returns exactly one result per submitted edit, in the
/// submitted order. Under the default fail-fast policy every edit after the
/// first failure is reported as [`EditResult::Skipped`].
#[derive(Debug)]
pub enum EditResult {
    /// The item was created under `key`.
    Created {
        /// Key of the new item.
        key: String,
    },
    /// The item was replaced.
    Updated {
        /// Key of the replaced item.
        key: String,
    },
    /// The destroy ran; `existed` is false if nothing was deleted.
    Destroyed {
        /// Key that was destroyed.
        key: String,
        /// Whether an item was actually removed.
        existed: bool,
    },
    /// The edit failed.
    Failed {
        /// Why the edit failed.
        error: StorageError,
    },
    /// The edit was not attempted because an earlier edit failed.
    Skipped,
}

impl EditResult {
    /// Returns true if the edit was applied.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            EditResult::Created { .. } | EditResult::Updated { .. } | EditResult::Destroyed { .. }
        )
    }

    /// Returns the error if the edit failed.
    pub fn error(&self) -> Option<&StorageError> {
        match self {
            EditResult::Failed { error } => Some(error),
            _ => None,
        }
    }
}
