//! Access control flags.

use std::ops::{BitAnd, BitOr, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{Operation, StorageError, StorageResult};

/// Five independent capabilities a storage may grant.
///
/// Access controls compose: `&` keeps only the capabilities both sides grant,
/// `|` keeps those either side grants, and `-` removes the capabilities the
/// right side grants.
///
/// # Examples
///
/// ```
/// use persisty_storage::meta::AccessControl;
///
/// let read_only = AccessControl::READ_ONLY;
/// let combined = AccessControl::ALL_ACCESS & read_only;
/// assert!(combined.readable);
/// assert!(!combined.creatable);
///
/// let no_delete = AccessControl::ALL_ACCESS - AccessControl::DELETE_ONLY;
/// assert!(!no_delete.deletable);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControl {
    /// Items may be created.
    pub creatable: bool,
    /// Items may be read by key.
    pub readable: bool,
    /// Items may be replaced.
    pub updatable: bool,
    /// Items may be destroyed.
    pub deletable: bool,
    /// Items may be searched and counted.
    pub searchable: bool,
}

impl AccessControl {
    /// Every capability.
    pub const ALL_ACCESS: AccessControl = AccessControl {
        creatable: true,
        readable: true,
        updatable: true,
        deletable: true,
        searchable: true,
    };

    /// No capability.
    pub const NO_ACCESS: AccessControl = AccessControl {
        creatable: false,
        readable: false,
        updatable: false,
        deletable: false,
        searchable: false,
    };

    /// Read and search only.
    pub const READ_ONLY: AccessControl = AccessControl {
        creatable: false,
        readable: true,
        updatable: false,
        deletable: false,
        searchable: true,
    };

    /// Destroy only.
    pub const DELETE_ONLY: AccessControl = AccessControl {
        creatable: false,
        readable: false,
        updatable: false,
        deletable: true,
        searchable: false,
    };

    /// Returns true if the operation is permitted.
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.creatable,
            Operation::Read => self.readable,
            Operation::Update => self.updatable,
            Operation::Destroy => self.deletable,
            Operation::Search => self.searchable,
        }
    }

    /// Fails with `AccessDenied` if the operation is not permitted.
    pub fn check(&self, storage: &str, operation: Operation) -> StorageResult<()> {
        if self.allows(operation) {
            Ok(())
        } else {
            Err(StorageError::access_denied(storage, operation))
        }
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::ALL_ACCESS
    }
}

impl BitAnd for AccessControl {
    type Output = AccessControl;

    fn bitand(self, rhs: Self) -> Self::Output {
        AccessControl {
            creatable: self.creatable && rhs.creatable,
            readable: self.readable && rhs.readable,
            updatable: self.updatable && rhs.updatable,
            deletable: self.deletable && rhs.deletable,
            searchable: self.searchable && rhs.searchable,
        }
    }
}

impl BitOr for AccessControl {
    type Output = AccessControl;

    fn bitor(self, rhs: Self) -> Self::Output {
        AccessControl {
            creatable: self.creatable || rhs.creatable,
            readable: self.readable || rhs.readable,
            updatable: self.updatable || rhs.updatable,
            deletable: self.deletable || rhs.deletable,
            searchable: self.searchable || rhs.searchable,
        }
    }
}

impl Sub for AccessControl {
    type Output = AccessControl;

    fn sub(self, rhs: Self) -> Self::Output {
        AccessControl {
            creatable: self.creatable && !rhs.creatable,
            readable: self.readable && !rhs.readable,
            updatable: self.updatable && !rhs.updatable,
            deletable: self.deletable && !rhs.deletable,
            searchable: self.searchable && !rhs.searchable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_ONLY: AccessControl = AccessControl {
        creatable: true,
        ..AccessControl::NO_ACCESS
    };

    #[test]
    fn test_identity_elements() {
        for x in [
            AccessControl::READ_ONLY,
            AccessControl::DELETE_ONLY,
            CREATE_ONLY,
        ] {
            assert_eq!(AccessControl::ALL_ACCESS & x, x);
            assert_eq!(AccessControl::NO_ACCESS | x, x);
        }
    }

    #[test]
    fn test_intersection_is_most_restrictive() {
        let a = AccessControl::READ_ONLY;
        let b = CREATE_ONLY | AccessControl::READ_ONLY;
        let both = a & b;
        assert_eq!(both.creatable, a.creatable && b.creatable);
        assert!(both.readable);
        assert!(!both.deletable);
    }

    #[test]
    fn test_subtraction_removes_capability() {
        let result = AccessControl::ALL_ACCESS - AccessControl::DELETE_ONLY;
        assert!(!result.deletable);
        assert!(result.creatable && result.readable && result.updatable && result.searchable);
    }

    #[test]
    fn test_check() {
        assert!(AccessControl::READ_ONLY.check("books", Operation::Read).is_ok());
        let err = AccessControl::READ_ONLY
            .check("books", Operation::Update)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::AccessDenied {
                operation: Operation::Update,
                ..
            }
        ));
    }
}
