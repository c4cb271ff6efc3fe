//! Opens the same meta on every enabled backend.

use std::fmt;

use persisty_storage::backends::memory::MemStorage;
use persisty_storage::core::Storage;
use persisty_storage::meta::StorageMeta;

#[cfg(feature = "dynamodb")]
use persisty_storage::backends::dynamodb::{DynamoIndex, DynamoStorage};
#[cfg(feature = "sqlite")]
use persisty_storage::backends::sqlite::SqlStorage;

use super::fixtures::{books, books_meta};

/// A backend under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `MemStorage`.
    Memory,
    /// `SqlStorage` over a private in-memory database.
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// `DynamoStorage` over the local emulator.
    #[cfg(feature = "dynamodb")]
    Dynamo,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            #[cfg(feature = "sqlite")]
            BackendKind::Sqlite => write!(f, "sqlite"),
            #[cfg(feature = "dynamodb")]
            BackendKind::Dynamo => write!(f, "dynamodb"),
        }
    }
}

/// Every backend enabled in this build.
pub fn backend_kinds() -> Vec<BackendKind> {
    let mut kinds = vec![BackendKind::Memory];
    #[cfg(feature = "sqlite")]
    kinds.push(BackendKind::Sqlite);
    #[cfg(feature = "dynamodb")]
    kinds.push(BackendKind::Dynamo);
    kinds
}

/// Opens an empty storage for `meta` on the given backend.
pub fn open(kind: BackendKind, meta: StorageMeta) -> Box<dyn Storage> {
    match kind {
        BackendKind::Memory => Box::new(MemStorage::new(meta)),
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => Box::new(SqlStorage::in_memory(meta).expect("open sqlite storage")),
        #[cfg(feature = "dynamodb")]
        BackendKind::Dynamo => {
            // Books get a genre / year index so index queries are exercised too.
            let indexes = if meta.attr("genre").is_some() && meta.attr("year").is_some() {
                vec![DynamoIndex::global("by_genre", "genre", Some("year"))]
            } else {
                Vec::new()
            };
            Box::new(DynamoStorage::local(meta, indexes).expect("open dynamodb storage"))
        }
    }
}

/// Opens a storage holding the book dataset.
pub fn seeded_books(kind: BackendKind, batch_size: usize) -> Box<dyn Storage> {
    let storage = open(kind, books_meta(batch_size));
    for book in books() {
        storage.create(book.to_item()).expect("seed book");
    }
    storage
}
