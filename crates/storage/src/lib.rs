//! Persisty Storage
//!
//! A backend-agnostic storage core. Every storage, whether an in-process map,
//! a SQLite table or a DynamoDB table, exposes the same keyed CRUD, search,
//! count and cursor pagination contract, and returns the same results for
//! the same filter and ordering. Backends only differ in how much of a search
//! they push down to the database.
//!
//! # Features
//!
//! - **One contract**: [`Storage`] over JSON object items
//! - **Filter translation**: filters become SQL `WHERE` clauses or DynamoDB
//!   key conditions and filter expressions, re-checked client-side wherever
//!   the translation is partial
//! - **Opaque cursors**: page keys bound to the search that issued them
//! - **Wrappers**: access control, dataset filters, timestamps, schema
//!   validation, TTL caching and logging, stackable in any order
//!
//! # Backend Features
//!
//! - `sqlite` (default) - SQLite through an r2d2 pool, in-memory or file
//! - `dynamodb` (default) - DynamoDB translation with an in-process emulator
//! - `dynamodb-aws` - the AWS SDK client for real tables
//!
//! # Architecture
//!
//! - [`error`] - error taxonomy
//! - [`types`] - items, pages, cursors, edits and cache headers
//! - [`filter`] - filters, comparators and searches
//! - [`meta`] - attributes, keys, capabilities and cache policies
//! - [`core`] - the [`Storage`] trait and its default behaviour
//! - [`backends`] - memory, SQLite and DynamoDB implementations
//! - [`wrappers`] - cross-cutting policies layered over any storage
//! - [`registry`] - explicit name to storage lookup
//! - [`config`] - serde configuration for whole storages
//!
//! # Quick Start
//!
//! ```
//! use persisty_storage::backends::memory::MemStorage;
//! use persisty_storage::filter::{SearchFilter, attr};
//! use persisty_storage::meta::{Attr, StorageMeta};
//! use persisty_storage::Storage;
//! use serde_json::json;
//!
//! let meta = StorageMeta::builder("books")
//!     .attr(Attr::string("id"))
//!     .attr(Attr::int("year"))
//!     .batch_size(1)
//!     .build()
//!     .unwrap();
//! let storage = MemStorage::new(meta);
//! for (id, year) in [("a", 1960), ("b", 1970), ("c", 1980)] {
//!     storage.create(json!({"id": id, "year": year}).as_object().cloned().unwrap()).unwrap();
//! }
//!
//! let search = SearchFilter::new(attr("year").gte(1970));
//! let first = storage.paged_search(&search, None, Some(1)).unwrap();
//! assert_eq!(first.items[0]["id"], json!("b"));
//!
//! let second = storage
//!     .paged_search(&search, first.next_page_key.as_deref(), Some(1))
//!     .unwrap();
//! assert_eq!(second.items[0]["id"], json!("c"));
//! assert!(second.next_page_key.is_none());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod filter;
pub mod meta;
pub mod registry;
pub mod types;
pub mod wrappers;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use filter::{Comparator, Filter, SearchFilter, attr};
pub use meta::{AccessControl, Attr, KeyConfig, StorageMeta};
pub use types::{Edit, EditResult, Item, Page};

// Re-export the core trait and composition helpers
pub use config::StorageConfig;
pub use core::Storage;
pub use registry::StorageRegistry;
pub use wrappers::StorageExt;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
