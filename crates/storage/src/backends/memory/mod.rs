//! In-memory backend.
//!
//! Items live in an ordered map keyed by their storage key. Every search
//! loads the values, applies [`Filter::matches`](crate::filter::Filter::matches)
//! and a stable sort, so this backend defines the reference results the SQL
//! and DynamoDB backends are checked against.
//!
//! # Example
//!
//! ```
//! use persisty_storage::backends::memory::MemStorage;
//! use persisty_storage::core::Storage;
//! use persisty_storage::filter::{SearchFilter, attr};
//! use persisty_storage::meta::{Attr, StorageMeta};
//! use serde_json::json;
//!
//! let meta = StorageMeta::builder("books")
//!     .attr(Attr::string("id"))
//!     .attr(Attr::int("year"))
//!     .build()
//!     .unwrap();
//! let storage = MemStorage::new(meta);
//! for (id, year) in [("a", 1960), ("b", 1970), ("c", 1980)] {
//!     let item = json!({"id": id, "year": year}).as_object().cloned().unwrap();
//!     storage.create(item).unwrap();
//! }
//!
//! let search = SearchFilter::new(attr("year").gte(1970));
//! let page = storage.paged_search(&search, None, Some(1)).unwrap();
//! assert_eq!(page.items[0]["id"], "b");
//! assert!(page.next_page_key.is_some());
//! ```

mod storage;

pub use storage::MemStorage;
