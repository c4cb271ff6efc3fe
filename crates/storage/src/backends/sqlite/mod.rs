//! SQLite backend implementation.
//!
//! Each storage maps to one table whose columns are derived from the
//! storage's attributes. Filters become parameterized `WHERE` clauses and
//! comparators become `ORDER BY` terms; a filter the builder cannot express
//! exactly is reported as not fully handled and re-checked client-side.
//!
//! # Features
//!
//! - In-memory and file-based modes
//! - Column types derived from attribute types (`INTEGER`, `FLOAT`,
//!   `BOOLEAN`, `DATETIME`, `VARCHAR(n)`, `TEXT`)
//! - `AUTOINCREMENT` integer keys for sequence-generated key attributes
//! - Offset page keys with one row of look-ahead
//!
//! # Example
//!
//! ```
//! use persisty_storage::backends::sqlite::SqlStorage;
//! use persisty_storage::core::Storage;
//! use persisty_storage::filter::attr;
//! use persisty_storage::meta::{Attr, StorageMeta};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let meta = StorageMeta::builder("books")
//!     .attr(Attr::string("id"))
//!     .attr(Attr::int("year"))
//!     .build()?;
//! let storage = SqlStorage::in_memory(meta)?;
//!
//! let book = json!({"id": "b", "year": 1970}).as_object().cloned().unwrap();
//! storage.create(book)?;
//! assert_eq!(storage.count(&attr("year").gte(1970))?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "books" (
//!     "id" TEXT NOT NULL PRIMARY KEY,
//!     "year" INTEGER
//! );
//! ```

mod backend;
mod query_builder;
mod storage;
mod table;

pub use backend::SqlStorageConfig;
pub use query_builder::{QueryBuilder, SqlFragment, SqlParam, WhereClause, escape_like};
pub use storage::SqlStorage;
pub use table::{Column, Table, quote_ident};
