//! Core value types for the storage layer.
//!
//! - [`Item`] - the externally shaped record every storage reads and writes
//! - [`Page`], [`PageCursor`] - paginated results and the shared cursor codec
//! - [`Edit`], [`EditResult`] - bulk edit requests and their per-edit outcome
//! - [`CacheHeader`] - response-level cache metadata
//!
//! # Pagination
//!
//! ```
//! use persisty_storage::types::PageCursor;
//!
//! let cursor = PageCursor::offset(20, Some("abc".to_string()));
//! let encoded = cursor.encode();
//!
//! let decoded = PageCursor::decode_for(&encoded, "books", Some("abc")).unwrap();
//! assert_eq!(decoded.offset_value(), Some(20));
//! ```

mod cache_header;
mod edit;
mod item;
mod pagination;

pub use cache_header::CacheHeader;
pub(crate) use cache_header::hex;
pub use edit::{Edit, EditResult};
pub use item::{Item, value_kind};
pub use pagination::{CursorPosition, Page, PageCursor};
