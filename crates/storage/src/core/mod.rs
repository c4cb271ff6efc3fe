//! Core storage trait and shared behaviour.
//!
//! - [`Storage`] - the uniform contract implemented by every backend and
//!   wrapper
//! - [`ItemIter`] - the lazy result sequence returned by `search`
//! - [`apply_edits`], [`require_all`] - building blocks for the default
//!   behaviour, reusable by backends that override part of it
//! - [`offset_page`], [`decode_offset`], [`look_ahead_page`] - offset cursor
//!   pagination with one item of look-ahead
//!
//! # Layering
//!
//! ```text
//! wrappers (access, filter, timestamp, validate, ttl cache, logging)
//!     └── Storage
//!             ├── MemStorage      (reference semantics)
//!             ├── SqlStorage      (WHERE / ORDER BY translation)
//!             └── DynamoStorage   (index selection, expressions)
//! ```
//!
//! Wrappers hold a single inner `Storage`; `Box<S>` and `Arc<S>` implement
//! `Storage` too, so stacks can be built from trait objects.

mod storage;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use storage::{
    ItemIter, Storage, apply_edits, decode_offset, look_ahead_page, offset_page, require_all,
};
