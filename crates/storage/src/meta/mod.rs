//! Storage metadata.
//!
//! A [`StorageMeta`] is resolved once, when a storage is registered, into an
//! ordered list of [`Attr`] descriptors plus the storage-wide policies:
//!
//! - [`KeyConfig`] - how keys are extracted and assigned
//! - [`AccessControl`] - which operations are permitted
//! - [`CacheControl`] - how cache headers are derived
//! - [`ItemSchema`] - create/update input schemas derived from the attributes

mod access;
mod attr;
mod cache_control;
mod key_config;
mod schema;
mod storage_meta;

pub use access::AccessControl;
pub use attr::{Attr, AttrGenerator, AttrSchema, AttrType};
pub use cache_control::CacheControl;
pub use key_config::KeyConfig;
pub use schema::ItemSchema;
pub use storage_meta::{StorageMeta, StorageMetaBuilder};
