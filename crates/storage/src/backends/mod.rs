//! Storage backends.
//!
//! Each backend implements [`Storage`](crate::core::Storage) and produces the
//! same results as [`memory::MemStorage`] for the same filter, comparator and
//! dataset.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
