//! Test infrastructure for the storage layer.
//!
//! Fixtures, a backend harness that opens the same meta on every backend,
//! and assertion helpers over keys and pages.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
pub mod harness;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
pub use harness::*;
