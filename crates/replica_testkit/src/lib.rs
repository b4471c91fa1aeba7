//! # Replica Testkit
//!
//! Test utilities for Replica.
//!
//! This crate provides:
//! - Temporary on-disk stores and in-memory stores over an observable backend
//! - Record builders and canned sessions
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use replica_testkit::prelude::*;
//!
//! let mut temp = TempStore::new();
//! temp.store.stage(note("A", "draft"), 1_000).unwrap();
//! assert_eq!(temp.store.pending_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
