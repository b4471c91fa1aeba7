//! # Replica Storage
//!
//! Append-only byte stores underneath the Replica record store.
//!
//! Backends know nothing about records, frames or tokens. They hand out
//! bytes, append bytes, and make appended bytes durable. The record log
//! format lives entirely in `replica_core`.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - a single file, fsynced on request
//! - [`InMemoryBackend`] - a shared buffer with optional fault injection,
//!   used for ephemeral stores and for exercising partial-failure paths
//!
//! ## Example
//!
//! ```rust
//! use replica_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"frame-1").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"frame-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
