//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to truncate to a size larger than the store.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    TruncateBeyondEnd {
        /// The requested size.
        requested: u64,
        /// The current size.
        size: u64,
    },

    /// A write failed because a fault was injected into an in-memory backend.
    #[error("injected write fault")]
    InjectedFault,
}

impl StorageError {
    /// Returns true if the error came from the operating system.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}
