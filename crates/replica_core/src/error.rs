//! Error types for the record store.

use crate::record::RecordId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for record store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the record store.
///
/// An empty query result is never an error: "no pending records" is an empty
/// `Vec` and "no token yet" is `None`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] replica_storage::StorageError),

    /// I/O error outside the storage backend (directory, lock, rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A log frame could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The record log is damaged at the given offset.
    #[error("record log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Persisted state breaks a store invariant.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Which invariant was broken.
        message: String,
    },

    /// A record handed to the store is malformed.
    #[error("invalid record {id}: {message}")]
    InvalidRecord {
        /// Id of the offending record.
        id: RecordId,
        /// What is wrong with it.
        message: String,
    },

    /// Another handle holds the store directory lock.
    #[error("store locked: another handle has exclusive access")]
    StoreLocked,

    /// The store already exists and the config asked for a fresh one.
    #[error("store already exists: {}", path.display())]
    StoreExists {
        /// Store directory.
        path: PathBuf,
    },

    /// The store does not exist and the config forbids creating it.
    #[error("store does not exist: {}", path.display())]
    StoreMissing {
        /// Store directory.
        path: PathBuf,
    },

    /// The store location exists but is not a directory.
    #[error("store location is not a directory: {}", path.display())]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(id: &RecordId, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id: id.clone(),
            message: message.into(),
        }
    }

    /// Returns true if the error came from the disk rather than from the
    /// data or the caller.
    #[must_use]
    pub fn is_io(&self) -> bool {
        match self {
            CoreError::Io(_) => true,
            CoreError::Storage(e) => e.is_io(),
            _ => false,
        }
    }
}
