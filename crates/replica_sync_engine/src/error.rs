//! Error types for the sync engine.

use replica_core::CoreError;
use replica_sync_protocol::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// What went wrong on the remote side of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The service could not be reached.
    Network,
    /// The service refused the credentials.
    Auth,
    /// The service failed to process the request.
    Server,
    /// A message could not be encoded or decoded.
    Protocol,
    /// The exchange was cancelled before it completed.
    Cancelled,
    /// The exchange did not complete in time.
    Timeout,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::Server => "server",
            RemoteErrorKind::Protocol => "protocol",
            RemoteErrorKind::Cancelled => "cancelled",
            RemoteErrorKind::Timeout => "timeout",
        })
    }
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller misused the API.
    Configuration,
    /// The session failed validation.
    SessionInvalid,
    /// The exchange with the remote failed.
    Remote,
    /// Local persistence failed.
    Store,
}

/// Errors that can occur during reconciliation and bootstrap.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The call was made with arguments that can never work.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// The session failed validation. Nothing was sent or written.
    #[error("session invalid")]
    SessionInvalid,

    /// The exchange with the remote service failed.
    #[error("remote error ({kind}): {message}")]
    Remote {
        /// Failure category.
        kind: RemoteErrorKind,
        /// Error message.
        message: String,
    },

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] CoreError),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a remote error.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled() -> Self {
        Self::remote(RemoteErrorKind::Cancelled, "exchange cancelled")
    }

    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Configuration { .. } => ErrorKind::Configuration,
            SyncError::SessionInvalid => ErrorKind::SessionInvalid,
            SyncError::Remote { .. } => ErrorKind::Remote,
            SyncError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns the remote failure category, if this is a remote error.
    #[must_use]
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            SyncError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if running the same cycle again may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { kind, .. } => matches!(
                kind,
                RemoteErrorKind::Network
                    | RemoteErrorKind::Server
                    | RemoteErrorKind::Timeout
                    | RemoteErrorKind::Cancelled
            ),
            SyncError::Store(e) => matches!(
                e,
                CoreError::Io(_) | CoreError::Storage(_) | CoreError::StoreLocked
            ),
            SyncError::Configuration { .. } | SyncError::SessionInvalid => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        Self::remote(RemoteErrorKind::Protocol, e.to_string())
    }
}
