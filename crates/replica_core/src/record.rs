//! Records and the continuation token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier of a record.
///
/// Assigned by the remote service, or by the application when a record is
/// created locally before it has ever been pushed. It never changes for the
/// lifetime of the record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (UUID v4) identifier for a locally created record.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The remote service's cursor for "everything already pulled".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Wraps a token returned by the remote service.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A locally cached encrypted record.
///
/// `content`, `content_type` and `enc_item_key` are opaque to this crate.
/// `created_at` and `updated_at` are ordering hints supplied by the remote or
/// the application and are never parsed.
///
/// `pending_write` and `pending_since` are local-only: they say the record has
/// edits the remote has not acknowledged, and since when. A clean record has
/// `pending_since == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier.
    pub id: RecordId,
    /// Encrypted content.
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
    /// Content type tag.
    pub content_type: String,
    /// Encrypted item key.
    #[serde(with = "serde_bytes")]
    pub enc_item_key: Vec<u8>,
    /// Tombstone flag. Deleted records are kept, never removed.
    pub deleted: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Local edits not yet acknowledged by the remote.
    pub pending_write: bool,
    /// Unix milliseconds when `pending_write` was set, 0 when clean.
    pub pending_since: u64,
}

impl Record {
    /// Creates a clean record with empty key material and timestamps.
    pub fn new(
        id: impl Into<RecordId>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            content_type: content_type.into(),
            enc_item_key: Vec::new(),
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
            pending_write: false,
            pending_since: 0,
        }
    }

    /// Sets the encrypted item key.
    #[must_use]
    pub fn with_enc_item_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.enc_item_key = key.into();
        self
    }

    /// Sets both timestamps.
    #[must_use]
    pub fn with_timestamps(
        mut self,
        created_at: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        self.created_at = created_at.into();
        self.updated_at = updated_at.into();
        self
    }

    /// Sets the tombstone flag.
    #[must_use]
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// Marks the record as pending since `now_ms`.
    ///
    /// A record that is already pending keeps its original `pending_since`.
    pub fn mark_pending(&mut self, now_ms: u64) {
        if !self.pending_write {
            self.pending_write = true;
            self.pending_since = now_ms;
        }
    }

    /// Clears the pending flag and its timestamp.
    pub fn mark_clean(&mut self) {
        self.pending_write = false;
        self.pending_since = 0;
    }

    /// Returns false if the local flags contradict each other.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.pending_write || self.pending_since == 0
    }

    /// Compares everything except the local-only flags.
    #[must_use]
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id
            && self.content == other.content
            && self.content_type == other.content_type
            && self.enc_item_key == other.enc_item_key
            && self.deleted == other.deleted
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }
}

/// Current wall-clock time in Unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
