//! The remote representation of a record.

use replica_core::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// A record as sent to and received from the remote service.
///
/// Carries every field of [`Record`] except the local-only dirty flag and its
/// timestamp, which never leave the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
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
    /// Tombstone flag.
    pub deleted: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl WireRecord {
    /// Converts into a clean local record.
    #[must_use]
    pub fn into_record(self) -> Record {
        Record {
            id: self.id,
            content: self.content,
            content_type: self.content_type,
            enc_item_key: self.enc_item_key,
            deleted: self.deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
            pending_write: false,
            pending_since: 0,
        }
    }
}

impl From<&Record> for WireRecord {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            content: record.content.clone(),
            content_type: record.content_type.clone(),
            enc_item_key: record.enc_item_key.clone(),
            deleted: record.deleted,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }
}

impl From<Record> for WireRecord {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            content: record.content,
            content_type: record.content_type,
            enc_item_key: record.enc_item_key,
            deleted: record.deleted,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_flags_are_not_carried() {
        let mut record = Record::new("A", "Note", b"cipher".to_vec())
            .with_enc_item_key(vec![9; 4])
            .with_timestamps("2024-01-01", "2024-01-02");
        record.mark_pending(1_234);

        let wire = WireRecord::from(&record);
        let back = wire.into_record();

        assert!(!back.pending_write);
        assert_eq!(back.pending_since, 0);
        assert!(back.same_content(&record));
    }

    #[test]
    fn owned_and_borrowed_conversions_agree() {
        let record = Record::new("B", "Tag", b"x".to_vec()).with_deleted(true);
        assert_eq!(WireRecord::from(&record), WireRecord::from(record));
    }
}
