//! Property-based test generators using proptest.

use proptest::prelude::*;
use replica_core::{ContinuationToken, Record, RecordId};
use replica_sync_protocol::WireRecord;

/// Strategy for ids drawn from a small alphabet, so generated operations
/// collide on the same records often.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::string::string_regex("[a-e][0-3]?")
        .expect("Invalid regex")
        .prop_map(RecordId::new)
}

/// Strategy for content type tags.
pub fn content_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Note".to_string()),
        Just("Tag".to_string()),
        Just("SN|Component".to_string()),
    ]
}

/// Strategy for clean records.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        content_type_strategy(),
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..16),
        any::<bool>(),
    )
        .prop_map(|(id, content_type, content, key, deleted)| {
            Record::new(id, content_type, content)
                .with_enc_item_key(key)
                .with_deleted(deleted)
        })
}

/// Strategy for remote records.
pub fn wire_record_strategy() -> impl Strategy<Value = WireRecord> {
    record_strategy().prop_map(WireRecord::from)
}

/// Strategy for continuation tokens.
pub fn token_strategy() -> impl Strategy<Value = ContinuationToken> {
    prop::string::string_regex("t[0-9]{1,4}")
        .expect("Invalid regex")
        .prop_map(ContinuationToken::new)
}

/// One mutation against a record store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Upsert a clean record.
    Upsert(Record),
    /// Stage a local edit at the given time.
    Stage(Record, u64),
    /// Clear the pending flag.
    ClearPending(RecordId),
    /// Replace the continuation token.
    SetToken(ContinuationToken),
}

/// Strategy for a single store mutation.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => record_strategy().prop_map(StoreOp::Upsert),
        3 => (record_strategy(), 1u64..1_000_000).prop_map(|(r, t)| StoreOp::Stage(r, t)),
        2 => record_id_strategy().prop_map(StoreOp::ClearPending),
        1 => token_strategy().prop_map(StoreOp::SetToken),
    ]
}

/// Strategy for a sequence of store mutations.
pub fn store_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_records_are_clean(record in record_strategy()) {
            prop_assert!(!record.pending_write);
            prop_assert!(record.is_consistent());
            prop_assert!(!record.id.as_str().is_empty());
        }

        #[test]
        fn tokens_are_non_empty(token in token_strategy()) {
            prop_assert!(token.as_str().starts_with('t'));
        }
    }
}
