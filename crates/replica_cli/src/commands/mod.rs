//! CLI command implementations.

pub mod compact;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use replica_core::{CoreResult, RecordStore, StoreConfig};
use std::path::Path;

/// Opens an existing store. Maintenance commands never create one.
pub fn open_existing(path: &Path) -> CoreResult<RecordStore> {
    RecordStore::open(path, &StoreConfig::new().create_if_missing(false))
}
