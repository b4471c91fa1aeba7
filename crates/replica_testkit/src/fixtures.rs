//! Test fixtures and store helpers.

use replica_core::{Record, RecordStore, StoreConfig};
use replica_storage::InMemoryBackend;
use replica_sync_protocol::Session;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file-backed store in a temporary directory.
///
/// The directory outlives the handle, so a test can [`reopen`](Self::reopen)
/// the store or read its files after dropping it.
pub struct TempStore {
    /// The store handle.
    pub store: RecordStore,
    dir: TempDir,
}

impl TempStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = RecordStore::open(&dir.path().join("store"), &StoreConfig::default())
            .expect("Failed to open temp store");
        Self { store, dir }
    }

    /// Returns the store directory.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    /// Returns the record log path.
    pub fn log_path(&self) -> PathBuf {
        self.path().join("records.log")
    }

    /// Returns the raw bytes of the record log.
    pub fn log_bytes(&self) -> Vec<u8> {
        std::fs::read(self.log_path()).unwrap_or_default()
    }

    /// Drops the handle and opens the store again.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = RecordStore::open(&dir.path().join("store"), &StoreConfig::default())
            .expect("Failed to reopen temp store");
        Self { store, dir }
    }

    /// Drops the handle and returns the directory, keeping it alive.
    pub fn into_dir(self) -> TempDir {
        self.dir
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempStore {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TempStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Opens an in-memory store and returns a clone of its backend for
/// inspection and fault injection.
pub fn observed_store() -> (RecordStore, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    let store = RecordStore::with_backend(Box::new(backend.clone()), StoreConfig::default())
        .expect("Failed to open in-memory store");
    (store, backend)
}

/// Runs `f` against a fresh file-backed store and its directory.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&mut RecordStore, &Path) -> R,
{
    let mut temp = TempStore::new();
    let path = temp.path();
    f(&mut temp.store, &path)
}

/// A clean `Note` record.
pub fn note(id: &str, body: &str) -> Record {
    Record::new(id, "Note", body.as_bytes().to_vec())
        .with_enc_item_key(format!("key-{id}").into_bytes())
        .with_timestamps("2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z")
}

/// A `Note` record with `pending_write` set since `since_ms`.
pub fn pending_note(id: &str, body: &str, since_ms: u64) -> Record {
    let mut record = note(id, body);
    record.mark_pending(since_ms);
    record
}

/// A session whose validity is fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct TestSession {
    valid: bool,
}

impl TestSession {
    /// A session that passes validation.
    pub fn valid() -> Self {
        Self { valid: true }
    }

    /// A session that fails validation.
    pub fn invalid() -> Self {
        Self { valid: false }
    }
}

impl Session for TestSession {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn authorization(&self) -> Option<String> {
        self.valid.then(|| "Bearer test".to_string())
    }
}

/// Store scenario helpers.
pub mod scenarios {
    use super::*;

    /// An in-memory store holding `clean` synced notes and `pending` local
    /// edits, with ids `clean-N` and `pending-N`.
    pub fn mixed_store(clean: usize, pending: usize) -> RecordStore {
        let mut store = RecordStore::open_in_memory();
        for i in 0..clean {
            store
                .upsert(note(&format!("clean-{i}"), "synced"))
                .expect("Failed to upsert");
        }
        for i in 0..pending {
            store
                .stage(note(&format!("pending-{i}"), "draft"), 1_000 + i as u64)
                .expect("Failed to stage");
        }
        store
    }
}
