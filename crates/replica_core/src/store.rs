//! The record store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::log::{self, Frame, LogOp};
use crate::record::{ContinuationToken, Record, RecordId};
use replica_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Counters describing a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records held, tombstones included.
    pub records: usize,
    /// Records with `pending_write` set.
    pub pending: usize,
    /// Records with the tombstone flag set.
    pub tombstones: usize,
    /// Continuation tokens held (0 or 1 in a healthy store).
    pub tokens: usize,
    /// Size of the record log in bytes.
    pub log_bytes: u64,
    /// Frames in the record log.
    pub frames: u64,
}

/// Outcome of [`RecordStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compaction {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Frames replaced by the snapshot.
    pub frames_before: u64,
}

/// Findings of [`RecordStore::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Frames that passed the CRC check.
    pub frames_checked: u64,
    /// Records checked against the dirty-flag invariant.
    pub records_checked: usize,
    /// Everything found wrong.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// Returns true if nothing was found wrong.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A persistent table of records with a pending-write index and a singleton
/// continuation token.
///
/// Every mutation is written to the record log as one frame and, with
/// [`StoreConfig::sync_on_write`], fsynced before the call returns. The
/// in-memory tables only change after the frame is on disk, so a failed call
/// leaves the handle exactly as it was.
///
/// A file-backed store holds an exclusive lock on its directory for as long
/// as the handle lives.
///
/// # Example
///
/// ```rust
/// use replica_core::{Record, RecordStore, ContinuationToken};
///
/// let mut store = RecordStore::open_in_memory();
/// store.stage(Record::new("A", "Note", b"cipher".to_vec()), 1_000).unwrap();
/// assert_eq!(store.get_pending().unwrap().len(), 1);
///
/// store.clear_pending(&"A".into()).unwrap();
/// store.set_token(ContinuationToken::new("t1")).unwrap();
/// assert!(store.get_pending().unwrap().is_empty());
/// ```
pub struct RecordStore {
    backend: Box<dyn StorageBackend>,
    dir: Option<StoreDir>,
    config: StoreConfig,
    records: BTreeMap<RecordId, Record>,
    pending: BTreeSet<RecordId>,
    tokens: BTreeSet<ContinuationToken>,
    frames: u64,
}

impl RecordStore {
    /// Opens the store at `path`, creating it if the config allows.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be opened or locked, or if the log is
    /// corrupted. A torn final frame is dropped, not reported.
    pub fn open(path: &Path, config: &StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config)?;
        let backend = FileBackend::open(&dir.log_path())?;
        let store = Self::load(Box::new(backend), Some(dir), config.clone())?;
        tracing::debug!(
            path = %path.display(),
            records = store.records.len(),
            pending = store.pending.len(),
            "opened record store"
        );
        Ok(store)
    }

    /// Opens an ephemeral store that lives only as long as the handle.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            backend: Box::new(InMemoryBackend::new()),
            dir: None,
            config: StoreConfig::default(),
            records: BTreeMap::new(),
            pending: BTreeSet::new(),
            tokens: BTreeSet::new(),
            frames: 0,
        }
    }

    /// Opens a store over an arbitrary backend, replaying whatever it holds.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        Self::load(backend, None, config)
    }

    /// Returns true if `path` already holds a store.
    #[must_use]
    pub fn exists(path: &Path) -> bool {
        StoreDir::is_store(path)
    }

    fn load(
        mut backend: Box<dyn StorageBackend>,
        dir: Option<StoreDir>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let bytes = backend.read_all()?;
        let scan = log::scan(&bytes)?;
        if scan.torn_bytes > 0 {
            tracing::warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes,
                "dropping torn frame at end of record log"
            );
            backend.truncate(scan.valid_len)?;
        }

        let mut store = Self {
            backend,
            dir,
            config,
            records: BTreeMap::new(),
            pending: BTreeSet::new(),
            tokens: BTreeSet::new(),
            frames: 0,
        };
        for frame in scan.frames {
            for op in frame.ops {
                store.apply(op);
            }
            store.frames += 1;
        }
        Ok(store)
    }

    /// Returns the store directory, or `None` for a store without one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- Reads ----

    /// Returns every record with `pending_write` set, ordered by id.
    ///
    /// An empty result is not an error.
    pub fn get_pending(&self) -> CoreResult<Vec<Record>> {
        self.pending
            .iter()
            .map(|id| {
                self.records
                    .get(id)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::invariant(format!("pending index names missing record {id}"))
                    })
            })
            .collect()
    }

    /// Returns the continuation token, or `None` if no cycle has completed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if more than one token is
    /// stored.
    pub fn get_token(&self) -> CoreResult<Option<ContinuationToken>> {
        match self.tokens.len() {
            0 => Ok(None),
            1 => Ok(self.tokens.iter().next().cloned()),
            n => Err(CoreError::invariant(format!(
                "{n} continuation tokens stored, expected at most one"
            ))),
        }
    }

    /// Returns the record with the given id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    /// Iterates over all records in id order, tombstones included.
    pub fn all(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Iterates over records that are not tombstoned.
    pub fn live(&self) -> impl Iterator<Item = &Record> {
        self.records.values().filter(|r| !r.deleted)
    }

    /// Iterates over tombstoned records.
    pub fn tombstones(&self) -> impl Iterator<Item = &Record> {
        self.records.values().filter(|r| r.deleted)
    }

    /// Returns the records with the given content type.
    pub fn find_by_content_type<'a>(
        &'a self,
        content_type: &'a str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .values()
            .filter(move |r| r.content_type == content_type)
    }

    /// Returns the number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records with `pending_write` set.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns counters describing the store.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        Ok(StoreStats {
            records: self.records.len(),
            pending: self.pending.len(),
            tombstones: self.tombstones().count(),
            tokens: self.tokens.len(),
            log_bytes: self.backend.size()?,
            frames: self.frames,
        })
    }

    // ---- Writes ----

    /// Inserts or replaces a record by id.
    ///
    /// Writing a record identical to the stored one is a no-op, so the call
    /// is idempotent. The pending index follows the record's `pending_write`.
    ///
    /// # Errors
    ///
    /// Rejects records with an empty id or with `pending_since` set on a
    /// clean record.
    pub fn upsert(&mut self, record: Record) -> CoreResult<()> {
        if record.id.as_str().is_empty() {
            return Err(CoreError::invalid_record(&record.id, "empty id"));
        }
        if !record.is_consistent() {
            return Err(CoreError::invalid_record(
                &record.id,
                "pending_since set on a record without pending_write",
            ));
        }
        if self.records.get(&record.id) == Some(&record) {
            return Ok(());
        }
        self.commit(vec![LogOp::PutRecord(record)])
    }

    /// Records a local edit: sets `pending_write` (keeping an earlier
    /// `pending_since`) and upserts.
    pub fn stage(&mut self, mut record: Record, now_ms: u64) -> CoreResult<()> {
        if let Some(existing) = self.records.get(&record.id) {
            if existing.pending_write && !record.pending_write {
                record.pending_write = true;
                record.pending_since = existing.pending_since;
            }
        }
        record.mark_pending(now_ms);
        self.upsert(record)
    }

    /// Clears `pending_write` and `pending_since` for `id`.
    ///
    /// Absent or already clean records are left alone without writing.
    pub fn clear_pending(&mut self, id: &RecordId) -> CoreResult<()> {
        match self.records.get(id) {
            Some(record) if record.pending_write => {
                self.commit(vec![LogOp::ClearPending(id.clone())])
            }
            _ => Ok(()),
        }
    }

    /// Replaces the continuation token.
    pub fn set_token(&mut self, token: ContinuationToken) -> CoreResult<()> {
        if self.tokens.len() == 1 && self.tokens.contains(&token) {
            return Ok(());
        }
        let mut ops: Vec<LogOp> = self
            .tokens
            .iter()
            .filter(|t| **t != token)
            .cloned()
            .map(LogOp::RemoveToken)
            .collect();
        if !self.tokens.contains(&token) {
            ops.push(LogOp::PutToken(token));
        }
        self.commit(ops)
    }

    /// Writes one frame, then applies it to the in-memory tables.
    fn commit(&mut self, ops: Vec<LogOp>) -> CoreResult<()> {
        let frame = log::encode_frame(&ops)?;
        let before = self.backend.size()?;

        let written = self.backend.append(&frame).and_then(|_| {
            if self.config.sync_on_write {
                self.backend.sync()
            } else {
                self.backend.flush()
            }
        });
        if let Err(e) = written {
            // A partial frame would hide every later frame from replay.
            if let Err(cleanup) = self.backend.truncate(before) {
                tracing::warn!(error = %cleanup, "failed to roll back partial frame");
            }
            return Err(e.into());
        }

        tracing::debug!(ops = ops.len(), bytes = frame.len(), "committed frame");
        for op in ops {
            self.apply(op);
        }
        self.frames += 1;
        Ok(())
    }

    fn apply(&mut self, op: LogOp) {
        match op {
            LogOp::PutRecord(record) => {
                if record.pending_write {
                    self.pending.insert(record.id.clone());
                } else {
                    self.pending.remove(&record.id);
                }
                self.records.insert(record.id.clone(), record);
            }
            LogOp::ClearPending(id) => {
                if let Some(record) = self.records.get_mut(&id) {
                    record.mark_clean();
                }
                self.pending.remove(&id);
            }
            LogOp::PutToken(token) => {
                self.tokens.insert(token);
            }
            LogOp::RemoveToken(token) => {
                self.tokens.remove(&token);
            }
        }
    }

    // ---- Maintenance ----

    /// Re-reads and decodes the whole record log.
    pub fn frames(&self) -> CoreResult<Vec<Frame>> {
        let bytes = self.backend.read_all()?;
        Ok(log::scan(&bytes)?.frames)
    }

    /// Checks frame integrity and the store invariants.
    ///
    /// Corruption in the log is reported as a problem, not as an error.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        let mut report = VerifyReport::default();

        let bytes = self.backend.read_all()?;
        match log::scan(&bytes) {
            Ok(scan) => {
                report.frames_checked = scan.frames.len() as u64;
                if scan.torn_bytes > 0 {
                    report.problems.push(format!(
                        "{} torn bytes after offset {}",
                        scan.torn_bytes, scan.valid_len
                    ));
                }
            }
            Err(e) => report.problems.push(e.to_string()),
        }

        for record in self.records.values() {
            report.records_checked += 1;
            if !record.is_consistent() {
                report.problems.push(format!(
                    "record {} is clean but has pending_since {}",
                    record.id, record.pending_since
                ));
            }
            if record.pending_write != self.pending.contains(&record.id) {
                report
                    .problems
                    .push(format!("pending index out of step for record {}", record.id));
            }
        }

        if self.tokens.len() > 1 {
            report.problems.push(format!(
                "{} continuation tokens stored, expected at most one",
                self.tokens.len()
            ));
        }

        Ok(report)
    }

    /// Rewrites the log as a single snapshot frame.
    ///
    /// File-backed stores write the snapshot to a temp file and rename it over
    /// the log, so a crash leaves either the old or the new log intact. Other
    /// stores build the snapshot in a fresh in-memory backend and swap it in;
    /// the old backend is left as it was.
    pub fn compact(&mut self) -> CoreResult<Compaction> {
        let bytes_before = self.backend.size()?;
        let frames_before = self.frames;

        let mut ops: Vec<LogOp> = self.records.values().cloned().map(LogOp::PutRecord).collect();
        ops.extend(self.tokens.iter().cloned().map(LogOp::PutToken));
        let snapshot = if ops.is_empty() {
            Vec::new()
        } else {
            log::encode_frame(&ops)?
        };

        match &self.dir {
            Some(dir) => {
                let mut temp = FileBackend::create_truncated(&dir.temp_log_path())?;
                temp.append(&snapshot)?;
                temp.sync()?;
                drop(temp);
                dir.install_temp_log()?;
                self.backend = Box::new(FileBackend::open(&dir.log_path())?);
            }
            None => {
                let mut fresh = InMemoryBackend::new();
                fresh.append(&snapshot)?;
                self.backend = Box::new(fresh);
            }
        }

        self.frames = u64::from(!snapshot.is_empty());
        let bytes_after = self.backend.size()?;
        tracing::info!(bytes_before, bytes_after, frames_before, "compacted record log");
        Ok(Compaction {
            bytes_before,
            bytes_after,
            frames_before,
        })
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path())
            .field("records", &self.records.len())
            .field("pending", &self.pending.len())
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, body: &str) -> Record {
        Record::new(id, "Note", body.as_bytes().to_vec())
    }

    #[test]
    fn empty_store_has_no_pending_and_no_token() {
        let store = RecordStore::open_in_memory();
        assert!(store.get_pending().unwrap().is_empty());
        assert_eq!(store.get_token().unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut store = RecordStore::open_in_memory();
        store.upsert(note("A", "v1")).unwrap();
        store.upsert(note("A", "v2")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"A".into()).unwrap().content, b"v2");
    }

    #[test]
    fn identical_upsert_writes_nothing() {
        let mut store = RecordStore::open_in_memory();
        store.upsert(note("A", "v1")).unwrap();
        let before = store.stats().unwrap();

        store.upsert(note("A", "v1")).unwrap();
        assert_eq!(store.stats().unwrap(), before);
    }

    #[test]
    fn upsert_rejects_inconsistent_flags() {
        let mut store = RecordStore::open_in_memory();
        let mut record = note("A", "v1");
        record.pending_since = 7;

        let err = store.upsert(record).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_rejects_empty_id() {
        let mut store = RecordStore::open_in_memory();
        assert!(store.upsert(note("", "x")).is_err());
    }

    #[test]
    fn stage_then_clear_pending() {
        let mut store = RecordStore::open_in_memory();
        store.stage(note("A", "draft"), 1_000).unwrap();

        let pending = store.get_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pending_since, 1_000);

        store.clear_pending(&"A".into()).unwrap();
        let record = store.get(&"A".into()).unwrap();
        assert!(!record.pending_write);
        assert_eq!(record.pending_since, 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn restaging_keeps_first_pending_since() {
        let mut store = RecordStore::open_in_memory();
        store.stage(note("A", "draft 1"), 1_000).unwrap();
        store.stage(note("A", "draft 2"), 5_000).unwrap();

        let record = store.get(&"A".into()).unwrap();
        assert_eq!(record.content, b"draft 2");
        assert_eq!(record.pending_since, 1_000);
    }

    #[test]
    fn clear_pending_on_absent_id_is_noop() {
        let mut store = RecordStore::open_in_memory();
        store.clear_pending(&"missing".into()).unwrap();
        assert_eq!(store.stats().unwrap().frames, 0);
    }

    #[test]
    fn upserting_clean_copy_drops_from_pending_index() {
        let mut store = RecordStore::open_in_memory();
        store.stage(note("A", "draft"), 1).unwrap();
        store.upsert(note("A", "remote")).unwrap();
        assert!(store.get_pending().unwrap().is_empty());
    }

    #[test]
    fn set_token_keeps_exactly_one() {
        let mut store = RecordStore::open_in_memory();
        store.set_token(ContinuationToken::new("t1")).unwrap();
        store.set_token(ContinuationToken::new("t2")).unwrap();
        store.set_token(ContinuationToken::new("t2")).unwrap();

        assert_eq!(store.get_token().unwrap(), Some(ContinuationToken::new("t2")));
        assert_eq!(store.stats().unwrap().tokens, 1);
    }

    #[test]
    fn two_stored_tokens_are_an_invariant_violation() {
        let frame = log::encode_frame(&[
            LogOp::PutToken(ContinuationToken::new("t1")),
            LogOp::PutToken(ContinuationToken::new("t2")),
        ])
        .unwrap();
        let backend = InMemoryBackend::with_data(frame);
        let store = RecordStore::with_backend(Box::new(backend), StoreConfig::default()).unwrap();

        let err = store.get_token().unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));
        assert!(!store.verify().unwrap().is_ok());
    }

    #[test]
    fn failed_write_leaves_handle_unchanged() {
        let backend = InMemoryBackend::new();
        let mut store =
            RecordStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        store.upsert(note("A", "v1")).unwrap();
        let bytes = backend.data();

        backend.fail_after(0);
        assert!(store.upsert(note("B", "v1")).is_err());
        assert!(store.set_token(ContinuationToken::new("t")).is_err());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_token().unwrap(), None);
        assert_eq!(backend.data(), bytes);
    }

    #[test]
    fn queries_by_content_type_and_tombstone() {
        let mut store = RecordStore::open_in_memory();
        store.upsert(note("A", "x")).unwrap();
        store
            .upsert(Record::new("B", "Tag", b"y".to_vec()).with_deleted(true))
            .unwrap();
        store.upsert(note("C", "z").with_deleted(true)).unwrap();

        let notes: Vec<_> = store.find_by_content_type("Note").map(|r| r.id.as_str()).collect();
        assert_eq!(notes, ["A", "C"]);
        assert_eq!(store.tombstones().count(), 2);
        assert_eq!(store.live().count(), 1);
        assert_eq!(store.all().count(), 3);
    }

    #[test]
    fn in_memory_compaction_preserves_state() {
        let mut store = RecordStore::open_in_memory();
        for i in 0..5 {
            store.upsert(note("A", &format!("v{i}"))).unwrap();
        }
        store.stage(note("B", "draft"), 9).unwrap();
        store.set_token(ContinuationToken::new("t1")).unwrap();

        let outcome = store.compact().unwrap();
        assert!(outcome.bytes_after < outcome.bytes_before);
        assert_eq!(outcome.frames_before, 7);
        assert_eq!(store.frames().unwrap().len(), 1);
        assert_eq!(store.get_token().unwrap(), Some(ContinuationToken::new("t1")));
        assert_eq!(store.get_pending().unwrap()[0].id, RecordId::new("B"));
    }

    #[test]
    fn compaction_leaves_failing_backend_untouched() {
        let backend = InMemoryBackend::new();
        let mut store =
            RecordStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        store.upsert(note("A", "v1")).unwrap();
        store.upsert(note("A", "v2")).unwrap();
        store.stage(note("B", "draft"), 4).unwrap();
        let history = backend.data();

        backend.fail_after(0);
        store.compact().unwrap();

        assert_eq!(backend.data(), history);
        assert_eq!(store.frames().unwrap().len(), 1);
        assert_eq!(store.get(&"A".into()).unwrap().content, b"v2");
        assert_eq!(store.pending_count(), 1);

        store.upsert(note("C", "after")).unwrap();
        assert_eq!(store.frames().unwrap().len(), 2);
    }

    #[test]
    fn verify_passes_on_healthy_store() {
        let mut store = RecordStore::open_in_memory();
        store.stage(note("A", "x"), 3).unwrap();
        store.set_token(ContinuationToken::new("t")).unwrap();

        let report = store.verify().unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.frames_checked, 2);
        assert_eq!(report.records_checked, 1);
    }
}
