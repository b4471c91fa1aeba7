//! Reconciliation and bootstrap.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::exchange::RemoteExchange;
use parking_lot::RwLock;
use replica_core::{ContinuationToken, CoreError, Record, RecordId, RecordStore};
use replica_sync_protocol::{ExchangeRequest, ExchangeResponse, Session, WireRecord};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Records received from the remote, as stored locally.
    pub pulled: Vec<Record>,
    /// Ids the remote stored durably, now clean locally.
    pub acknowledged: Vec<RecordId>,
    /// Ids the remote refused, still pending locally.
    pub unacknowledged: Vec<RecordId>,
    /// Number of records pushed.
    pub pushed: usize,
    /// Token stored at the end of the cycle.
    pub token: ContinuationToken,
    /// Wall time of the cycle.
    pub duration: Duration,
}

/// Counters kept across cycles for diagnostics.
///
/// Nothing here feeds back into reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Cycles that completed successfully.
    pub cycles_completed: u64,
    /// Bootstraps that completed successfully.
    pub bootstraps_completed: u64,
    /// Cycles or bootstraps that failed.
    pub failures: u64,
    /// Records pushed.
    pub records_pushed: u64,
    /// Records acknowledged.
    pub records_acknowledged: u64,
    /// Records refused by the remote.
    pub records_unacknowledged: u64,
    /// Records pulled.
    pub records_pulled: u64,
    /// Duration of the last successful cycle.
    pub last_duration: Option<Duration>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives reconciliation cycles between a [`RecordStore`] and a remote.
///
/// The reconciler holds no per-store state. A cycle needs exclusive access
/// to the store handle, so cycles on one handle never overlap; cycles on
/// different handles of the same directory are prevented by the store's
/// directory lock.
///
/// # Example
///
/// ```rust
/// use replica_core::{Record, RecordStore};
/// use replica_sync_engine::{MemoryRemote, Reconciler, SyncConfig};
/// use replica_sync_protocol::StaticSession;
///
/// let reconciler = Reconciler::new(SyncConfig::default(), MemoryRemote::new());
/// let session = StaticSession::new("token");
/// let mut store = RecordStore::open_in_memory();
/// store.stage(Record::new("A", "Note", b"cipher".to_vec()), 1_000).unwrap();
///
/// let result = reconciler.reconcile(&session, &mut store).unwrap();
/// assert_eq!(result.acknowledged.len(), 1);
/// assert_eq!(store.pending_count(), 0);
/// ```
pub struct Reconciler<E: RemoteExchange> {
    config: SyncConfig,
    exchange: E,
    stats: RwLock<ReconcileStats>,
}

impl<E: RemoteExchange> Reconciler<E> {
    /// Creates a reconciler talking to `exchange`.
    pub fn new(config: SyncConfig, exchange: E) -> Self {
        Self {
            config,
            exchange,
            stats: RwLock::new(ReconcileStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the exchange.
    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ReconcileStats {
        self.stats.read().clone()
    }

    /// Runs one push-and-pull cycle against `store`.
    ///
    /// The pending records are pushed with the stored cursor in a single
    /// exchange. On success, acknowledged records are marked clean, pulled
    /// records are written, and the new token replaces the old one, in that
    /// order.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SessionInvalid`] before anything else is looked at
    /// - [`SyncError::Configuration`] if the config fails validation
    /// - [`SyncError::Remote`] if the exchange fails; the store is untouched
    /// - [`SyncError::Store`] if reading or applying fails; the store may be
    ///   partially updated and running the cycle again converges
    pub fn reconcile(
        &self,
        session: &dyn Session,
        store: &mut RecordStore,
    ) -> SyncResult<ReconcileResult> {
        let started = Instant::now();
        let result = self.run_cycle(session, store, started);
        match &result {
            Ok(outcome) => {
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.records_pushed += outcome.pushed as u64;
                stats.records_acknowledged += outcome.acknowledged.len() as u64;
                stats.records_unacknowledged += outcome.unacknowledged.len() as u64;
                stats.records_pulled += outcome.pulled.len() as u64;
                stats.last_duration = Some(outcome.duration);
                stats.last_error = None;
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    fn run_cycle(
        &self,
        session: &dyn Session,
        store: &mut RecordStore,
        started: Instant,
    ) -> SyncResult<ReconcileResult> {
        if !session.is_valid() {
            return Err(SyncError::SessionInvalid);
        }
        self.config.validate()?;

        let pending = store.get_pending()?;
        let cursor = store.get_token()?;
        if cursor.is_none() {
            tracing::debug!("no continuation token, pulling from empty cursor");
        }

        let pushed: BTreeSet<RecordId> = pending.iter().map(|r| r.id.clone()).collect();
        let items: Vec<WireRecord> = pending.iter().map(WireRecord::from).collect();
        let request = ExchangeRequest::new(cursor, items);

        let response = self.exchange.exchange(session, &request)?;
        let applied = apply_response(store, &pushed, response)?;

        let result = ReconcileResult {
            pulled: applied.pulled,
            acknowledged: applied.acknowledged,
            unacknowledged: applied.unacknowledged,
            pushed: pushed.len(),
            token: applied.token,
            duration: started.elapsed(),
        };
        tracing::info!(
            pushed = result.pushed,
            acknowledged = result.acknowledged.len(),
            unacknowledged = result.unacknowledged.len(),
            pulled = result.pulled.len(),
            elapsed_ms = result.duration.as_millis() as u64,
            "reconcile cycle complete"
        );
        Ok(result)
    }

    /// Creates or reopens the store at `location` and fills it with one full
    /// pull.
    ///
    /// Running bootstrap on a location that already holds a store upserts the
    /// pulled records by id, so nothing is duplicated, and replaces the token.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SessionInvalid`] before anything else is looked at
    /// - [`SyncError::Configuration`] for an empty location, a location that
    ///   is not a directory, or an invalid config
    /// - [`SyncError::Remote`] if the pull fails; the store directory is left
    ///   created and possibly empty
    /// - [`SyncError::Store`] if opening or writing the store fails
    pub fn bootstrap(&self, session: &dyn Session, location: &Path) -> SyncResult<RecordStore> {
        let result = self.run_bootstrap(session, location);
        match &result {
            Ok(_) => {
                let mut stats = self.stats.write();
                stats.bootstraps_completed += 1;
                stats.last_error = None;
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    fn run_bootstrap(&self, session: &dyn Session, location: &Path) -> SyncResult<RecordStore> {
        if !session.is_valid() {
            return Err(SyncError::SessionInvalid);
        }
        if location.as_os_str().is_empty() {
            return Err(SyncError::configuration("store location is empty"));
        }
        self.config.validate()?;

        let mut store = RecordStore::open(location, &self.config.store).map_err(|e| match e {
            CoreError::NotADirectory { path } => SyncError::configuration(format!(
                "store location {} is not a directory",
                path.display()
            )),
            other => SyncError::Store(other),
        })?;

        let response = self.exchange.exchange(session, &ExchangeRequest::full_pull())?;
        let applied = apply_response(&mut store, &BTreeSet::new(), response)?;

        tracing::info!(
            path = %location.display(),
            pulled = applied.pulled.len(),
            records = store.len(),
            "bootstrap complete"
        );
        {
            let mut stats = self.stats.write();
            stats.records_pulled += applied.pulled.len() as u64;
        }
        Ok(store)
    }

    fn record_failure(&self, error: &SyncError) {
        tracing::warn!(error = %error, kind = ?error.kind(), "sync failed");
        let mut stats = self.stats.write();
        stats.failures += 1;
        stats.last_error = Some(error.to_string());
    }
}

struct Applied {
    pulled: Vec<Record>,
    acknowledged: Vec<RecordId>,
    unacknowledged: Vec<RecordId>,
    token: ContinuationToken,
}

/// Applies an exchange response: clear acknowledged, write pulled, replace
/// the token. Every step is idempotent, so a response applied twice leaves
/// the same state as one applied once.
fn apply_response(
    store: &mut RecordStore,
    pushed: &BTreeSet<RecordId>,
    response: ExchangeResponse,
) -> SyncResult<Applied> {
    let ExchangeResponse {
        pulled,
        acknowledged,
        unacknowledged,
        token,
        ..
    } = response;

    let mut cleared = Vec::with_capacity(acknowledged.len());
    for id in acknowledged {
        if !pushed.contains(&id) {
            tracing::warn!(id = %id, "remote acknowledged a record that was not pushed");
            continue;
        }
        store.clear_pending(&id)?;
        cleared.push(id);
    }

    for id in &unacknowledged {
        if pushed.contains(id) {
            tracing::debug!(id = %id, "remote refused record, left pending");
        } else {
            tracing::warn!(id = %id, "remote refused a record that was not pushed");
        }
    }

    let mut stored = Vec::with_capacity(pulled.len());
    for wire in pulled {
        let mut record = wire.into_record();
        if let Some(local) = store.get(&record.id) {
            if local.pending_write {
                // Remote content wins; the flag keeps the local edit queued.
                tracing::warn!(id = %record.id, "pull overwrote a pending local edit");
                record.pending_write = true;
                record.pending_since = local.pending_since;
            }
        }
        store.upsert(record.clone())?;
        stored.push(record);
    }

    store.set_token(token.clone())?;

    Ok(Applied {
        pulled: stored,
        acknowledged: cleared,
        unacknowledged,
        token,
    })
}
