//! An in-memory remote service.

use crate::error::{RemoteErrorKind, SyncError, SyncResult};
use crate::exchange::RemoteExchange;
use crate::http::{ExchangeHandler, HttpError};
use parking_lot::Mutex;
use replica_core::{ContinuationToken, RecordId};
use replica_sync_protocol::{ExchangeRequest, ExchangeResponse, Session, WireRecord};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct RemoteState {
    // id -> (change number, record)
    records: BTreeMap<RecordId, (u64, WireRecord)>,
    counter: u64,
    rejected: BTreeSet<RecordId>,
    fail_next: Option<RemoteErrorKind>,
    exchanges: u64,
}

/// An authoritative service held in memory.
///
/// Every accepted write bumps a change counter; the continuation token is the
/// counter as a decimal string, and a pull returns every record changed
/// after the cursor. Ids in the reject set come back as unacknowledged.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record as if another client had pushed it.
    pub fn put(&self, record: WireRecord) {
        let mut state = self.state.lock();
        state.counter += 1;
        let change = state.counter;
        state.records.insert(record.id.clone(), (change, record));
    }

    /// Returns the stored copy of a record.
    pub fn get(&self, id: &RecordId) -> Option<WireRecord> {
        self.state.lock().records.get(id).map(|(_, r)| r.clone())
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Returns the current change counter.
    pub fn counter(&self) -> u64 {
        self.state.lock().counter
    }

    /// Returns the number of exchanges served, failed ones included.
    pub fn exchanges(&self) -> u64 {
        self.state.lock().exchanges
    }

    /// Refuses pushes of `id` until [`accept`](Self::accept) is called.
    pub fn reject(&self, id: impl Into<RecordId>) {
        self.state.lock().rejected.insert(id.into());
    }

    /// Accepts pushes of `id` again.
    pub fn accept(&self, id: &RecordId) {
        self.state.lock().rejected.remove(id);
    }

    /// Makes the next exchange fail with `kind` before touching any state.
    pub fn fail_next(&self, kind: RemoteErrorKind) {
        self.state.lock().fail_next = Some(kind);
    }

    fn process(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        let mut state = self.state.lock();
        state.exchanges += 1;
        if let Some(kind) = state.fail_next.take() {
            return Err(SyncError::remote(kind, "injected remote failure"));
        }

        let cursor = match &request.cursor {
            None => 0,
            Some(token) => token.as_str().parse::<u64>().map_err(|_| {
                SyncError::remote(RemoteErrorKind::Protocol, format!("unknown cursor {token}"))
            })?,
        };

        // Pull window is computed before this request's writes land.
        let pulled: Vec<WireRecord> = state
            .records
            .values()
            .filter(|(change, _)| *change > cursor)
            .map(|(_, record)| record.clone())
            .collect();

        let mut acknowledged = Vec::new();
        let mut unacknowledged = Vec::new();
        for item in &request.items {
            if state.rejected.contains(&item.id) {
                unacknowledged.push(item.id.clone());
                continue;
            }
            state.counter += 1;
            let change = state.counter;
            state.records.insert(item.id.clone(), (change, item.clone()));
            acknowledged.push(item.id.clone());
        }

        Ok(ExchangeResponse {
            version: request.version,
            pulled,
            acknowledged,
            unacknowledged,
            token: ContinuationToken::new(state.counter.to_string()),
        })
    }
}

impl RemoteExchange for MemoryRemote {
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        if !session.is_valid() {
            return Err(SyncError::remote(RemoteErrorKind::Auth, "session rejected"));
        }
        self.process(request)
    }
}

impl ExchangeHandler for MemoryRemote {
    fn handle_post(
        &self,
        _path: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<u8>, HttpError> {
        if authorization.is_none() {
            return Err(HttpError::Status {
                code: 401,
                message: "missing authorization".into(),
            });
        }
        let request = ExchangeRequest::decode(body).map_err(|e| HttpError::Status {
            code: 400,
            message: e.to_string(),
        })?;

        let response = self.process(&request).map_err(|e| match e.remote_kind() {
            Some(RemoteErrorKind::Timeout) => HttpError::Timeout,
            Some(RemoteErrorKind::Network | RemoteErrorKind::Cancelled) => {
                HttpError::Connect(e.to_string())
            }
            Some(RemoteErrorKind::Auth) => HttpError::Status {
                code: 401,
                message: e.to_string(),
            },
            Some(RemoteErrorKind::Protocol) => HttpError::Status {
                code: 400,
                message: e.to_string(),
            },
            _ => HttpError::Status {
                code: 500,
                message: e.to_string(),
            },
        })?;

        response.encode().map_err(|e| HttpError::Status {
            code: 500,
            message: e.to_string(),
        })
    }
}
