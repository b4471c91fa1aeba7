//! The remote exchange abstraction.

use crate::error::{RemoteErrorKind, SyncError, SyncResult};
use parking_lot::Mutex;
use replica_sync_protocol::{ExchangeRequest, ExchangeResponse, Session};
use std::collections::VecDeque;
use std::sync::Arc;

/// Performs the single network round trip of a reconciliation cycle.
///
/// Implementations own retry and timeout policy. The reconciler calls
/// `exchange` exactly once per cycle and treats any error, cancellation
/// included, as "nothing happened remotely".
pub trait RemoteExchange: Send + Sync {
    /// Pushes `request.items` and pulls everything after `request.cursor`.
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse>;
}

impl<E: RemoteExchange + ?Sized> RemoteExchange for &E {
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        (**self).exchange(session, request)
    }
}

impl<E: RemoteExchange + ?Sized> RemoteExchange for Arc<E> {
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        (**self).exchange(session, request)
    }
}

impl<E: RemoteExchange + ?Sized> RemoteExchange for Box<E> {
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        (**self).exchange(session, request)
    }
}

type Scripted = Result<ExchangeResponse, (RemoteErrorKind, String)>;

/// An exchange that replays scripted outcomes in order and records every
/// request it receives.
#[derive(Debug, Default)]
pub struct MockExchange {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ExchangeRequest>>,
}

impl MockExchange {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn respond(&self, response: ExchangeResponse) -> &Self {
        self.script.lock().push_back(Ok(response));
        self
    }

    /// Queues a failure.
    pub fn fail(&self, kind: RemoteErrorKind, message: impl Into<String>) -> &Self {
        self.script.lock().push_back(Err((kind, message.into())));
        self
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<ExchangeRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<ExchangeRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of exchanges attempted.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl RemoteExchange for MockExchange {
    fn exchange(
        &self,
        _session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err((kind, message))) => Err(SyncError::remote(kind, message)),
            None => Err(SyncError::remote(
                RemoteErrorKind::Protocol,
                "no mock exchange response scripted",
            )),
        }
    }
}
