//! # Replica Sync Engine
//!
//! Reconciliation between a local [`RecordStore`](replica_core::RecordStore)
//! and a remote service.
//!
//! This crate provides:
//! - [`Reconciler::reconcile`], one push-and-pull cycle over an open store
//! - [`Reconciler::bootstrap`], creating and filling a store from a full pull
//! - the [`RemoteExchange`] abstraction with mock, in-memory and HTTP
//!   implementations
//!
//! ## Cycle
//!
//! 1. Read pending records and the continuation token
//! 2. Exchange once: push the pending records, pull changes after the token
//! 3. Clear the pending flag of acknowledged records
//! 4. Write pulled records
//! 5. Replace the token
//!
//! ## Key Invariants
//!
//! - Exactly one exchange per cycle, never retried internally
//! - A failed or cancelled exchange leaves the store untouched
//! - Refused records stay pending and are pushed again next cycle
//! - A pull never clears the pending flag of an unacknowledged edit
//! - The store holds at most one continuation token

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod exchange;
mod http;
mod reconciler;
mod remote;

pub use config::SyncConfig;
pub use error::{ErrorKind, RemoteErrorKind, SyncError, SyncResult};
pub use exchange::{MockExchange, RemoteExchange};
pub use http::{ExchangeHandler, HttpClient, HttpError, HttpExchange, HttpRequest, LoopbackClient};
pub use reconciler::{ReconcileResult, ReconcileStats, Reconciler};
pub use remote::MemoryRemote;
