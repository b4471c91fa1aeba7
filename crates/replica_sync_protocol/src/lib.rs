//! # Replica Sync Protocol
//!
//! Exchange protocol types and CBOR codecs for Replica.
//!
//! This crate provides:
//! - [`WireRecord`], the remote representation of a cached record
//! - [`ExchangeRequest`] and [`ExchangeResponse`], the single round trip of a
//!   reconciliation cycle
//! - the [`Session`] capability consulted before any network call
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod session;
mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ExchangeRequest, ExchangeResponse, PROTOCOL_VERSION};
pub use session::{Session, StaticSession};
pub use wire::WireRecord;
