//! # Replica Core
//!
//! Durable local cache of encrypted records for an offline-first client.
//!
//! This crate provides:
//! - [`Record`] and [`ContinuationToken`], the cached data model
//! - [`RecordStore`], a crash-safe table of records with a pending-write
//!   index and a singleton continuation token
//! - the record log frame format, in [`log`]
//!
//! Records are opaque here. Content and key material are carried as bytes and
//! never interpreted.
//!
//! ## Example
//!
//! ```rust,no_run
//! use replica_core::{Record, RecordStore, StoreConfig};
//! use std::path::Path;
//!
//! let mut store = RecordStore::open(Path::new("notes.replica"), &StoreConfig::default())?;
//! store.stage(Record::new("A", "Note", b"ciphertext".to_vec()), replica_core::now_millis())?;
//! for record in store.get_pending()? {
//!     println!("{} is waiting to be pushed", record.id);
//! }
//! # Ok::<(), replica_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
pub mod log;
mod record;
mod store;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use record::{now_millis, ContinuationToken, Record, RecordId};
pub use store::{Compaction, RecordStore, StoreStats, VerifyReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
