//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use replica_core::StoreConfig;
use replica_sync_protocol::PROTOCOL_VERSION;
use std::time::Duration;

/// Configuration for reconciliation and bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the remote service.
    pub server_url: String,
    /// Path of the exchange endpoint, starting with `/`.
    pub endpoint: String,
    /// Protocol version.
    pub protocol_version: u16,
    /// Request timeout, handed to the HTTP client.
    pub timeout: Duration,
    /// Options used when bootstrap opens or creates a store.
    pub store: StoreConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            endpoint: "/items/sync".to_string(),
            protocol_version: PROTOCOL_VERSION,
            timeout: Duration::from_secs(30),
            store: StoreConfig::default(),
        }
    }

    /// Sets the exchange endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the store options used by bootstrap.
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Returns the full exchange URL.
    #[must_use]
    pub fn exchange_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.endpoint)
    }

    /// Checks that the configuration can be used at all.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for an empty server URL, an
    /// endpoint without a leading `/`, or a protocol version this build does
    /// not speak.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(SyncError::configuration("server_url is empty"));
        }
        if !self.endpoint.starts_with('/') {
            return Err(SyncError::configuration(format!(
                "endpoint {:?} must start with '/'",
                self.endpoint
            )));
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(SyncError::configuration(format!(
                "protocol version {} is not supported, expected {PROTOCOL_VERSION}",
                self.protocol_version
            )));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
