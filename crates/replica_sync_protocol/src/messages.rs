//! Exchange messages.
//!
//! A reconciliation cycle is one request and one response. The client sends
//! its cursor and pending edits, the service answers with what changed since
//! the cursor, which pushed records it stored, and a new cursor.

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::WireRecord;
use replica_core::{ContinuationToken, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Protocol version carried in every message.
pub const PROTOCOL_VERSION: u16 = 1;

/// Client to service: push pending edits and pull changes since `cursor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Protocol version.
    pub version: u16,
    /// Cursor from the previous cycle. `None` asks for a full pull.
    pub cursor: Option<ContinuationToken>,
    /// Records to push.
    pub items: Vec<WireRecord>,
}

impl ExchangeRequest {
    /// Creates a request at the current protocol version.
    pub fn new(cursor: Option<ContinuationToken>, items: Vec<WireRecord>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            cursor,
            items,
        }
    }

    /// Creates a full-pull request with nothing to push.
    #[must_use]
    pub fn full_pull() -> Self {
        Self::new(None, Vec::new())
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let request: Self = decode(bytes)?;
        check_version(request.version)?;
        Ok(request)
    }
}

/// Service to client: the outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Protocol version.
    pub version: u16,
    /// Records the service considers authoritative for this pull window.
    pub pulled: Vec<WireRecord>,
    /// Pushed ids the service stored durably.
    pub acknowledged: Vec<RecordId>,
    /// Pushed ids the service rejected or could not store.
    pub unacknowledged: Vec<RecordId>,
    /// Cursor to send with the next request.
    pub token: ContinuationToken,
}

impl ExchangeResponse {
    /// Creates a response that only advances the cursor.
    pub fn empty(token: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            pulled: Vec::new(),
            acknowledged: Vec::new(),
            unacknowledged: Vec::new(),
            token: ContinuationToken::new(token),
        }
    }

    /// Sets the pulled records.
    #[must_use]
    pub fn with_pulled(mut self, pulled: Vec<WireRecord>) -> Self {
        self.pulled = pulled;
        self
    }

    /// Sets the acknowledged ids.
    #[must_use]
    pub fn with_acknowledged<I: Into<RecordId>>(
        mut self,
        ids: impl IntoIterator<Item = I>,
    ) -> Self {
        self.acknowledged = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the unacknowledged ids.
    #[must_use]
    pub fn with_unacknowledged<I: Into<RecordId>>(
        mut self,
        ids: impl IntoIterator<Item = I>,
    ) -> Self {
        self.unacknowledged = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let response: Self = decode(bytes)?;
        check_version(response.version)?;
        Ok(response)
    }
}

fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(message, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

fn check_version(found: u16) -> ProtocolResult<()> {
    if found == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedVersion {
            found,
            expected: PROTOCOL_VERSION,
        })
    }
}
