//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding exchange messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A message could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The peer speaks a different protocol version.
    #[error("unsupported protocol version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version found in the message.
        found: u16,
        /// Version this crate speaks.
        expected: u16,
    },
}
