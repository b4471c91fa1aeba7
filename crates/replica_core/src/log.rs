//! Record log frames.
//!
//! The log is a sequence of frames, each one atomic store mutation:
//!
//! ```text
//! | magic "RPLG" (4) | version u16 LE (2) | len u32 LE (4) | header crc32 LE (4) |
//! | payload (len) | crc32 LE (4) |
//! ```
//!
//! The payload is the CBOR encoding of a `Vec<LogOp>`. The header CRC covers
//! magic, version and length, so `len` is checked before it is trusted. The
//! trailing CRC covers everything before it.
//!
//! A frame cut short at the end of the log is a torn write from a crash and is
//! dropped on replay. A region is only torn if no complete frame follows it
//! inside the remaining bytes; anything else is corruption.

use crate::error::{CoreError, CoreResult};
use crate::record::{ContinuationToken, Record, RecordId};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a log frame.
pub const FRAME_MAGIC: [u8; 4] = *b"RPLG";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4) + header CRC (4)
pub const HEADER_SIZE: usize = 14;

// Bytes covered by the header CRC.
const HEADER_FIELDS: usize = 10;

/// CRC size.
pub const CRC_SIZE: usize = 4;

/// One mutation inside a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Insert or replace a record by id.
    PutRecord(Record),
    /// Clear the pending flag of a record.
    ClearPending(RecordId),
    /// Add a continuation token.
    PutToken(ContinuationToken),
    /// Remove a continuation token.
    RemoveToken(ContinuationToken),
}

impl LogOp {
    /// Short label for logs and dumps.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            LogOp::PutRecord(_) => "put-record",
            LogOp::ClearPending(_) => "clear-pending",
            LogOp::PutToken(_) => "put-token",
            LogOp::RemoveToken(_) => "remove-token",
        }
    }
}

/// A decoded frame and where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame header.
    pub offset: u64,
    /// Total encoded length including header and CRC.
    pub encoded_len: u64,
    /// The mutations in the frame.
    pub ops: Vec<LogOp>,
}

/// Result of scanning a log.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Complete, valid frames in log order.
    pub frames: Vec<Frame>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Bytes after the valid prefix belonging to a torn final frame.
    pub torn_bytes: u64,
}

/// Encodes a batch of operations into one frame.
///
/// # Errors
///
/// Returns a codec error if CBOR encoding fails or the payload exceeds
/// `u32::MAX` bytes.
pub fn encode_frame(ops: &[LogOp]) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(ops, &mut payload).map_err(|e| CoreError::codec(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CoreError::codec(format!("frame payload too large: {} bytes", payload.len()))
    })?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    let header_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&header_crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Scans a whole log.
///
/// # Errors
///
/// Returns [`CoreError::Corrupted`] for a bad magic, unknown version, header
/// or frame CRC mismatch, undecodable payload, or a short frame that is
/// followed by a complete one.
pub fn scan(bytes: &[u8]) -> CoreResult<Scan> {
    let mut scan = Scan::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let remaining = bytes.len() - pos;
        let offset = pos as u64;

        if remaining < HEADER_SIZE {
            scan.torn_bytes = remaining as u64;
            break;
        }

        let len = read_header(&bytes[pos..pos + HEADER_SIZE], offset)?;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if remaining < total {
            // An interrupted append leaves nothing after it.
            if let Some(next) = find_frame(bytes, pos + HEADER_SIZE) {
                return Err(CoreError::corrupted(
                    offset,
                    format!("short frame followed by a complete frame at offset {next}"),
                ));
            }
            scan.torn_bytes = remaining as u64;
            break;
        }

        let ops = read_body(&bytes[pos..pos + total], offset)?;
        scan.frames.push(Frame {
            offset,
            encoded_len: total as u64,
            ops,
        });
        pos += total;
        scan.valid_len = pos as u64;
    }

    Ok(scan)
}

/// Checks a frame header and returns the payload length.
fn read_header(header: &[u8], offset: u64) -> CoreResult<usize> {
    if header[0..4] != FRAME_MAGIC {
        return Err(CoreError::corrupted(offset, "bad frame magic"));
    }
    let stored = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    let actual = crc32fast::hash(&header[..HEADER_FIELDS]);
    if stored != actual {
        return Err(CoreError::corrupted(
            offset,
            format!("header crc mismatch: stored {stored:08x}, computed {actual:08x}"),
        ));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FRAME_VERSION {
        return Err(CoreError::corrupted(
            offset,
            format!("unsupported frame version {version}"),
        ));
    }
    Ok(u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize)
}

/// Checks the frame CRC and decodes the payload of one whole frame.
fn read_body(frame: &[u8], offset: u64) -> CoreResult<Vec<LogOp>> {
    let body_end = frame.len() - CRC_SIZE;
    let stored = u32::from_le_bytes([
        frame[body_end],
        frame[body_end + 1],
        frame[body_end + 2],
        frame[body_end + 3],
    ]);
    let actual = crc32fast::hash(&frame[..body_end]);
    if stored != actual {
        return Err(CoreError::corrupted(
            offset,
            format!("crc mismatch: stored {stored:08x}, computed {actual:08x}"),
        ));
    }

    ciborium::de::from_reader(&frame[HEADER_SIZE..body_end])
        .map_err(|e| CoreError::corrupted(offset, format!("undecodable payload: {e}")))
}

/// Returns the offset of the first complete, valid frame at or after `from`.
fn find_frame(bytes: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while pos + HEADER_SIZE + CRC_SIZE <= bytes.len() {
        let candidate = &bytes[pos..];
        if candidate.starts_with(&FRAME_MAGIC) {
            if let Ok(len) = read_header(&candidate[..HEADER_SIZE], pos as u64) {
                let total = HEADER_SIZE + len + CRC_SIZE;
                if total <= candidate.len() && read_body(&candidate[..total], pos as u64).is_ok() {
                    return Some(pos);
                }
            }
        }
        pos += 1;
    }
    None
}
