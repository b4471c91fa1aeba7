//! Dump log command implementation.

use super::open_existing;
use crate::Format;
use replica_core::log::{Frame, LogOp};
use serde::Serialize;
use std::path::Path;

/// A frame as printed.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Offset in the record log.
    pub offset: u64,
    /// Encoded length including header and CRC.
    pub len: u64,
    /// Operations in the frame.
    pub ops: Vec<OpInfo>,
}

/// An operation as printed.
#[derive(Debug, Serialize)]
pub struct OpInfo {
    /// Operation label.
    pub op: &'static str,
    /// Record id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Continuation token (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Content type (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size: Option<usize>,
    /// Tombstone flag (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    /// Pending flag (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

impl From<&LogOp> for OpInfo {
    fn from(op: &LogOp) -> Self {
        let mut info = OpInfo {
            op: op.label(),
            id: None,
            token: None,
            content_type: None,
            content_size: None,
            deleted: None,
            pending: None,
        };
        match op {
            LogOp::PutRecord(record) => {
                info.id = Some(record.id.to_string());
                info.content_type = Some(record.content_type.clone());
                info.content_size = Some(record.content.len());
                info.deleted = Some(record.deleted);
                info.pending = Some(record.pending_write);
            }
            LogOp::ClearPending(id) => info.id = Some(id.to_string()),
            LogOp::PutToken(token) | LogOp::RemoveToken(token) => {
                info.token = Some(token.to_string());
            }
        }
        info
    }
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let frames = describe(&store.frames()?, limit);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&frames)?),
        Format::Text => print_text_output(&frames),
    }
    Ok(())
}

/// Converts up to `limit` frames for output.
pub fn describe(frames: &[Frame], limit: Option<usize>) -> Vec<FrameInfo> {
    frames
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|frame| FrameInfo {
            offset: frame.offset,
            len: frame.encoded_len,
            ops: frame.ops.iter().map(OpInfo::from).collect(),
        })
        .collect()
}

fn print_text_output(frames: &[FrameInfo]) {
    for frame in frames {
        println!("@{:08} ({} bytes)", frame.offset, frame.len);
        for op in &frame.ops {
            let mut line = format!("  {:<14}", op.op);
            if let Some(id) = &op.id {
                line.push_str(&format!(" id={id}"));
            }
            if let Some(token) = &op.token {
                line.push_str(&format!(" token={token}"));
            }
            if let Some(content_type) = &op.content_type {
                line.push_str(&format!(" type={content_type}"));
            }
            if let Some(size) = op.content_size {
                line.push_str(&format!(" size={size}"));
            }
            if op.deleted == Some(true) {
                line.push_str(" deleted");
            }
            if op.pending == Some(true) {
                line.push_str(" pending");
            }
            println!("{line}");
        }
    }
    println!();
    println!("{} frame(s)", frames.len());
}
