//! Wire frames for the all-to-all exchange.
//!
//! A batch travels as a control header followed by the Arrow IPC stream
//! encoding of one record batch; FIN frames carry no payload. The schema
//! is implied by the edge, every peer of an exchange constructs it with
//! the same one.

use std::io::Cursor;

use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use table_core::{Result, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Batch,
    Fin,
}

/// Control header carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub edge: i32,
    pub source: usize,
    pub target: usize,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub header: FrameHeader,
    /// IPC-encoded record batch for `FrameKind::Batch`, empty for FIN.
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn batch(edge: i32, source: usize, target: usize, batch: &RecordBatch) -> Result<Self> {
        Ok(Self {
            header: FrameHeader {
                edge,
                source,
                target,
                kind: FrameKind::Batch,
            },
            payload: encode_batch(batch)?,
        })
    }

    pub fn fin(edge: i32, source: usize, target: usize) -> Self {
        Self {
            header: FrameHeader {
                edge,
                source,
                target,
                kind: FrameKind::Fin,
            },
            payload: Vec::new(),
        }
    }
}

/// Serializes a record batch using the Arrow IPC stream format.
pub fn encode_batch(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, &batch.schema())
            .map_err(|e| TableError::IoError(e.to_string()))?;
        writer
            .write(batch)
            .map_err(|e| TableError::IoError(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| TableError::IoError(e.to_string()))?;
    }
    Ok(buffer)
}

/// Deserializes the single record batch of an IPC payload.
pub fn decode_batch(payload: &[u8]) -> Result<RecordBatch> {
    let cursor = Cursor::new(payload);
    let reader =
        StreamReader::try_new(cursor, None).map_err(|e| TableError::IoError(e.to_string()))?;
    for batch in reader {
        return batch.map_err(|e| TableError::IoError(e.to_string()));
    }
    Err(TableError::IoError(
        "No batch found in frame payload".to_string(),
    ))
}
