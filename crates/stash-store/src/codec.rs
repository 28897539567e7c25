use std::fmt;

use stash_types::Value;

use crate::error::{StoreError, StoreResult};

/// Converts values to and from bytes for on-disk storage.
///
/// Implementations must be self-describing: decoding must reconstruct the
/// shape of the original value (maps, sequences, strings, numbers) without a
/// schema.
pub trait Serializer: Send + Sync + fmt::Debug {
    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> StoreResult<Value>;
}

/// JSON encoding via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Magic bytes opening every record.
pub const MAGIC: [u8; 4] = *b"STSH";

/// Header size: 4 bytes magic + 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: usize = 12;

/// Why a record failed to unframe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("record is {0} bytes, shorter than the header")]
    Truncated(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("length mismatch: header says {expected} bytes, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// Wrap a payload in a record frame.
///
/// Record format:
/// ```text
/// [4 bytes: magic "STSH"]
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload]
/// ```
///
/// Payloads longer than `u32::MAX` bytes cannot be framed.
pub fn frame(payload: &[u8]) -> StoreResult<Vec<u8>> {
    let length = payload_len(payload.len())?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn payload_len(len: usize) -> StoreResult<u32> {
    u32::try_from(len).map_err(|_| {
        StoreError::Serialization(format!(
            "payload of {len} bytes exceeds the {} byte record limit",
            u32::MAX
        ))
    })
}

/// Validate a record frame and return its payload.
///
/// A record cut short by a concurrent or interrupted write fails here rather
/// than producing a partial value.
pub fn unframe(record: &[u8]) -> Result<&[u8], FrameError> {
    if record.len() < HEADER_SIZE {
        return Err(FrameError::Truncated(record.len()));
    }
    if record[..4] != MAGIC {
        return Err(FrameError::BadMagic);
    }

    let length = u32::from_le_bytes([record[4], record[5], record[6], record[7]]) as usize;
    let expected_crc = u32::from_le_bytes([record[8], record[9], record[10], record[11]]);

    let payload = &record[HEADER_SIZE..];
    if payload.len() != length {
        return Err(FrameError::LengthMismatch {
            expected: length,
            actual: payload.len(),
        });
    }

    let computed = crc32fast::hash(payload);
    if computed != expected_crc {
        return Err(FrameError::ChecksumMismatch {
            expected: expected_crc,
            computed,
        });
    }
    Ok(payload)
}
