//! Schema-id framing.
//!
//! Schema-framed payloads start with a 5-byte header, compatible with the
//! Confluent wire format:
//!
//! ```text
//! [magic 0x00][schema id: i32 big-endian][data...]
//! ```

use crate::error::{Result, SchemaError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic byte indicating schema ID is present
pub const MAGIC_BYTE: u8 = 0x00;

/// Length of the magic byte plus schema id.
pub const FRAME_HEADER_LEN: usize = 5;

/// Prepend the frame header to `data`.
pub fn frame(schema_id: i32, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + data.len());
    buf.put_u8(MAGIC_BYTE);
    buf.put_i32(schema_id);
    buf.put_slice(data);
    buf.freeze()
}

/// Split a framed payload into `(schema_id, data)`.
pub fn unframe(data: &[u8]) -> Result<(i32, &[u8])> {
    let header = frame_header(data)?;
    let mut id_bytes = &header[1..];
    Ok((id_bytes.get_i32(), &data[FRAME_HEADER_LEN..]))
}

/// The first [`FRAME_HEADER_LEN`] bytes of a framed payload.
pub fn frame_header(data: &[u8]) -> Result<&[u8]> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(SchemaError::DeserializationError(format!(
            "payload of {} bytes is too short to contain a schema id",
            data.len()
        )));
    }
    if data[0] != MAGIC_BYTE {
        return Err(SchemaError::DeserializationError(format!(
            "Invalid magic byte: expected 0x00, got 0x{:02x}",
            data[0]
        )));
    }
    Ok(&data[..FRAME_HEADER_LEN])
}
