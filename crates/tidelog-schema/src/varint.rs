//! Variable-length Integer Encoding (Varint)
//!
//! Protobuf wire format building blocks:
//! - Each byte carries 7 bits of data and a continuation bit
//! - ZigZag maps signed integers to unsigned (0 → 0, -1 → 1, 1 → 2, ...);
//!   Confluent message-index arrays use it
//!
//! Decoding never panics: truncated or overlong input yields `None`.

use bytes::{Buf, BufMut};

/// Encode a signed integer as a varint (ZigZag encoding)
pub fn encode_zigzag(buf: &mut impl BufMut, value: i64) {
    let unsigned = ((value << 1) ^ (value >> 63)) as u64;
    encode_varint(buf, unsigned);
}

/// Encode an unsigned integer as a varint
pub fn encode_varint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a ZigZag varint to a signed integer
pub fn decode_zigzag(buf: &mut impl Buf) -> Option<i64> {
    let unsigned = decode_varint(buf)?;
    let value = (unsigned >> 1) as i64;
    Some(if (unsigned & 1) != 0 { !value } else { value })
}

/// Decode a varint to an unsigned integer
pub fn decode_varint(buf: &mut impl Buf) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() || shift >= 64 {
            return None;
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Some(value);
        }
        shift += 7;
    }
}
