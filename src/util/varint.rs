//! Variable-length integer encoding.
//!
//! Seven payload bits per byte, least significant group first, with the high
//! bit marking continuation. Posting lists store doc-id gaps, wdfs and
//! position gaps in this form.

use crate::error::{Result, TesseraError};

/// Encode a u64 into a fresh buffer.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    write_u64(&mut bytes, value);
    bytes
}

/// Append the encoding of `value` to `buf`.
pub fn write_u64(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a u64, returning the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
            return Err(TesseraError::other("varint overflows u64"));
        }
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(TesseraError::other("truncated varint"))
}
