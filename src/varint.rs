//! Base-128 varint and little-endian fixed-width encoding over plain byte slices.
//!
//! These are the building blocks the cursors use on their fast paths, when the whole
//! value is known to fit in the current window. Size computation lives in
//! [`size`](crate::size) and must agree byte for byte with [`encode_varint64`].

use crate::codec::CodecError;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Longest encoding of a 64-bit varint.
pub const MAX_VARINT64_LEN: usize = 10;

/// Longest encoding of a 32-bit varint.
pub const MAX_VARINT32_LEN: usize = 5;

/// Writes `value` at the start of `buf`, returning the number of bytes used.
///
/// `buf` must hold at least [`size::varint64_size`](crate::size::varint64_size) bytes.
#[inline]
pub fn encode_varint64(mut value: u64, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

#[inline]
pub fn encode_varint32(value: u32, buf: &mut [u8]) -> usize {
    encode_varint64(value as u64, buf)
}

/// Encodes into a fresh vector.
pub fn varint_to_vec(value: u64) -> Vec<u8> {
    let mut buf = [0u8; MAX_VARINT64_LEN];
    let n = encode_varint64(value, &mut buf);
    buf[..n].to_vec()
}

/// Decodes a varint from the start of `buf`, returning the value and bytes consumed.
///
/// Fails with [`CodecError::TruncatedMessage`] if `buf` ends inside the varint and
/// [`CodecError::MalformedVarint`] if no terminating byte appears within ten bytes.
#[inline]
pub fn decode_varint64(buf: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut result = 0u64;
    for (i, &b) in buf.iter().take(MAX_VARINT64_LEN).enumerate() {
        result |= ((b & 0x7F) as u64) << (7 * i);
        if b < 0x80 {
            return Ok((result, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT64_LEN {
        Err(CodecError::MalformedVarint)
    } else {
        Err(CodecError::TruncatedMessage)
    }
}

/// Like [`decode_varint64`] but keeps only the low 32 bits. Upper bytes of a longer
/// varint are still consumed.
#[inline]
pub fn decode_varint32(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    decode_varint64(buf).map(|(v, n)| (v as u32, n))
}

/// Reads a varint from `r` one byte at a time, so nothing after the varint is consumed.
///
/// Useful for reading a length prefix off a stream before handing the stream to a cursor
/// that buffers ahead.
pub fn read_varint32_from<R: Read>(r: &mut R) -> Result<u32, CodecError> {
    let mut result = 0u32;
    let mut shift = 0;
    while shift < 32 {
        let b = read_byte(r)?;
        result |= ((b & 0x7F) as u32) << shift;
        if b < 0x80 {
            return Ok(result);
        }
        shift += 7;
    }
    // Keep reading up to 64 bits, discarding the excess.
    while shift < 64 {
        let b = read_byte(r)?;
        if b < 0x80 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(CodecError::MalformedVarint)
}

fn read_byte<R: Read>(r: &mut R) -> Result<u8, CodecError> {
    r.read_u8().map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::TruncatedMessage,
        _ => CodecError::Io(e),
    })
}

#[inline]
pub fn encode_fixed32(value: u32, buf: &mut [u8]) {
    LittleEndian::write_u32(buf, value);
}

#[inline]
pub fn encode_fixed64(value: u64, buf: &mut [u8]) {
    LittleEndian::write_u64(buf, value);
}

#[inline]
pub fn decode_fixed32(buf: &[u8]) -> u32 {
    LittleEndian::read_u32(buf)
}

#[inline]
pub fn decode_fixed64(buf: &[u8]) -> u64 {
    LittleEndian::read_u64(buf)
}
