//! Exact encoded sizes of every wire representation.
//!
//! Each function returns precisely the number of bytes the matching `write_*` method of
//! [`CodedWriter`](crate::writer::CodedWriter) emits. Length prefixes are computed from
//! these before a nested value is written, so any disagreement corrupts the output.

use crate::message::Message;
use crate::wire::{make_tag, WireType};

pub const FIXED32_SIZE: usize = 4;
pub const FIXED64_SIZE: usize = 8;
pub const FLOAT_SIZE: usize = 4;
pub const DOUBLE_SIZE: usize = 8;
pub const BOOL_SIZE: usize = 1;

/// Size of a 32-bit varint, from the position of its highest set bit.
#[inline]
pub fn varint32_size(value: u32) -> usize {
    if value & (0xffff_ffff << 7) == 0 {
        1
    } else if value & (0xffff_ffff << 14) == 0 {
        2
    } else if value & (0xffff_ffff << 21) == 0 {
        3
    } else if value & (0xffff_ffff << 28) == 0 {
        4
    } else {
        5
    }
}

#[inline]
pub fn varint64_size(value: u64) -> usize {
    if value < 1 << 7 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 21 {
        3
    } else if value < 1 << 28 {
        4
    } else if value < 1 << 35 {
        5
    } else if value < 1 << 42 {
        6
    } else if value < 1 << 49 {
        7
    } else if value < 1 << 56 {
        8
    } else if value < 1 << 63 {
        9
    } else {
        10
    }
}

/// Size of a tag for `field_number`; the wire type never changes the size.
#[inline]
pub fn tag_size(field_number: u32) -> usize {
    varint32_size(make_tag(field_number, WireType::Varint))
}

/// Negative values are sign-extended to 64 bits and always take ten bytes.
#[inline]
pub fn int32_size(value: i32) -> usize {
    if value >= 0 {
        varint32_size(value as u32)
    } else {
        10
    }
}

#[inline]
pub fn int64_size(value: i64) -> usize {
    varint64_size(value as u64)
}

#[inline]
pub fn uint32_size(value: u32) -> usize {
    varint32_size(value)
}

#[inline]
pub fn uint64_size(value: u64) -> usize {
    varint64_size(value)
}

#[inline]
pub fn sint32_size(value: i32) -> usize {
    varint32_size(crate::wire::zigzag_encode32(value))
}

#[inline]
pub fn sint64_size(value: i64) -> usize {
    varint64_size(crate::wire::zigzag_encode64(value))
}

#[inline]
pub fn enum_size(value: i32) -> usize {
    int32_size(value)
}

/// Size of a length prefix.
#[inline]
pub fn length_size(length: usize) -> usize {
    varint32_size(length as u32)
}

pub fn string_size(value: &str) -> usize {
    length_size(value.len()) + value.len()
}

pub fn bytes_size(value: &[u8]) -> usize {
    length_size(value.len()) + value.len()
}

/// Length prefix plus body.
pub fn message_size<M: Message>(value: &M) -> usize {
    let size = value.calculate_size();
    length_size(size) + size
}

/// Body plus the closing end-group tag; the start tag is counted by the caller like
/// any other field tag.
pub fn group_size<M: Message>(field_number: u32, value: &M) -> usize {
    value.calculate_size() + tag_size(field_number)
}
