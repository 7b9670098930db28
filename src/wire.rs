//! Wire primitives: tags, wire types and the zigzag transform.
//!
//! A tag is `(field_number << 3) | wire_type`. Field numbers occupy the upper 29 bits,
//! so the largest valid field number is `2^29 - 1`. Tag value 0 never appears on the
//! wire; readers return it to signal the end of the current scope.

use crate::codec::CodecError;
use std::convert::TryFrom;

/// Number of low bits of a tag holding the wire type.
pub const TAG_TYPE_BITS: u32 = 3;

const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

/// Smallest valid field number.
pub const MIN_FIELD_NUMBER: u32 = 1;

/// Largest valid field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Encoding of a field value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Varint, fixed32 and fixed64 values may be packed into one length-delimited run.
    pub fn is_packable(self) -> bool {
        matches!(self, WireType::Varint | WireType::Fixed32 | WireType::Fixed64)
    }
}

impl TryFrom<u32> for WireType {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(CodecError::InvalidWireType(value)),
        }
    }
}

/// Packs a field number and wire type into a tag.
#[inline]
pub fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << TAG_TYPE_BITS) | wire_type as u32
}

/// Wire type of a tag. Fails for the unassigned wire type values 6 and 7.
#[inline]
pub fn tag_wire_type(tag: u32) -> Result<WireType, CodecError> {
    WireType::try_from(tag & TAG_TYPE_MASK).map_err(|_| CodecError::InvalidWireType(tag))
}

/// Field number of a tag.
#[inline]
pub fn tag_field_number(tag: u32) -> u32 {
    tag >> TAG_TYPE_BITS
}

/// True if `tag` closes a group.
#[inline]
pub fn is_end_group_tag(tag: u32) -> bool {
    tag & TAG_TYPE_MASK == WireType::EndGroup as u32
}

#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
