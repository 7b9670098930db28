//! Error type shared by both cursors, and the per-field-type value codec.
//!
//! [`FieldType`] is the codec descriptor used by extensions: given a declared field type
//! it knows the wire type, the default value, and how to read, write and size a
//! [`Value`] of that type.

use crate::reader::CodedReader;
use crate::size;
use crate::source::ReadSource;
use crate::sink::WriteSink;
use crate::unknown::UnknownFieldSet;
use crate::value::Value;
use crate::wire::WireType;
use crate::writer::CodedWriter;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("input contained a malformed varint")]
    MalformedVarint,
    #[error("input contained a length-delimited value with a negative size")]
    NegativeSize,
    #[error("input contained an invalid tag: {0}")]
    InvalidTag(u32),
    #[error("input contained a tag with an invalid wire type: {0}")]
    InvalidWireType(u32),
    #[error("input ended unexpectedly in the middle of a field")]
    TruncatedMessage,
    #[error("completed reading a message while more data was available")]
    MoreDataAvailable,
    #[error("mismatched end-group tag: started with field {start}, ended with field {end}")]
    MismatchedEndGroup { start: u32, end: u32 },
    #[error("message had too many levels of nesting")]
    RecursionLimitExceeded,
    #[error("message was too large; raise the size limit to read it")]
    SizeLimitExceeded,
    #[error("writer ran out of space in a fixed-capacity buffer")]
    OutOfSpace,
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("input contained an invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Declared type of a field, as far as the wire format is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    UInt32,
    Enum,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
    /// Embedded message, held schema-less as an [`UnknownFieldSet`].
    Message,
    /// Legacy group, held the same way as [`FieldType::Message`].
    Group,
}

impl FieldType {
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::Int64
            | FieldType::UInt64
            | FieldType::Int32
            | FieldType::Bool
            | FieldType::UInt32
            | FieldType::Enum
            | FieldType::SInt32
            | FieldType::SInt64 => WireType::Varint,
            FieldType::String | FieldType::Bytes | FieldType::Message => WireType::LengthDelimited,
            FieldType::Group => WireType::StartGroup,
        }
    }

    /// True if repeated values of this type may use the packed encoding.
    pub fn is_packable(self) -> bool {
        self.wire_type().is_packable()
    }

    pub fn default_value(self) -> Value {
        match self {
            FieldType::Double => Value::Double(0.0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Int64 | FieldType::SFixed64 | FieldType::SInt64 => Value::Int64(0),
            FieldType::UInt64 | FieldType::Fixed64 => Value::UInt64(0),
            FieldType::Int32 | FieldType::Enum | FieldType::SFixed32 | FieldType::SInt32 => Value::Int32(0),
            FieldType::UInt32 | FieldType::Fixed32 => Value::UInt32(0),
            FieldType::Bool => Value::Bool(false),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Message | FieldType::Group => Value::Message(UnknownFieldSet::new()),
        }
    }

    /// True if `value` has the in-memory shape this field type reads and writes.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::Double, Value::Double(_))
                | (FieldType::Float, Value::Float(_))
                | (FieldType::Int64 | FieldType::SFixed64 | FieldType::SInt64, Value::Int64(_))
                | (FieldType::UInt64 | FieldType::Fixed64, Value::UInt64(_))
                | (
                    FieldType::Int32 | FieldType::Enum | FieldType::SFixed32 | FieldType::SInt32,
                    Value::Int32(_)
                )
                | (FieldType::UInt32 | FieldType::Fixed32, Value::UInt32(_))
                | (FieldType::Bool, Value::Bool(_))
                | (FieldType::String, Value::String(_))
                | (FieldType::Bytes, Value::Bytes(_))
                | (FieldType::Message | FieldType::Group, Value::Message(_))
        )
    }

    /// Reads one value whose tag was just read from `input`.
    pub fn read_value<S: ReadSource>(self, input: &mut CodedReader<S>) -> Result<Value, CodecError> {
        Ok(match self {
            FieldType::Double => Value::Double(input.read_double()?),
            FieldType::Float => Value::Float(input.read_float()?),
            FieldType::Int64 => Value::Int64(input.read_int64()?),
            FieldType::UInt64 => Value::UInt64(input.read_uint64()?),
            FieldType::Int32 => Value::Int32(input.read_int32()?),
            FieldType::Fixed64 => Value::UInt64(input.read_fixed64()?),
            FieldType::Fixed32 => Value::UInt32(input.read_fixed32()?),
            FieldType::Bool => Value::Bool(input.read_bool()?),
            FieldType::String => Value::String(input.read_string()?),
            FieldType::Bytes => Value::Bytes(input.read_bytes()?),
            FieldType::UInt32 => Value::UInt32(input.read_uint32()?),
            FieldType::Enum => Value::Int32(input.read_enum()?),
            FieldType::SFixed32 => Value::Int32(input.read_sfixed32()?),
            FieldType::SFixed64 => Value::Int64(input.read_sfixed64()?),
            FieldType::SInt32 => Value::Int32(input.read_sint32()?),
            FieldType::SInt64 => Value::Int64(input.read_sint64()?),
            FieldType::Message => {
                let mut fields = UnknownFieldSet::new();
                input.read_message(&mut fields)?;
                Value::Message(fields)
            }
            FieldType::Group => {
                let mut fields = UnknownFieldSet::new();
                input.read_group(&mut fields)?;
                Value::Message(fields)
            }
        })
    }

    /// Reads one value into `existing`. Messages and groups merge; scalars overwrite.
    pub fn merge_value<S: ReadSource>(
        self,
        input: &mut CodedReader<S>,
        existing: &mut Value,
    ) -> Result<(), CodecError> {
        match (self, existing) {
            (FieldType::Message, Value::Message(fields)) => input.read_message(fields),
            (FieldType::Group, Value::Message(fields)) => input.read_group(fields),
            (_, existing) => {
                *existing = self.read_value(input)?;
                Ok(())
            }
        }
    }

    /// Writes `value` without its tag. Groups are followed by their end-group tag.
    pub fn write_value<S: WriteSink>(
        self,
        output: &mut CodedWriter<S>,
        field_number: u32,
        value: &Value,
    ) -> Result<(), CodecError> {
        match (self, value) {
            (FieldType::Double, Value::Double(v)) => output.write_double(*v),
            (FieldType::Float, Value::Float(v)) => output.write_float(*v),
            (FieldType::Int64, Value::Int64(v)) => output.write_int64(*v),
            (FieldType::UInt64, Value::UInt64(v)) => output.write_uint64(*v),
            (FieldType::Int32, Value::Int32(v)) => output.write_int32(*v),
            (FieldType::Fixed64, Value::UInt64(v)) => output.write_fixed64(*v),
            (FieldType::Fixed32, Value::UInt32(v)) => output.write_fixed32(*v),
            (FieldType::Bool, Value::Bool(v)) => output.write_bool(*v),
            (FieldType::String, Value::String(v)) => output.write_string(v),
            (FieldType::Bytes, Value::Bytes(v)) => output.write_bytes(v),
            (FieldType::UInt32, Value::UInt32(v)) => output.write_uint32(*v),
            (FieldType::Enum, Value::Int32(v)) => output.write_enum(*v),
            (FieldType::SFixed32, Value::Int32(v)) => output.write_sfixed32(*v),
            (FieldType::SFixed64, Value::Int64(v)) => output.write_sfixed64(*v),
            (FieldType::SInt32, Value::Int32(v)) => output.write_sint32(*v),
            (FieldType::SInt64, Value::Int64(v)) => output.write_sint64(*v),
            (FieldType::Message, Value::Message(m)) => output.write_message(m),
            (FieldType::Group, Value::Message(m)) => output.write_group(field_number, m),
            _ => Err(CodecError::InvalidOperation("value does not match its field type")),
        }
    }

    /// Encoded size of `value` without its tag; matches [`FieldType::write_value`].
    pub fn value_size(self, field_number: u32, value: &Value) -> usize {
        match (self, value) {
            (FieldType::Double, Value::Double(_)) => size::DOUBLE_SIZE,
            (FieldType::Float, Value::Float(_)) => size::FLOAT_SIZE,
            (FieldType::Int64, Value::Int64(v)) => size::int64_size(*v),
            (FieldType::UInt64, Value::UInt64(v)) => size::uint64_size(*v),
            (FieldType::Int32, Value::Int32(v)) => size::int32_size(*v),
            (FieldType::Fixed64, Value::UInt64(_)) => size::FIXED64_SIZE,
            (FieldType::Fixed32, Value::UInt32(_)) => size::FIXED32_SIZE,
            (FieldType::Bool, Value::Bool(_)) => size::BOOL_SIZE,
            (FieldType::String, Value::String(v)) => size::string_size(v),
            (FieldType::Bytes, Value::Bytes(v)) => size::bytes_size(v),
            (FieldType::UInt32, Value::UInt32(v)) => size::uint32_size(*v),
            (FieldType::Enum, Value::Int32(v)) => size::enum_size(*v),
            (FieldType::SFixed32, Value::Int32(_)) => size::FIXED32_SIZE,
            (FieldType::SFixed64, Value::Int64(_)) => size::FIXED64_SIZE,
            (FieldType::SInt32, Value::Int32(v)) => size::sint32_size(*v),
            (FieldType::SInt64, Value::Int64(v)) => size::sint64_size(*v),
            (FieldType::Message, Value::Message(m)) => size::message_size(m),
            (FieldType::Group, Value::Message(m)) => size::group_size(field_number, m),
            _ => 0,
        }
    }
}
