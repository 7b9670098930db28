//! Runtime values held by extension fields.

use crate::unknown::UnknownFieldSet;

/// A single decoded field value.
///
/// Fixed-width and zigzag integers share the variant of their in-memory type: `fixed32`
/// is a `UInt32`, `sint64` and `sfixed64` are `Int64`, enums are `Int32`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Embedded message or group, kept schema-less.
    Message(UnknownFieldSet),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt32(x) => Some(*x as u64),
            Value::UInt64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(x) => Some(*x as i64),
            Value::Int64(x) => Some(*x),
            Value::UInt32(x) => Some(*x as i64),
            Value::UInt64(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            Value::Float(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&UnknownFieldSet> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}

impl From<UnknownFieldSet> for Value {
    fn from(m: UnknownFieldSet) -> Self {
        Value::Message(m)
    }
}
