//! Preservation of fields a message does not recognize.
//!
//! Every unknown field is kept as raw wire values, grouped by field number and then by
//! wire type, so it can be written back out unchanged. Fields are stored in field-number
//! order; values of the same field and wire type keep their arrival order.

use crate::codec::CodecError;
use crate::message::Message;
use crate::reader::CodedReader;
use crate::sink::WriteSink;
use crate::size;
use crate::source::ReadSource;
use crate::wire::{self, tag_field_number, tag_wire_type, WireType};
use crate::writer::CodedWriter;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A single raw value of an unknown field, tagged with its wire type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnknownValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(Vec<u8>),
    Group(UnknownFieldSet),
}

impl UnknownValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::Fixed32,
            UnknownValue::Fixed64(_) => WireType::Fixed64,
            UnknownValue::LengthDelimited(_) => WireType::LengthDelimited,
            UnknownValue::Group(_) => WireType::StartGroup,
        }
    }
}

/// All values seen for one unknown field number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnknownField {
    varint: Vec<u64>,
    fixed32: Vec<u32>,
    fixed64: Vec<u64>,
    length_delimited: Vec<Vec<u8>>,
    groups: Vec<UnknownFieldSet>,
}

impl UnknownField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn varint_list(&self) -> &[u64] {
        &self.varint
    }

    pub fn fixed32_list(&self) -> &[u32] {
        &self.fixed32
    }

    pub fn fixed64_list(&self) -> &[u64] {
        &self.fixed64
    }

    pub fn length_delimited_list(&self) -> &[Vec<u8>] {
        &self.length_delimited
    }

    pub fn group_list(&self) -> &[UnknownFieldSet] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.varint.is_empty()
            && self.fixed32.is_empty()
            && self.fixed64.is_empty()
            && self.length_delimited.is_empty()
            && self.groups.is_empty()
    }

    pub fn add_varint(&mut self, value: u64) -> &mut Self {
        self.varint.push(value);
        self
    }

    pub fn add_fixed32(&mut self, value: u32) -> &mut Self {
        self.fixed32.push(value);
        self
    }

    pub fn add_fixed64(&mut self, value: u64) -> &mut Self {
        self.fixed64.push(value);
        self
    }

    pub fn add_length_delimited(&mut self, value: Vec<u8>) -> &mut Self {
        self.length_delimited.push(value);
        self
    }

    pub fn add_group(&mut self, value: UnknownFieldSet) -> &mut Self {
        self.groups.push(value);
        self
    }

    pub fn add(&mut self, value: UnknownValue) -> &mut Self {
        match value {
            UnknownValue::Varint(v) => self.add_varint(v),
            UnknownValue::Fixed32(v) => self.add_fixed32(v),
            UnknownValue::Fixed64(v) => self.add_fixed64(v),
            UnknownValue::LengthDelimited(v) => self.add_length_delimited(v),
            UnknownValue::Group(v) => self.add_group(v),
        }
    }

    /// Appends every value of `other` after this field's values.
    pub fn merge_from(&mut self, other: &UnknownField) {
        self.varint.extend_from_slice(&other.varint);
        self.fixed32.extend_from_slice(&other.fixed32);
        self.fixed64.extend_from_slice(&other.fixed64);
        self.length_delimited.extend(other.length_delimited.iter().cloned());
        self.groups.extend(other.groups.iter().cloned());
    }

    /// Writes every value with its tag: varints, fixed32, fixed64, length-delimited,
    /// then groups.
    pub fn write_to<S: WriteSink>(&self, field_number: u32, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        for &v in &self.varint {
            output.write_tag(field_number, WireType::Varint)?;
            output.write_uint64(v)?;
        }
        for &v in &self.fixed32 {
            output.write_tag(field_number, WireType::Fixed32)?;
            output.write_fixed32(v)?;
        }
        for &v in &self.fixed64 {
            output.write_tag(field_number, WireType::Fixed64)?;
            output.write_fixed64(v)?;
        }
        for v in &self.length_delimited {
            output.write_tag(field_number, WireType::LengthDelimited)?;
            output.write_bytes(v)?;
        }
        for group in &self.groups {
            output.write_tag(field_number, WireType::StartGroup)?;
            output.write_group(field_number, group)?;
        }
        Ok(())
    }

    pub fn calculate_size(&self, field_number: u32) -> usize {
        let tag = size::tag_size(field_number);
        let mut total = 0;
        total += self.varint.iter().map(|&v| tag + size::uint64_size(v)).sum::<usize>();
        total += self.fixed32.len() * (tag + size::FIXED32_SIZE);
        total += self.fixed64.len() * (tag + size::FIXED64_SIZE);
        total += self.length_delimited.iter().map(|v| tag + size::bytes_size(v)).sum::<usize>();
        total += self
            .groups
            .iter()
            .map(|g| tag + size::group_size(field_number, g))
            .sum::<usize>();
        total
    }
}

/// Unknown fields of one message, keyed by field number.
///
/// Also usable as a schema-less [`Message`] in its own right: parsing any valid input
/// into a fresh set and writing it back reproduces every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: BTreeMap<u32, UnknownField>,
}

impl UnknownFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of distinct field numbers.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn has_field(&self, field_number: u32) -> bool {
        self.fields.contains_key(&field_number)
    }

    pub fn field(&self, field_number: u32) -> Option<&UnknownField> {
        self.fields.get(&field_number)
    }

    pub fn fields(&self) -> impl Iterator<Item = (u32, &UnknownField)> {
        self.fields.iter().map(|(&n, f)| (n, f))
    }

    fn field_mut(&mut self, field_number: u32) -> &mut UnknownField {
        self.fields.entry(field_number).or_default()
    }

    /// Replaces whatever is stored under `field_number`. An empty field removes it.
    pub fn add_or_replace_field(&mut self, field_number: u32, field: UnknownField) {
        if field.is_empty() {
            self.fields.remove(&field_number);
        } else {
            self.fields.insert(field_number, field);
        }
    }

    /// Appends one raw value to `field_number`.
    pub fn merge_field(&mut self, field_number: u32, value: UnknownValue) -> &mut Self {
        self.field_mut(field_number).add(value);
        self
    }

    /// Appends every field of `other`.
    pub fn merge_fields_from(&mut self, other: &UnknownFieldSet) {
        for (&number, field) in &other.fields {
            self.field_mut(number).merge_from(field);
        }
    }

    /// Reads the value of the field whose tag was just read and stores it. Returns
    /// `false` without reading anything if that tag was an end-group tag.
    pub fn merge_field_from<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<bool, CodecError> {
        let tag = input.last_tag();
        let number = tag_field_number(tag);
        let value = match tag_wire_type(tag)? {
            WireType::Varint => UnknownValue::Varint(input.read_uint64()?),
            WireType::Fixed32 => UnknownValue::Fixed32(input.read_fixed32()?),
            WireType::Fixed64 => UnknownValue::Fixed64(input.read_fixed64()?),
            WireType::LengthDelimited => UnknownValue::LengthDelimited(input.read_bytes()?),
            WireType::StartGroup => {
                let mut group = UnknownFieldSet::new();
                input.read_group(&mut group)?;
                UnknownValue::Group(group)
            }
            WireType::EndGroup => return Ok(false),
        };
        self.merge_field(number, value);
        Ok(true)
    }

    /// Stores the field whose tag was just read into `fields`, creating the set on first
    /// use. When the reader discards unknown fields the value is skipped instead.
    pub fn merge_unknown_field<S: ReadSource>(
        fields: &mut Option<UnknownFieldSet>,
        input: &mut CodedReader<S>,
    ) -> Result<(), CodecError> {
        if input.discard_unknown_fields() {
            return input.skip_last_field();
        }
        if wire::is_end_group_tag(input.last_tag()) {
            return Err(CodecError::InvalidOperation(
                "end-group tag without a matching start-group tag",
            ));
        }
        let set = fields.get_or_insert_with(UnknownFieldSet::new);
        set.merge_field_from(input)?;
        Ok(())
    }

    /// Merges `other` into `fields`, creating the set only if there is something to add.
    pub fn merge_optional(fields: &mut Option<UnknownFieldSet>, other: Option<&UnknownFieldSet>) {
        match other {
            Some(other) if !other.is_empty() => {
                fields.get_or_insert_with(UnknownFieldSet::new).merge_fields_from(other)
            }
            _ => {}
        }
    }
}

impl Hash for UnknownFieldSet {
    /// Combines per-field hashes with XOR, so the result does not depend on field order.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined = 0u64;
        for (number, field) in &self.fields {
            let mut hasher = DefaultHasher::new();
            number.hash(&mut hasher);
            field.hash(&mut hasher);
            combined ^= hasher.finish();
        }
        state.write_u64(combined);
    }
}

impl Message for UnknownFieldSet {
    fn merge_from<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<(), CodecError> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 || wire::is_end_group_tag(tag) {
                return Ok(());
            }
            self.merge_field_from(input)?;
        }
    }

    fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        for (&number, field) in &self.fields {
            field.write_to(number, output)?;
        }
        Ok(())
    }

    fn calculate_size(&self) -> usize {
        self.fields
            .iter()
            .map(|(&number, field)| field.calculate_size(number))
            .sum()
    }
}
