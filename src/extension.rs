//! Extension fields: typed field descriptors declared outside a message, a registry the
//! reader consults for unrecognized field numbers, and the per-message value store.
//!
//! Extensions are keyed by the Rust type of the message they extend plus a field
//! number. A message opts in by implementing [`ExtendableMessage`], holding an
//! `Option<ExtensionSet<Self>>` that stays `None` until the first extension is set or
//! parsed.

use crate::codec::{CodecError, FieldType};
use crate::message::Message;
use crate::reader::CodedReader;
use crate::sink::WriteSink;
use crate::size;
use crate::source::ReadSource;
use crate::value::Value;
use crate::wire::{tag_field_number, tag_wire_type, WireType, MAX_FIELD_NUMBER, MIN_FIELD_NUMBER};
use crate::writer::CodedWriter;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Cardinality of an extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionLabel {
    Singular,
    Repeated { packed: bool },
}

/// Everything needed to read, write and size one extension field.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDescriptor {
    pub number: u32,
    pub field_type: FieldType,
    pub label: ExtensionLabel,
    /// Returned by `get` while the field is unset.
    pub default: Value,
}

impl ExtensionDescriptor {
    fn new(number: u32, field_type: FieldType, label: ExtensionLabel, default: Value) -> Result<Self, CodecError> {
        if !(MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&number) {
            return Err(CodecError::InvalidOperation("extension field number out of range"));
        }
        if !field_type.accepts(&default) {
            return Err(CodecError::InvalidOperation(
                "extension default does not match its field type",
            ));
        }
        Ok(ExtensionDescriptor {
            number,
            field_type,
            label,
            default,
        })
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self.label, ExtensionLabel::Repeated { .. })
    }

    fn is_packed(&self) -> bool {
        matches!(self.label, ExtensionLabel::Repeated { packed: true })
    }

    /// True if a value arriving with `wire_type` can be read into this field. Repeated
    /// packable fields accept both the packed and the unpacked form.
    fn accepts_wire_type(&self, wire_type: WireType) -> bool {
        let expected = self.field_type.wire_type();
        wire_type == expected
            || (self.is_repeated() && expected.is_packable() && wire_type == WireType::LengthDelimited)
    }
}

/// A singular extension of messages of type `M`.
pub struct Extension<M> {
    descriptor: Arc<ExtensionDescriptor>,
    _target: PhantomData<fn() -> M>,
}

impl<M> Extension<M> {
    pub fn new(number: u32, field_type: FieldType) -> Result<Self, CodecError> {
        Self::with_default(number, field_type, field_type.default_value())
    }

    pub fn with_default(number: u32, field_type: FieldType, default: Value) -> Result<Self, CodecError> {
        let descriptor = ExtensionDescriptor::new(number, field_type, ExtensionLabel::Singular, default)?;
        Ok(Extension {
            descriptor: Arc::new(descriptor),
            _target: PhantomData,
        })
    }

    pub fn number(&self) -> u32 {
        self.descriptor.number
    }

    pub fn field_type(&self) -> FieldType {
        self.descriptor.field_type
    }

    pub fn default_value(&self) -> &Value {
        &self.descriptor.default
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }
}

impl<M> Clone for Extension<M> {
    fn clone(&self) -> Self {
        Extension {
            descriptor: Arc::clone(&self.descriptor),
            _target: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Extension<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension").field("descriptor", &self.descriptor).finish()
    }
}

/// A repeated extension of messages of type `M`.
pub struct RepeatedExtension<M> {
    descriptor: Arc<ExtensionDescriptor>,
    _target: PhantomData<fn() -> M>,
}

impl<M> RepeatedExtension<M> {
    /// `packed` is ignored for types that cannot be packed.
    pub fn new(number: u32, field_type: FieldType, packed: bool) -> Result<Self, CodecError> {
        let packed = packed && field_type.is_packable();
        let descriptor = ExtensionDescriptor::new(
            number,
            field_type,
            ExtensionLabel::Repeated { packed },
            field_type.default_value(),
        )?;
        Ok(RepeatedExtension {
            descriptor: Arc::new(descriptor),
            _target: PhantomData,
        })
    }

    pub fn number(&self) -> u32 {
        self.descriptor.number
    }

    pub fn field_type(&self) -> FieldType {
        self.descriptor.field_type
    }

    pub fn is_packed(&self) -> bool {
        self.descriptor.is_packed()
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }
}

impl<M> Clone for RepeatedExtension<M> {
    fn clone(&self) -> Self {
        RepeatedExtension {
            descriptor: Arc::clone(&self.descriptor),
            _target: PhantomData,
        }
    }
}

impl<M> fmt::Debug for RepeatedExtension<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedExtension").field("descriptor", &self.descriptor).finish()
    }
}

/// Extensions known to a parse, keyed by extended message type and field number.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    extensions: HashMap<(TypeId, u32), Arc<ExtensionDescriptor>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: 'static>(&mut self, extension: &Extension<M>) -> Result<(), CodecError> {
        self.insert(TypeId::of::<M>(), &extension.descriptor)
    }

    pub fn add_repeated<M: 'static>(&mut self, extension: &RepeatedExtension<M>) -> Result<(), CodecError> {
        self.insert(TypeId::of::<M>(), &extension.descriptor)
    }

    fn insert(&mut self, target: TypeId, descriptor: &Arc<ExtensionDescriptor>) -> Result<(), CodecError> {
        let key = (target, descriptor.number);
        if self.extensions.contains_key(&key) {
            return Err(CodecError::InvalidOperation(
                "an extension with this number is already registered for this message",
            ));
        }
        self.extensions.insert(key, Arc::clone(descriptor));
        Ok(())
    }

    pub fn find<M: 'static>(&self, number: u32) -> Option<&Arc<ExtensionDescriptor>> {
        self.extensions.get(&(TypeId::of::<M>(), number))
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ExtensionValue {
    Single(Value),
    Repeated(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
struct ExtensionCell {
    descriptor: Arc<ExtensionDescriptor>,
    value: ExtensionValue,
}

impl ExtensionCell {
    fn new(descriptor: Arc<ExtensionDescriptor>) -> Self {
        let value = if descriptor.is_repeated() {
            ExtensionValue::Repeated(Vec::new())
        } else {
            ExtensionValue::Single(descriptor.default.clone())
        };
        ExtensionCell { descriptor, value }
    }

    fn values_mut(&mut self) -> &mut Vec<Value> {
        match self.value {
            ExtensionValue::Repeated(ref mut values) => values,
            ExtensionValue::Single(_) => {
                self.value = ExtensionValue::Repeated(Vec::new());
                self.values_mut()
            }
        }
    }

    fn merge_from_input<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<(), CodecError> {
        let field_type = self.descriptor.field_type;
        match &mut self.value {
            ExtensionValue::Single(value) => field_type.merge_value(input, value),
            ExtensionValue::Repeated(values) => {
                let wire_type = tag_wire_type(input.last_tag())?;
                if wire_type == WireType::LengthDelimited && field_type.is_packable() {
                    let length = input.read_length()?;
                    let old_limit = input.push_limit(length)?;
                    while !input.reached_limit() {
                        values.push(field_type.read_value(input)?);
                    }
                    input.pop_limit(old_limit);
                } else {
                    values.push(field_type.read_value(input)?);
                }
                Ok(())
            }
        }
    }

    fn merge(&mut self, other: &ExtensionCell) {
        let merged = match (&mut self.value, &other.value) {
            (ExtensionValue::Single(Value::Message(mine)), ExtensionValue::Single(Value::Message(theirs))) => {
                mine.merge_fields_from(theirs);
                true
            }
            (ExtensionValue::Repeated(mine), ExtensionValue::Repeated(theirs)) => {
                mine.extend(theirs.iter().cloned());
                true
            }
            _ => false,
        };
        if !merged {
            *self = other.clone();
        }
    }

    fn packed_data_size(&self, values: &[Value]) -> usize {
        let d = &self.descriptor;
        values.iter().map(|v| d.field_type.value_size(d.number, v)).sum()
    }

    fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        let d = &self.descriptor;
        let wire_type = d.field_type.wire_type();
        match &self.value {
            ExtensionValue::Single(value) => {
                output.write_tag(d.number, wire_type)?;
                d.field_type.write_value(output, d.number, value)
            }
            ExtensionValue::Repeated(values) if values.is_empty() => Ok(()),
            ExtensionValue::Repeated(values) if d.is_packed() => {
                output.write_tag(d.number, WireType::LengthDelimited)?;
                output.write_length(self.packed_data_size(values))?;
                for value in values {
                    d.field_type.write_value(output, d.number, value)?;
                }
                Ok(())
            }
            ExtensionValue::Repeated(values) => {
                for value in values {
                    output.write_tag(d.number, wire_type)?;
                    d.field_type.write_value(output, d.number, value)?;
                }
                Ok(())
            }
        }
    }

    fn calculate_size(&self) -> usize {
        let d = &self.descriptor;
        let tag = size::tag_size(d.number);
        match &self.value {
            ExtensionValue::Single(value) => tag + d.field_type.value_size(d.number, value),
            ExtensionValue::Repeated(values) if values.is_empty() => 0,
            ExtensionValue::Repeated(values) if d.is_packed() => {
                let data = self.packed_data_size(values);
                tag + size::length_size(data) + data
            }
            ExtensionValue::Repeated(values) => values
                .iter()
                .map(|v| tag + d.field_type.value_size(d.number, v))
                .sum(),
        }
    }
}

/// Extension values set on one message of type `M`, keyed by field number.
pub struct ExtensionSet<M> {
    cells: BTreeMap<u32, ExtensionCell>,
    _target: PhantomData<fn() -> M>,
}

impl<M> Default for ExtensionSet<M> {
    fn default() -> Self {
        ExtensionSet {
            cells: BTreeMap::new(),
            _target: PhantomData,
        }
    }
}

impl<M> Clone for ExtensionSet<M> {
    fn clone(&self) -> Self {
        ExtensionSet {
            cells: self.cells.clone(),
            _target: PhantomData,
        }
    }
}

impl<M> PartialEq for ExtensionSet<M> {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl<M> fmt::Debug for ExtensionSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.cells.iter().map(|(n, cell)| (n, &cell.value)))
            .finish()
    }
}

impl<M: 'static> ExtensionSet<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of extension fields present.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Value of a singular extension, or its default when unset.
    pub fn get<'a>(set: Option<&'a Self>, extension: &'a Extension<M>) -> &'a Value {
        match set.and_then(|s| s.cells.get(&extension.number())) {
            Some(ExtensionCell {
                value: ExtensionValue::Single(value),
                ..
            }) => value,
            _ => extension.default_value(),
        }
    }

    /// Values of a repeated extension, or `None` when it was never set.
    pub fn get_repeated<'a>(set: Option<&'a Self>, extension: &RepeatedExtension<M>) -> Option<&'a [Value]> {
        match set.and_then(|s| s.cells.get(&extension.number())) {
            Some(ExtensionCell {
                value: ExtensionValue::Repeated(values),
                ..
            }) => Some(values),
            _ => None,
        }
    }

    /// Mutable list of a repeated extension, created empty if needed.
    pub fn get_or_initialize<'a>(set: &'a mut Option<Self>, extension: &RepeatedExtension<M>) -> &'a mut Vec<Value> {
        let cells = &mut set.get_or_insert_with(Self::new).cells;
        let cell = cells
            .entry(extension.number())
            .or_insert_with(|| ExtensionCell::new(Arc::clone(&extension.descriptor)));
        if !cell.descriptor.is_repeated() {
            *cell = ExtensionCell::new(Arc::clone(&extension.descriptor));
        }
        cell.values_mut()
    }

    /// Sets a singular extension. Fails if `value` does not fit the field type.
    pub fn set(set: &mut Option<Self>, extension: &Extension<M>, value: Value) -> Result<(), CodecError> {
        if !extension.field_type().accepts(&value) {
            return Err(CodecError::InvalidOperation(
                "value does not match the extension's field type",
            ));
        }
        let cell = ExtensionCell {
            descriptor: Arc::clone(&extension.descriptor),
            value: ExtensionValue::Single(value),
        };
        set.get_or_insert_with(Self::new).cells.insert(extension.number(), cell);
        Ok(())
    }

    pub fn has(set: Option<&Self>, extension: &Extension<M>) -> bool {
        set.map_or(false, |s| s.cells.contains_key(&extension.number()))
    }

    /// Removes a field. The set itself is dropped once it holds nothing.
    pub fn clear(set: &mut Option<Self>, number: u32) {
        if let Some(s) = set {
            s.cells.remove(&number);
            if s.cells.is_empty() {
                *set = None;
            }
        }
    }

    /// Reads the field whose tag was just read if it is a known extension of `M`:
    /// one already present in the set, or one found in the reader's registry.
    /// Returns `false` without reading anything otherwise, or when the wire type does
    /// not fit the extension.
    pub fn try_merge_field<S: ReadSource>(set: &mut Option<Self>, input: &mut CodedReader<S>) -> Result<bool, CodecError> {
        let tag = input.last_tag();
        let number = tag_field_number(tag);
        let wire_type = tag_wire_type(tag)?;

        if let Some(cell) = set.as_mut().and_then(|s| s.cells.get_mut(&number)) {
            if !cell.descriptor.accepts_wire_type(wire_type) {
                return Ok(false);
            }
            cell.merge_from_input(input)?;
            return Ok(true);
        }

        let descriptor = match input.extension_registry().and_then(|r| r.find::<M>(number)) {
            Some(descriptor) => Arc::clone(descriptor),
            None => return Ok(false),
        };
        if !descriptor.accepts_wire_type(wire_type) {
            return Ok(false);
        }
        let mut cell = ExtensionCell::new(descriptor);
        cell.merge_from_input(input)?;
        set.get_or_insert_with(Self::new).cells.insert(number, cell);
        Ok(true)
    }

    /// Merges `second` into `first`. Messages merge, repeated fields concatenate and
    /// other singular values are overwritten.
    pub fn merge(first: &mut Option<Self>, second: Option<&Self>) {
        let second = match second {
            Some(second) if !second.is_empty() => second,
            _ => return,
        };
        let first = first.get_or_insert_with(Self::new);
        for (&number, cell) in &second.cells {
            match first.cells.get_mut(&number) {
                Some(existing) => existing.merge(cell),
                None => {
                    first.cells.insert(number, cell.clone());
                }
            }
        }
    }

    /// Writes every present extension in field-number order.
    pub fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        for cell in self.cells.values() {
            cell.write_to(output)?;
        }
        Ok(())
    }

    pub fn calculate_size(&self) -> usize {
        self.cells.values().map(ExtensionCell::calculate_size).sum()
    }
}

/// A message that carries extension fields.
///
/// Implementors only expose their extension slot; everything else is provided.
pub trait ExtendableMessage: Message + Sized + 'static {
    fn extensions(&self) -> Option<&ExtensionSet<Self>>;

    fn extensions_mut(&mut self) -> &mut Option<ExtensionSet<Self>>;

    fn get_extension<'a>(&'a self, extension: &'a Extension<Self>) -> &'a Value {
        ExtensionSet::get(self.extensions(), extension)
    }

    fn set_extension(&mut self, extension: &Extension<Self>, value: Value) -> Result<(), CodecError> {
        ExtensionSet::set(self.extensions_mut(), extension, value)
    }

    fn has_extension(&self, extension: &Extension<Self>) -> bool {
        ExtensionSet::has(self.extensions(), extension)
    }

    fn clear_extension(&mut self, extension: &Extension<Self>) {
        ExtensionSet::clear(self.extensions_mut(), extension.number())
    }

    fn get_repeated_extension<'a>(&'a self, extension: &RepeatedExtension<Self>) -> Option<&'a [Value]> {
        ExtensionSet::get_repeated(self.extensions(), extension)
    }

    fn get_or_initialize_extension(&mut self, extension: &RepeatedExtension<Self>) -> &mut Vec<Value> {
        ExtensionSet::get_or_initialize(self.extensions_mut(), extension)
    }

    fn clear_repeated_extension(&mut self, extension: &RepeatedExtension<Self>) {
        ExtensionSet::clear(self.extensions_mut(), extension.number())
    }
}
