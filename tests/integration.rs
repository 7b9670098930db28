//! Integration tests: a hand-written message with every scalar type, nesting, packed
//! fields and unknown fields, driven through every source and sink; delimited streams,
//! frames and text dumps.

use bytes::{Buf, Bytes};
use protowire::codec::CodecError;
use protowire::dump::{summary_line, unknown_fields_to_text, unknown_fields_to_text_with_limit};
use protowire::size;
use protowire::varint::varint_to_vec;
use protowire::wire::{tag_field_number, tag_wire_type, WireType};
use protowire::{
    decode_delimited_frame, encode_delimited_frame, ChunkedSource, CodedReader, CodedWriter, Message, ParseOptions,
    ReadSource, StreamSource, UnknownFieldSet, UnknownValue, WriteSink,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Record {
    /// Required.
    id: Option<i32>,
    big: i64,
    small: u32,
    large: u64,
    delta: i32,
    offset: i64,
    crc: u32,
    stamp: u64,
    signed32: i32,
    signed64: i64,
    ratio: f32,
    weight: f64,
    active: bool,
    name: String,
    payload: Vec<u8>,
    kind: i32,
    child: Option<Box<Record>>,
    samples: Vec<i64>,
    unknown: Option<UnknownFieldSet>,
}

impl Record {
    fn samples_size(&self) -> usize {
        self.samples.iter().map(|&s| size::sint64_size(s)).sum()
    }
}

impl Message for Record {
    fn merge_from<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<(), CodecError> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 {
                return Ok(());
            }
            match (tag_field_number(tag), tag_wire_type(tag)?) {
                (1, WireType::Varint) => self.id = Some(input.read_int32()?),
                (2, WireType::Varint) => self.big = input.read_int64()?,
                (3, WireType::Varint) => self.small = input.read_uint32()?,
                (4, WireType::Varint) => self.large = input.read_uint64()?,
                (5, WireType::Varint) => self.delta = input.read_sint32()?,
                (6, WireType::Varint) => self.offset = input.read_sint64()?,
                (7, WireType::Fixed32) => self.crc = input.read_fixed32()?,
                (8, WireType::Fixed64) => self.stamp = input.read_fixed64()?,
                (9, WireType::Fixed32) => self.signed32 = input.read_sfixed32()?,
                (10, WireType::Fixed64) => self.signed64 = input.read_sfixed64()?,
                (11, WireType::Fixed32) => self.ratio = input.read_float()?,
                (12, WireType::Fixed64) => self.weight = input.read_double()?,
                (13, WireType::Varint) => self.active = input.read_bool()?,
                (14, WireType::LengthDelimited) => self.name = input.read_string()?,
                (15, WireType::LengthDelimited) => self.payload = input.read_bytes()?,
                (16, WireType::Varint) => self.kind = input.read_enum()?,
                (17, WireType::LengthDelimited) => {
                    input.read_message(&mut **self.child.get_or_insert_with(Box::default))?
                }
                (18, WireType::LengthDelimited) => {
                    let length = input.read_length()?;
                    let old_limit = input.push_limit(length)?;
                    while !input.reached_limit() {
                        self.samples.push(input.read_sint64()?);
                    }
                    input.pop_limit(old_limit);
                }
                (18, WireType::Varint) => self.samples.push(input.read_sint64()?),
                _ => UnknownFieldSet::merge_unknown_field(&mut self.unknown, input)?,
            }
        }
    }

    fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        if let Some(id) = self.id {
            output.write_tag(1, WireType::Varint)?;
            output.write_int32(id)?;
        }
        if self.big != 0 {
            output.write_tag(2, WireType::Varint)?;
            output.write_int64(self.big)?;
        }
        if self.small != 0 {
            output.write_tag(3, WireType::Varint)?;
            output.write_uint32(self.small)?;
        }
        if self.large != 0 {
            output.write_tag(4, WireType::Varint)?;
            output.write_uint64(self.large)?;
        }
        if self.delta != 0 {
            output.write_tag(5, WireType::Varint)?;
            output.write_sint32(self.delta)?;
        }
        if self.offset != 0 {
            output.write_tag(6, WireType::Varint)?;
            output.write_sint64(self.offset)?;
        }
        if self.crc != 0 {
            output.write_tag(7, WireType::Fixed32)?;
            output.write_fixed32(self.crc)?;
        }
        if self.stamp != 0 {
            output.write_tag(8, WireType::Fixed64)?;
            output.write_fixed64(self.stamp)?;
        }
        if self.signed32 != 0 {
            output.write_tag(9, WireType::Fixed32)?;
            output.write_sfixed32(self.signed32)?;
        }
        if self.signed64 != 0 {
            output.write_tag(10, WireType::Fixed64)?;
            output.write_sfixed64(self.signed64)?;
        }
        if self.ratio != 0.0 {
            output.write_tag(11, WireType::Fixed32)?;
            output.write_float(self.ratio)?;
        }
        if self.weight != 0.0 {
            output.write_tag(12, WireType::Fixed64)?;
            output.write_double(self.weight)?;
        }
        if self.active {
            output.write_tag(13, WireType::Varint)?;
            output.write_bool(self.active)?;
        }
        if !self.name.is_empty() {
            output.write_tag(14, WireType::LengthDelimited)?;
            output.write_string(&self.name)?;
        }
        if !self.payload.is_empty() {
            output.write_tag(15, WireType::LengthDelimited)?;
            output.write_bytes(&self.payload)?;
        }
        if self.kind != 0 {
            output.write_tag(16, WireType::Varint)?;
            output.write_enum(self.kind)?;
        }
        if let Some(child) = &self.child {
            output.write_tag(17, WireType::LengthDelimited)?;
            output.write_message(&**child)?;
        }
        if !self.samples.is_empty() {
            output.write_tag(18, WireType::LengthDelimited)?;
            output.write_length(self.samples_size())?;
            for &s in &self.samples {
                output.write_sint64(s)?;
            }
        }
        if let Some(unknown) = &self.unknown {
            unknown.write_to(output)?;
        }
        Ok(())
    }

    fn calculate_size(&self) -> usize {
        let mut total = 0;
        if let Some(id) = self.id {
            total += 1 + size::int32_size(id);
        }
        if self.big != 0 {
            total += 1 + size::int64_size(self.big);
        }
        if self.small != 0 {
            total += 1 + size::uint32_size(self.small);
        }
        if self.large != 0 {
            total += 1 + size::uint64_size(self.large);
        }
        if self.delta != 0 {
            total += 1 + size::sint32_size(self.delta);
        }
        if self.offset != 0 {
            total += 1 + size::sint64_size(self.offset);
        }
        if self.crc != 0 {
            total += 1 + size::FIXED32_SIZE;
        }
        if self.stamp != 0 {
            total += 1 + size::FIXED64_SIZE;
        }
        if self.signed32 != 0 {
            total += 1 + size::FIXED32_SIZE;
        }
        if self.signed64 != 0 {
            total += 1 + size::FIXED64_SIZE;
        }
        if self.ratio != 0.0 {
            total += 1 + size::FLOAT_SIZE;
        }
        if self.weight != 0.0 {
            total += 1 + size::DOUBLE_SIZE;
        }
        if self.active {
            total += 1 + size::BOOL_SIZE;
        }
        if !self.name.is_empty() {
            total += 1 + size::string_size(&self.name);
        }
        if !self.payload.is_empty() {
            total += 1 + size::bytes_size(&self.payload);
        }
        if self.kind != 0 {
            total += 2 + size::enum_size(self.kind);
        }
        if let Some(child) = &self.child {
            total += 2 + size::message_size(&**child);
        }
        if !self.samples.is_empty() {
            let data = self.samples_size();
            total += 2 + size::length_size(data) + data;
        }
        total + self.unknown.as_ref().map_or(0, |u| u.calculate_size())
    }

    fn is_initialized(&self) -> bool {
        self.id.is_some() && self.child.as_ref().map_or(true, |c| c.is_initialized())
    }
}

fn full_record() -> Record {
    Record {
        id: Some(-7),
        big: -1,
        small: u32::MAX,
        large: 1 << 50,
        delta: -64,
        offset: i64::MIN,
        crc: 0xDEAD_BEEF,
        stamp: u64::MAX,
        signed32: -2,
        signed64: i64::MAX,
        ratio: 0.25,
        weight: -1.0e300,
        active: true,
        name: "sensor ✓".to_string(),
        payload: vec![0, 1, 2, 0xFF],
        kind: 3,
        child: None,
        samples: vec![0, -1, 1, 1 << 40, i64::MIN],
        unknown: None,
    }
}

fn nested_record(depth: usize) -> Record {
    let mut record = full_record();
    if depth > 1 {
        record.child = Some(Box::new(nested_record(depth - 1)));
    }
    record
}

#[test]
fn test_every_scalar_roundtrips() {
    let record = full_record();
    let bytes = record.to_bytes().expect("encode");
    assert_eq!(bytes.len(), record.calculate_size());
    let parsed = Record::parse_from_bytes(&bytes).expect("decode");
    assert_eq!(parsed, record);
    assert!(parsed.unknown.is_none());
}

#[test]
fn test_nested_size_matches_written_bytes() {
    let record = nested_record(3);
    let bytes = record.to_bytes().expect("encode");
    assert_eq!(bytes.len(), record.calculate_size());
    let parsed = Record::parse_from_bytes(&bytes).expect("decode");
    assert_eq!(parsed, record);
    let grandchild = parsed
        .child
        .as_ref()
        .and_then(|c| c.child.as_ref())
        .expect("grandchild");
    assert!(grandchild.child.is_none());

    let mut shallow = Record::default();
    let limited = ParseOptions::default().with_recursion_limit(1);
    assert!(matches!(
        shallow.merge_from_bytes_with(&bytes, limited),
        Err(CodecError::RecursionLimitExceeded)
    ));
}

#[test]
fn test_every_source_decodes_the_same() {
    let record = nested_record(2);
    let bytes = record.to_bytes().expect("encode");

    for capacity in [1usize, 3, 7, 64, 4096] {
        let mut reader = CodedReader::new(StreamSource::with_capacity(&bytes[..], capacity));
        let mut parsed = Record::default();
        parsed.merge_from(&mut reader).expect("stream");
        assert_eq!(parsed, record, "stream capacity {}", capacity);
    }

    for split in [1usize, 5, bytes.len() / 2, bytes.len() - 1] {
        let chain = Bytes::copy_from_slice(&bytes[..split]).chain(Bytes::copy_from_slice(&bytes[split..]));
        let mut reader = CodedReader::new(ChunkedSource::new(chain));
        let mut parsed = Record::default();
        parsed.merge_from(&mut reader).expect("chunked");
        assert_eq!(parsed, record, "split at {}", split);
    }
}

#[test]
fn test_every_sink_encodes_the_same() {
    let record = nested_record(2);
    let flat = record.to_bytes().expect("flat");

    let mut w = CodedWriter::from_writer(Vec::new());
    record.write_to(&mut w).expect("stream");
    assert_eq!(w.finish().expect("finish").into_inner(), flat);

    let mut w = CodedWriter::chunked(16);
    record.write_to(&mut w).expect("chunked");
    assert_eq!(w.finish().expect("finish").to_vec(), flat);
}

#[test]
fn test_unknown_fields_and_packed_samples() {
    let mut record = full_record();
    let mut extra = UnknownFieldSet::new();
    extra
        .merge_field(99, UnknownValue::LengthDelimited(b"future".to_vec()))
        .merge_field(100, UnknownValue::Fixed32(5));
    record.unknown = Some(extra);
    let bytes = record.to_bytes().expect("encode");
    let parsed = Record::parse_from_bytes(&bytes).expect("decode");
    assert_eq!(parsed, record);

    // samples arriving unpacked are merged into the same list
    let mut w = CodedWriter::from_writer(Vec::new());
    w.write_tag(1, WireType::Varint).expect("tag");
    w.write_int32(1).expect("id");
    for s in [-3i64, 4] {
        w.write_tag(18, WireType::Varint).expect("tag");
        w.write_sint64(s).expect("sample");
    }
    let unpacked = w.finish().expect("finish").into_inner();
    let parsed = Record::parse_from_bytes(&unpacked).expect("decode");
    assert_eq!(parsed.samples, vec![-3, 4]);
}

#[test]
fn test_delimited_stream_of_messages() {
    let records: Vec<Record> = (0..4)
        .map(|i| Record {
            id: Some(i),
            name: "x".repeat(i as usize * 100),
            ..Record::default()
        })
        .collect();
    let mut stream = Vec::new();
    for record in &records {
        record.write_delimited_to(&mut stream).expect("write");
    }

    let mut input = &stream[..];
    for record in &records {
        let mut parsed = Record::default();
        parsed.merge_delimited_from(&mut input).expect("read");
        assert_eq!(&parsed, record);
    }
    assert!(input.is_empty());

    let mut cut = &stream[..stream.len() - 1];
    for _ in 0..3 {
        Record::default().merge_delimited_from(&mut cut).expect("read");
    }
    assert!(matches!(
        Record::default().merge_delimited_from(&mut cut),
        Err(CodecError::TruncatedMessage)
    ));
}

#[test]
fn test_frame_removes_broken_messages() {
    let good = Record {
        id: Some(1),
        name: "ok".to_string(),
        ..Record::default()
    };
    let missing_id = Record {
        name: "no id".to_string(),
        ..Record::default()
    };
    let mut w = CodedWriter::from_writer(Vec::new());
    w.write_message(&good).expect("good");
    // body declares a 5-byte string but holds 1 byte
    w.write_raw_bytes(&[0x03, 0x72, 0x05, 0x61]).expect("corrupt");
    w.write_message(&missing_id).expect("uninitialized");
    w.write_message(&good).expect("good again");
    let frame = w.finish().expect("finish").into_inner();

    let result = decode_delimited_frame::<Record>(&frame, &ParseOptions::default()).expect("frame");
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.removed.len(), 2);
    assert_eq!(result.removed[1].reason, "message is missing required fields");
    assert_eq!(result.messages[0].message, good);
    let (start, end) = result.messages[0].byte_range;
    assert_eq!(&frame[start..end], &good.to_bytes().expect("encode")[..]);

    let reencoded = encode_delimited_frame(&result).expect("encode frame");
    let mut expected = CodedWriter::from_writer(Vec::new());
    expected.write_message(&good).expect("good");
    expected.write_message(&good).expect("good");
    assert_eq!(reencoded, expected.finish().expect("finish").into_inner());
}

#[test]
fn test_frame_with_broken_length_prefix_fails() {
    let frame = [0x02u8, 0x08, 0x01, 0x10, 0x08];
    assert!(matches!(
        decode_delimited_frame::<Record>(&frame, &ParseOptions::default()),
        Err(CodecError::TruncatedMessage)
    ));
}

#[test]
fn test_dump_text() {
    let mut fields = UnknownFieldSet::new();
    fields
        .merge_field(1, UnknownValue::Varint(150))
        .merge_field(2, UnknownValue::LengthDelimited(b"hi".to_vec()))
        .merge_field(3, UnknownValue::Fixed32(1))
        .merge_field(4, UnknownValue::LengthDelimited(vec![0x08, 0x01]))
        .merge_field(5, UnknownValue::LengthDelimited(vec![0xFF]));
    let text = unknown_fields_to_text(&fields, 0);
    assert_eq!(text, "1: 150\n2: \"hi\"\n3: 0x00000001\n4 {\n  1: 1\n}\n5: hex(ff)");
    assert_eq!(summary_line(&fields), "1: 150");
}

/// `08 01` wrapped in `depth` layers of field 1, length-delimited.
fn deeply_nested(depth: usize) -> Vec<u8> {
    let mut lengths = vec![2usize];
    for _ in 1..depth {
        let inner = lengths[lengths.len() - 1];
        lengths.push(1 + size::length_size(inner) + inner);
    }
    let mut out = Vec::new();
    for &length in lengths.iter().rev() {
        out.push(0x0A);
        out.extend(varint_to_vec(length as u64));
    }
    out.extend_from_slice(&[0x08, 0x01]);
    out
}

#[test]
fn test_dump_depth_is_bounded() {
    let fields = UnknownFieldSet::parse_from_bytes(&deeply_nested(200)).expect("parse");
    let text = unknown_fields_to_text(&fields, 0);
    assert_eq!(text.lines().filter(|l| l.ends_with('{')).count(), 10);
    assert_eq!(text.lines().filter(|l| l.contains("hex(")).count(), 1);

    let text = unknown_fields_to_text_with_limit(&fields, 0, 3);
    assert_eq!(text.lines().filter(|l| l.ends_with('{')).count(), 3);
    assert!(text.lines().nth(3).expect("fourth line").trim_start().starts_with("1: hex(0a "));
}

#[test]
fn test_dump_of_very_deep_input_does_not_recurse() {
    let bytes = deeply_nested(20_000);
    let fields = UnknownFieldSet::parse_from_bytes(&bytes).expect("parse");
    let text = unknown_fields_to_text(&fields, 0);
    assert_eq!(text.lines().filter(|l| l.ends_with('{')).count(), 10);
    assert_eq!(summary_line(&fields), "1 {");
}

#[test]
fn test_dump_elides_groups_past_budget() {
    let mut fields = UnknownFieldSet::new();
    fields.merge_field(1, UnknownValue::Varint(1));
    for _ in 0..12 {
        let mut outer = UnknownFieldSet::new();
        outer.merge_field(2, UnknownValue::Group(fields));
        fields = outer;
    }
    let text = unknown_fields_to_text(&fields, 0);
    assert_eq!(text.lines().filter(|l| l.ends_with('{')).count(), 10);
    assert_eq!(text.lines().filter(|l| l.trim() == "2 { ... }").count(), 1);
    assert!(!text.contains("1: 1"));
}

#[test]
fn test_delimited_read_honors_options() {
    let record = Record {
        id: Some(1),
        name: "y".repeat(300),
        ..Record::default()
    };
    let mut stream = Vec::new();
    record.write_delimited_to(&mut stream).expect("write");

    let mut input = &stream[..];
    assert!(matches!(
        Record::default().merge_delimited_from_with(&mut input, ParseOptions::default().with_size_limit(100)),
        Err(CodecError::SizeLimitExceeded)
    ));

    let nested = nested_record(3);
    let mut stream = Vec::new();
    nested.write_delimited_to(&mut stream).expect("write");
    let mut input = &stream[..];
    assert!(matches!(
        Record::default().merge_delimited_from_with(&mut input, ParseOptions::default().with_recursion_limit(1)),
        Err(CodecError::RecursionLimitExceeded)
    ));

    let mut input = &stream[..];
    let mut parsed = Record::default();
    parsed
        .merge_delimited_from_with(&mut input, ParseOptions::default().with_recursion_limit(2))
        .expect("two levels of nesting fit");
    assert_eq!(parsed, nested);
}
