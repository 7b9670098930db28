//! Read cursor: tags, scalars, limits, refill across windows, recursion and size caps.

use bytes::{Buf, Bytes};
use protowire::codec::CodecError;
use protowire::size;
use protowire::wire::{tag_field_number, tag_wire_type, WireType};
use protowire::{
    CodedReader, CodedWriter, Message, ParseOptions, ReadSource, SliceSource, StreamSource, UnknownFieldSet,
    WriteSink,
};

/// Message whose field 1 is another `Chain`, so nesting recurses through `read_message`.
#[derive(Debug, Default)]
struct Chain {
    child: Option<Box<Chain>>,
}

impl Chain {
    fn depth(&self) -> usize {
        self.child.as_ref().map_or(0, |c| 1 + c.depth())
    }
}

impl Message for Chain {
    fn merge_from<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<(), CodecError> {
        loop {
            match input.read_tag()? {
                0 => return Ok(()),
                0x0A => {
                    let child = self.child.get_or_insert_with(Default::default);
                    input.read_message(&mut **child)?;
                }
                _ => input.skip_last_field()?,
            }
        }
    }

    fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError> {
        if let Some(child) = &self.child {
            output.write_tag(1, WireType::LengthDelimited)?;
            output.write_message(&**child)?;
        }
        Ok(())
    }

    fn calculate_size(&self) -> usize {
        self.child
            .as_ref()
            .map_or(0, |c| size::tag_size(1) + size::message_size(&**c))
    }
}

fn nested_groups(depth: usize) -> Vec<u8> {
    let mut out = vec![0x0B; depth];
    out.extend(std::iter::repeat(0x0C).take(depth));
    out
}

fn nested_messages(depth: usize) -> Vec<u8> {
    let mut inner = Vec::new();
    for _ in 0..depth {
        let mut outer = vec![0x0A, inner.len() as u8];
        outer.extend_from_slice(&inner);
        inner = outer;
    }
    inner
}

#[test]
fn test_decode_field_one_varint_300() {
    let data = [0x08, 0xAC, 0x02];
    let mut r = CodedReader::from_slice(&data);
    let tag = r.read_tag().expect("tag");
    assert_eq!(tag_field_number(tag), 1);
    assert_eq!(tag_wire_type(tag).expect("wire type"), WireType::Varint);
    assert_eq!(r.read_uint64().expect("value"), 300);
    assert_eq!(r.read_tag().expect("end"), 0);
    assert_eq!(r.position(), 3);
}

#[test]
fn test_empty_input_is_end() {
    let mut r = CodedReader::from_slice(&[]);
    assert!(r.is_at_end().expect("at end"));
    assert_eq!(r.read_tag().expect("tag"), 0);
}

#[test]
fn test_declared_length_past_end_is_truncated() {
    let data = [0x12, 0x05, b'a', b'b', b'c'];
    let mut r = CodedReader::from_slice(&data);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_bytes(), Err(CodecError::TruncatedMessage)));

    let mut r = CodedReader::from_reader(&data[..]);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_bytes(), Err(CodecError::TruncatedMessage)));
}

#[test]
fn test_huge_declared_length_on_stream_is_truncated() {
    let data = [0x12u8, 0xC0, 0x84, 0x3D, 0x01, 0x02, 0x03];
    let mut r = CodedReader::from_reader(&data[..]);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_bytes(), Err(CodecError::TruncatedMessage)));
}

#[test]
fn test_corrupt_tags_and_lengths() {
    let mut r = CodedReader::from_slice(&[0x00]);
    assert!(matches!(r.read_tag(), Err(CodecError::InvalidTag(0))));

    let mut r = CodedReader::from_slice(&[0x0E]);
    assert!(matches!(r.read_tag(), Err(CodecError::InvalidWireType(_))));

    let negative = [0x12, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    let mut r = CodedReader::from_slice(&negative);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_bytes(), Err(CodecError::NegativeSize)));

    let malformed = [0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    let mut r = CodedReader::from_slice(&malformed);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_uint64(), Err(CodecError::MalformedVarint)));

    let short_fixed = [0x0D, 0x01, 0x02];
    let mut r = CodedReader::from_slice(&short_fixed);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_fixed32(), Err(CodecError::TruncatedMessage)));

    let bad_utf8 = [0x12, 0x02, 0xC3, 0x28];
    let mut r = CodedReader::from_slice(&bad_utf8);
    r.read_tag().expect("tag");
    assert!(matches!(r.read_string(), Err(CodecError::InvalidUtf8(_))));
}

#[test]
fn test_malformed_varint_across_windows() {
    let malformed = [0xFFu8; 12];
    let mut r = CodedReader::new(StreamSource::with_capacity(&malformed[..], 3));
    assert!(matches!(r.read_uint64(), Err(CodecError::MalformedVarint)));
}

#[test]
fn test_limit_nesting() {
    let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut r = CodedReader::from_slice(&data);
    assert_eq!(r.current_limit(), None);

    let outer = r.push_limit(4).expect("outer");
    assert_eq!(r.current_limit(), Some(4));
    assert!(matches!(r.push_limit(5), Err(CodecError::TruncatedMessage)));
    assert_eq!(r.current_limit(), Some(4));

    r.read_raw_byte().expect("byte");
    let inner = r.push_limit(2).expect("inner");
    assert_eq!(inner, 4);
    assert_eq!(r.bytes_until_limit(), Some(2));
    assert_eq!(r.read_raw_bytes(2).expect("bytes"), vec![2, 3]);
    assert!(r.reached_limit());
    assert!(r.is_at_end().expect("at end"));
    assert!(matches!(r.read_raw_byte(), Err(CodecError::TruncatedMessage)));

    r.pop_limit(inner);
    assert_eq!(r.current_limit(), Some(4));
    assert!(!r.reached_limit());
    assert_eq!(r.read_raw_byte().expect("byte"), 4);
    assert!(r.reached_limit());

    r.pop_limit(outer);
    assert_eq!(r.current_limit(), None);
    assert!(!r.reached_limit());
    assert_eq!(r.read_raw_bytes(4).expect("rest"), vec![5, 6, 7, 8]);
    assert!(r.is_at_end().expect("at end"));
}

#[test]
fn test_limit_hides_bytes_in_later_windows() {
    let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut r = CodedReader::new(StreamSource::with_capacity(&data[..], 3));
    r.read_raw_byte().expect("byte");
    let old = r.push_limit(4).expect("limit");
    assert_eq!(r.read_raw_bytes(4).expect("bytes"), vec![2, 3, 4, 5]);
    assert!(r.is_at_end().expect("at end"));
    r.pop_limit(old);
    assert_eq!(r.read_raw_bytes(3).expect("rest"), vec![6, 7, 8]);
    assert_eq!(r.position(), 8);
}

#[test]
fn test_values_straddling_stream_windows() {
    let mut data = vec![0x08u8, 0xAC, 0x02, 0x11];
    data.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
    data.extend_from_slice(&[0x1A, 0x05]);
    data.extend_from_slice(b"hello");
    for capacity in 1..=7 {
        let mut r = CodedReader::new(StreamSource::with_capacity(&data[..], capacity));
        assert_eq!(r.read_tag().expect("tag"), 0x08);
        assert_eq!(r.read_uint32().expect("varint"), 300);
        assert_eq!(r.read_tag().expect("tag"), 0x11);
        assert_eq!(r.read_fixed64().expect("fixed64"), 0x0102_0304_0506_0708);
        assert_eq!(r.read_tag().expect("tag"), 0x1A);
        assert_eq!(r.read_string().expect("string"), "hello");
        assert_eq!(r.read_tag().expect("end"), 0, "capacity {}", capacity);
    }
}

#[test]
fn test_chunked_source_reads_across_chunks() {
    let first = Bytes::from_static(&[0x0A, 0x06, b'c', b'h']);
    let second = Bytes::from_static(&[b'u', b'n']);
    let third = Bytes::from_static(&[b'k', b's', 0x10, 0x96, 0x01]);
    let chain = first.chain(second).chain(third);
    let mut r = CodedReader::from_buf(chain);
    assert_eq!(r.read_tag().expect("tag"), 0x0A);
    assert_eq!(r.read_string().expect("string"), "chunks");
    assert_eq!(r.read_tag().expect("tag"), 0x10);
    assert_eq!(r.read_uint32().expect("varint"), 150);
    assert_eq!(r.read_tag().expect("end"), 0);
}

#[test]
fn test_size_limit() {
    let data = [0x08u8, 0x01, 0x10, 0x02, 0x18, 0x03];
    let options = ParseOptions::default().with_size_limit(4);
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes_with(&data, options.clone()),
        Err(CodecError::SizeLimitExceeded)
    ));

    let chain = Bytes::copy_from_slice(&data[..4]).chain(Bytes::copy_from_slice(&data[4..]));
    let mut r = CodedReader::with_options(protowire::ChunkedSource::new(chain), options);
    assert_eq!(r.read_tag().expect("tag"), 0x08);
    r.read_uint32().expect("value");
    assert_eq!(r.read_tag().expect("tag"), 0x10);
    r.read_uint32().expect("value");
    assert!(matches!(r.read_tag(), Err(CodecError::SizeLimitExceeded)));

    let mut fields = UnknownFieldSet::new();
    fields
        .merge_from_bytes_with(&data, ParseOptions::default().with_size_limit(6))
        .expect("exactly at limit");
    assert_eq!(fields.len(), 3);
}

#[test]
fn test_recursion_limit_on_groups() {
    let options = ParseOptions::default().with_recursion_limit(5);
    let mut fields = UnknownFieldSet::new();
    fields
        .merge_from_bytes_with(&nested_groups(5), options.clone())
        .expect("at limit");
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes_with(&nested_groups(6), options),
        Err(CodecError::RecursionLimitExceeded)
    ));

    let mut fields = UnknownFieldSet::new();
    fields.merge_from_bytes(&nested_groups(100)).expect("default limit");
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes(&nested_groups(101)),
        Err(CodecError::RecursionLimitExceeded)
    ));
}

#[test]
fn test_recursion_limit_on_messages() {
    let options = ParseOptions::default().with_recursion_limit(3);
    let data = nested_messages(3);
    let mut r = CodedReader::with_options(SliceSource::new(&data), options.clone());
    let mut chain = Chain::default();
    chain.merge_from(&mut r).expect("at limit");
    assert_eq!(chain.depth(), 3);
    assert_eq!(r.recursion_depth(), 0);
    assert_eq!(chain.to_bytes().expect("encode"), data);

    let mut chain = Chain::default();
    assert!(matches!(
        chain.merge_from_bytes_with(&nested_messages(4), options),
        Err(CodecError::RecursionLimitExceeded)
    ));
}

#[test]
fn test_skip_nested_groups_respects_recursion_limit() {
    let options = ParseOptions::default().with_recursion_limit(4);
    let data = nested_groups(4);
    let mut r = CodedReader::with_options(SliceSource::new(&data), options.clone());
    r.read_tag().expect("tag");
    r.skip_last_field().expect("skip");
    assert_eq!(r.read_tag().expect("end"), 0);

    let data = nested_groups(5);
    let mut r = CodedReader::with_options(SliceSource::new(&data), options);
    r.read_tag().expect("tag");
    assert!(matches!(r.skip_last_field(), Err(CodecError::RecursionLimitExceeded)));
}

#[test]
fn test_group_errors() {
    let mismatched = [0x0B, 0x08, 0x01, 0x14];
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes(&mismatched),
        Err(CodecError::MismatchedEndGroup { start: 1, end: 2 })
    ));

    let mut r = CodedReader::from_slice(&mismatched);
    r.read_tag().expect("tag");
    assert!(matches!(
        r.skip_last_field(),
        Err(CodecError::MismatchedEndGroup { start: 1, end: 2 })
    ));

    let unterminated = [0x0B, 0x08, 0x01];
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes(&unterminated),
        Err(CodecError::TruncatedMessage)
    ));

    let stray_end = [0x0C];
    let mut fields = UnknownFieldSet::new();
    assert!(matches!(
        fields.merge_from_bytes(&stray_end),
        Err(CodecError::MoreDataAvailable)
    ));
}

#[test]
fn test_nested_message_must_end_on_its_limit() {
    let end_group_inside = [0x0A, 0x01, 0x0C];
    let mut r = CodedReader::from_slice(&end_group_inside);
    r.read_tag().expect("tag");
    let mut inner = UnknownFieldSet::new();
    assert!(matches!(
        r.read_message(&mut inner),
        Err(CodecError::MoreDataAvailable)
    ));

    let overlong_field = [0x0A, 0x02, 0x08, 0xAC, 0x02];
    let mut r = CodedReader::from_slice(&overlong_field);
    r.read_tag().expect("tag");
    let mut inner = UnknownFieldSet::new();
    assert!(matches!(
        r.read_message(&mut inner),
        Err(CodecError::TruncatedMessage)
    ));
}

#[test]
fn test_skip_last_field() {
    let mut data = vec![0x08u8, 0x96, 0x01, 0x11];
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&[0x1A, 0x03, 1, 2, 3, 0x25, 0, 0, 0, 0]);
    data.extend_from_slice(&[0x2B, 0x08, 0x01, 0x2C, 0x30, 0x07]);
    let mut r = CodedReader::new(StreamSource::with_capacity(&data[..], 2));
    for _ in 0..5 {
        r.read_tag().expect("tag");
        r.skip_last_field().expect("skip");
    }
    assert_eq!(r.read_tag().expect("tag"), 0x30);
    assert_eq!(r.read_uint32().expect("value"), 7);
    assert_eq!(r.read_tag().expect("end"), 0);
    assert!(matches!(r.skip_last_field(), Err(CodecError::InvalidOperation(_))));

    let mut r = CodedReader::from_slice(&[0x0C]);
    r.read_tag().expect("tag");
    assert!(matches!(r.skip_last_field(), Err(CodecError::InvalidOperation(_))));
}

#[test]
fn test_peek_and_maybe_consume_tag() {
    let data = [0x08, 0x01, 0x10, 0x02];
    let mut r = CodedReader::from_slice(&data);
    assert_eq!(r.peek_tag().expect("peek"), 0x08);
    assert_eq!(r.peek_tag().expect("peek again"), 0x08);
    assert_eq!(r.last_tag(), 0);
    assert!(!r.maybe_consume_tag(0x10).expect("no match"));
    assert!(r.maybe_consume_tag(0x08).expect("match"));
    assert_eq!(r.last_tag(), 0x08);
    assert_eq!(r.read_uint32().expect("value"), 1);
    assert_eq!(r.read_tag().expect("tag"), 0x10);
    assert_eq!(r.read_uint32().expect("value"), 2);
    assert_eq!(r.peek_tag().expect("peek end"), 0);
    assert_eq!(r.read_tag().expect("end"), 0);
}

#[test]
fn test_negative_int32_reads_back() {
    let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    let mut r = CodedReader::from_slice(&data);
    assert_eq!(r.read_int32().expect("int32"), -1);
    let mut r = CodedReader::from_slice(&data);
    assert_eq!(r.read_int64().expect("int64"), -1);
}
