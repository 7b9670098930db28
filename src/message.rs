//! The contract every encodable message implements.
//!
//! A message merges fields from a [`CodedReader`] until `read_tag` returns 0 or an
//! end-group tag, writes its fields to a [`CodedWriter`], and reports its exact encoded
//! size. Everything else here is built on those three methods.

use crate::codec::CodecError;
use crate::reader::{CodedReader, ParseOptions};
use crate::sink::WriteSink;
use crate::source::{ReadSource, SliceSource, StreamSource};
use crate::varint;
use crate::writer::CodedWriter;
use std::io::{Read, Write};

pub trait Message {
    /// Reads fields from `input` and merges them into `self`.
    ///
    /// Implementations loop on [`CodedReader::read_tag`] and return when it yields 0 or
    /// an end-group tag. Unrecognized fields go to the message's unknown field set or,
    /// when extensions are supported, to its extension set first.
    fn merge_from<S: ReadSource>(&mut self, input: &mut CodedReader<S>) -> Result<(), CodecError>;

    fn write_to<S: WriteSink>(&self, output: &mut CodedWriter<S>) -> Result<(), CodecError>;

    /// Exact number of bytes [`write_to`](Message::write_to) produces.
    fn calculate_size(&self) -> usize;

    /// False if a required field is missing. Messages without required fields are always
    /// initialized.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Encodes into a buffer of exactly [`calculate_size`](Message::calculate_size) bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![0u8; self.calculate_size()];
        {
            let mut output = CodedWriter::from_slice(&mut buf);
            self.write_to(&mut output)?;
            output.check_no_space_left()?;
        }
        Ok(buf)
    }

    fn merge_from_bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.merge_from_bytes_with(data, ParseOptions::default())
    }

    fn merge_from_bytes_with(&mut self, data: &[u8], options: ParseOptions) -> Result<(), CodecError> {
        let mut input = CodedReader::with_options(SliceSource::new(data), options);
        self.merge_from(&mut input)?;
        input.check_read_end_of_input_tag()
    }

    /// Merges a message that runs to the end of `reader`.
    fn merge_from_reader<R: Read>(&mut self, reader: R) -> Result<(), CodecError> {
        self.merge_from_reader_with(reader, ParseOptions::default())
    }

    fn merge_from_reader_with<R: Read>(&mut self, reader: R, options: ParseOptions) -> Result<(), CodecError> {
        let mut input = CodedReader::with_options(StreamSource::new(reader), options);
        self.merge_from(&mut input)?;
        input.check_read_end_of_input_tag()
    }

    fn parse_from_bytes(data: &[u8]) -> Result<Self, CodecError>
    where
        Self: Default + Sized,
    {
        let mut message = Self::default();
        message.merge_from_bytes(data)?;
        Ok(message)
    }

    fn write_to_writer<W: Write>(&self, writer: W) -> Result<(), CodecError> {
        let mut output = CodedWriter::from_writer(writer);
        self.write_to(&mut output)?;
        output.flush()
    }

    /// Writes a length prefix followed by the message.
    fn write_delimited_to<W: Write>(&self, writer: W) -> Result<(), CodecError> {
        let mut output = CodedWriter::from_writer(writer);
        output.write_length(self.calculate_size())?;
        self.write_to(&mut output)?;
        output.flush()
    }

    /// Reads one length-prefixed message. Nothing past its end is consumed from
    /// `reader`, so consecutive calls read consecutive messages.
    fn merge_delimited_from<R: Read>(&mut self, reader: &mut R) -> Result<(), CodecError> {
        self.merge_delimited_from_with(reader, ParseOptions::default())
    }

    fn merge_delimited_from_with<R: Read>(&mut self, reader: &mut R, options: ParseOptions) -> Result<(), CodecError> {
        let length = varint::read_varint32_from(reader)?;
        let mut input = CodedReader::with_options(StreamSource::new(reader.take(length as u64)), options);
        self.merge_from(&mut input)?;
        input.check_read_end_of_input_tag()?;
        if input.into_source().into_inner().limit() != 0 {
            return Err(CodecError::TruncatedMessage);
        }
        Ok(())
    }
}
