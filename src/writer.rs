//! The write cursor.
//!
//! [`CodedWriter`] encodes wire primitives into any [`WriteSink`]. Nested messages are
//! written length-first, with the length taken from `calculate_size`, so no output is
//! ever buffered and patched.

use crate::codec::CodecError;
use crate::message::Message;
use crate::sink::{ChunkedSink, SliceSink, StreamSink, WriteSink};
use crate::varint::{self, MAX_VARINT64_LEN};
use crate::wire::{self, make_tag, WireType};
use std::io::Write;
use tracing::{trace, warn};

/// Encodes wire-format primitives into a [`WriteSink`].
#[derive(Debug)]
pub struct CodedWriter<S> {
    sink: S,
    /// Next free byte in the current window.
    position: usize,
    /// Length of the current window.
    limit: usize,
    /// Bytes committed to the sink in earlier windows.
    committed: u64,
}

impl<'a> CodedWriter<SliceSink<'a>> {
    pub fn from_slice(buf: &'a mut [u8]) -> Self {
        Self::new(SliceSink::new(buf))
    }
}

impl<W: Write> CodedWriter<StreamSink<W>> {
    pub fn from_writer(writer: W) -> Self {
        Self::new(StreamSink::new(writer))
    }
}

impl CodedWriter<ChunkedSink> {
    pub fn chunked(chunk_size: usize) -> Self {
        Self::new(ChunkedSink::new(chunk_size))
    }
}

impl<S: WriteSink> CodedWriter<S> {
    pub fn new(mut sink: S) -> Self {
        let limit = sink.window_mut().len();
        CodedWriter {
            sink,
            position: 0,
            limit,
            committed: 0,
        }
    }

    /// Absolute number of bytes written, flushed or not.
    pub fn position(&self) -> u64 {
        self.committed + self.position as u64
    }

    /// Space left in a fixed sink; `None` for sinks that grow.
    pub fn space_left(&self) -> Option<usize> {
        if self.sink.is_fixed() {
            Some(self.limit - self.position)
        } else {
            None
        }
    }

    /// Verifies a fixed sink was filled exactly. Used after writing a message into a
    /// buffer sized by `calculate_size`.
    pub fn check_no_space_left(&self) -> Result<(), CodecError> {
        match self.space_left() {
            Some(0) => Ok(()),
            Some(_) => Err(CodecError::InvalidOperation(
                "did not write as much data as expected",
            )),
            None => Err(CodecError::InvalidOperation(
                "check_no_space_left requires a fixed-capacity sink",
            )),
        }
    }

    /// Pushes buffered bytes to the sink. A no-op for fixed sinks.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        if self.sink.is_fixed() {
            return Ok(());
        }
        self.sink.flush(self.position)?;
        self.committed += self.position as u64;
        self.position = 0;
        self.limit = self.sink.window_mut().len();
        Ok(())
    }

    /// Flushes and returns the sink.
    pub fn finish(mut self) -> Result<S, CodecError> {
        self.flush()?;
        Ok(self.sink)
    }

    /// Returns the sink without flushing.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn refresh(&mut self) -> Result<(), CodecError> {
        self.sink.refresh(self.position)?;
        self.committed += self.position as u64;
        self.position = 0;
        self.limit = self.sink.window_mut().len();
        if self.limit == 0 {
            return Err(CodecError::OutOfSpace);
        }
        trace!(committed = self.committed, window = self.limit, "refreshed write window");
        Ok(())
    }

    // ---- Raw primitives ------------------------------------------------------------

    pub fn write_raw_byte(&mut self, value: u8) -> Result<(), CodecError> {
        if self.position == self.limit {
            self.refresh()?;
        }
        self.sink.window_mut()[self.position] = value;
        self.position += 1;
        Ok(())
    }

    pub fn write_raw_bytes(&mut self, mut value: &[u8]) -> Result<(), CodecError> {
        loop {
            let n = value.len().min(self.limit - self.position);
            self.sink.window_mut()[self.position..self.position + n].copy_from_slice(&value[..n]);
            self.position += n;
            value = &value[n..];
            if value.is_empty() {
                return Ok(());
            }
            self.refresh()?;
        }
    }

    pub fn write_raw_varint64(&mut self, mut value: u64) -> Result<(), CodecError> {
        if self.limit - self.position >= MAX_VARINT64_LEN {
            let window = &mut self.sink.window_mut()[self.position..self.limit];
            self.position += varint::encode_varint64(value, window);
            return Ok(());
        }
        while value >= 0x80 {
            self.write_raw_byte((value as u8 & 0x7F) | 0x80)?;
            value >>= 7;
        }
        self.write_raw_byte(value as u8)
    }

    pub fn write_raw_varint32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_raw_varint64(value as u64)
    }

    pub fn write_raw_little_endian32(&mut self, value: u32) -> Result<(), CodecError> {
        if self.limit - self.position >= 4 {
            varint::encode_fixed32(value, &mut self.sink.window_mut()[self.position..]);
            self.position += 4;
            return Ok(());
        }
        self.write_raw_bytes(&value.to_le_bytes())
    }

    pub fn write_raw_little_endian64(&mut self, value: u64) -> Result<(), CodecError> {
        if self.limit - self.position >= 8 {
            varint::encode_fixed64(value, &mut self.sink.window_mut()[self.position..]);
            self.position += 8;
            return Ok(());
        }
        self.write_raw_bytes(&value.to_le_bytes())
    }

    pub fn write_raw_tag(&mut self, tag: u32) -> Result<(), CodecError> {
        self.write_raw_varint32(tag)
    }

    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> Result<(), CodecError> {
        self.write_raw_varint32(make_tag(field_number, wire_type))
    }

    pub fn write_length(&mut self, length: usize) -> Result<(), CodecError> {
        self.write_raw_varint32(length as u32)
    }

    // ---- Typed values --------------------------------------------------------------

    pub fn write_double(&mut self, value: f64) -> Result<(), CodecError> {
        self.write_raw_little_endian64(value.to_bits())
    }

    pub fn write_float(&mut self, value: f32) -> Result<(), CodecError> {
        self.write_raw_little_endian32(value.to_bits())
    }

    pub fn write_uint64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write_raw_varint64(value)
    }

    pub fn write_int64(&mut self, value: i64) -> Result<(), CodecError> {
        self.write_raw_varint64(value as u64)
    }

    /// Negative values are sign-extended and take ten bytes.
    pub fn write_int32(&mut self, value: i32) -> Result<(), CodecError> {
        if value >= 0 {
            self.write_raw_varint32(value as u32)
        } else {
            self.write_raw_varint64(value as i64 as u64)
        }
    }

    pub fn write_fixed64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write_raw_little_endian64(value)
    }

    pub fn write_fixed32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_raw_little_endian32(value)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.write_raw_byte(value as u8)
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_bytes(value.as_bytes())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.write_length(value.len())?;
        self.write_raw_bytes(value)
    }

    pub fn write_uint32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_raw_varint32(value)
    }

    pub fn write_enum(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_int32(value)
    }

    pub fn write_sfixed32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_raw_little_endian32(value as u32)
    }

    pub fn write_sfixed64(&mut self, value: i64) -> Result<(), CodecError> {
        self.write_raw_little_endian64(value as u64)
    }

    pub fn write_sint32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_raw_varint32(wire::zigzag_encode32(value))
    }

    pub fn write_sint64(&mut self, value: i64) -> Result<(), CodecError> {
        self.write_raw_varint64(wire::zigzag_encode64(value))
    }

    // ---- Nested values -------------------------------------------------------------

    /// Writes `message` as a length-prefixed embedded message.
    pub fn write_message<M: Message>(&mut self, message: &M) -> Result<(), CodecError> {
        let size = message.calculate_size();
        self.write_length(size)?;
        let start = self.position();
        message.write_to(self)?;
        let written = self.position() - start;
        if written != size as u64 {
            warn!(expected = size, written, "message size changed between sizing and writing");
        }
        Ok(())
    }

    /// Writes the body of a group and its end-group tag. The caller writes the
    /// start-group tag.
    pub fn write_group<M: Message>(&mut self, field_number: u32, message: &M) -> Result<(), CodecError> {
        message.write_to(self)?;
        self.write_tag(field_number, WireType::EndGroup)
    }
}
