//! The read cursor.
//!
//! [`CodedReader`] decodes wire primitives from any [`ReadSource`]. It tracks an
//! absolute position across windows, a stack of nested limits (one per open
//! length-delimited message), the nesting depth and a cap on total bytes read.
//!
//! Within a window the cursor only ever sees bytes up to the innermost limit: whatever
//! lies beyond is set aside in `size_after_limit` and restored when the limit is popped.
//! Scalar reads therefore cannot overrun a nested message by construction.

use crate::codec::CodecError;
use crate::extension::ExtensionRegistry;
use crate::message::Message;
use crate::source::{ChunkedSource, ReadSource, SliceSource, StreamSource};
use crate::varint::{self, MAX_VARINT64_LEN};
use crate::wire::{self, make_tag, tag_field_number, tag_wire_type, WireType};
use bytes::Buf;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, trace};

/// Nesting depth allowed unless configured otherwise.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Total bytes a reader may pull from its source unless configured otherwise.
pub const DEFAULT_SIZE_LIMIT: u64 = u64::MAX;

const NO_LIMIT: u64 = u64::MAX;

/// Parse-time configuration, fixed when the reader is created.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum nesting of messages and groups.
    pub recursion_limit: usize,
    /// Maximum number of bytes read from the source, counted per window.
    pub size_limit: u64,
    /// Skip unknown fields instead of preserving them.
    pub discard_unknown_fields: bool,
    /// Consulted when a message meets a field number it does not define.
    pub extension_registry: Option<Arc<ExtensionRegistry>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            size_limit: DEFAULT_SIZE_LIMIT,
            discard_unknown_fields: false,
            extension_registry: None,
        }
    }
}

impl ParseOptions {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn with_discard_unknown_fields(mut self, discard: bool) -> Self {
        self.discard_unknown_fields = discard;
        self
    }

    pub fn with_extension_registry(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        self.extension_registry = Some(registry);
        self
    }
}

/// Decodes wire-format primitives from a [`ReadSource`].
#[derive(Debug)]
pub struct CodedReader<S> {
    source: S,
    /// Offset of the next unread byte in the current window.
    pos: usize,
    /// Usable length of the current window, clamped to the current limit.
    size: usize,
    /// Bytes of the current window hidden beyond the current limit.
    size_after_limit: usize,
    /// Bytes in all windows before the current one.
    total_bytes_retired: u64,
    /// Absolute position the cursor may not pass, or `NO_LIMIT`.
    current_limit: u64,
    last_tag: u32,
    next_tag: Option<u32>,
    recursion_depth: usize,
    options: ParseOptions,
}

impl<'a> CodedReader<SliceSource<'a>> {
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(SliceSource::new(data))
    }
}

impl<R: Read> CodedReader<StreamSource<R>> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(StreamSource::new(reader))
    }
}

impl<B: Buf> CodedReader<ChunkedSource<B>> {
    pub fn from_buf(buf: B) -> Self {
        Self::new(ChunkedSource::new(buf))
    }
}

impl<S: ReadSource> CodedReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, ParseOptions::default())
    }

    pub fn with_options(source: S, options: ParseOptions) -> Self {
        CodedReader {
            source,
            pos: 0,
            size: 0,
            size_after_limit: 0,
            total_bytes_retired: 0,
            current_limit: NO_LIMIT,
            last_tag: 0,
            next_tag: None,
            recursion_depth: 0,
            options,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn discard_unknown_fields(&self) -> bool {
        self.options.discard_unknown_fields
    }

    pub fn extension_registry(&self) -> Option<&ExtensionRegistry> {
        self.options.extension_registry.as_deref()
    }

    /// The tag most recently returned by [`read_tag`](Self::read_tag), 0 at end of scope.
    pub fn last_tag(&self) -> u32 {
        self.last_tag
    }

    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    /// Absolute number of bytes consumed.
    pub fn position(&self) -> u64 {
        self.total_bytes_retired + self.pos as u64
    }

    /// Absolute position of the innermost limit, or `None` when unbounded.
    pub fn current_limit(&self) -> Option<u64> {
        if self.current_limit == NO_LIMIT {
            None
        } else {
            Some(self.current_limit)
        }
    }

    /// Bytes left before the innermost limit, or `None` when unbounded.
    pub fn bytes_until_limit(&self) -> Option<u64> {
        self.current_limit().map(|limit| limit - self.position())
    }

    pub fn into_source(self) -> S {
        self.source
    }

    // ---- Windows -------------------------------------------------------------------

    /// Moves to the next window. With `must_succeed` an exhausted source or a reached
    /// limit is an error; otherwise it is reported as `Ok(false)`.
    fn refill(&mut self, must_succeed: bool) -> Result<bool, CodecError> {
        if self.pos < self.size {
            return Err(CodecError::InvalidOperation(
                "refill called before the current window was consumed",
            ));
        }
        if self.total_bytes_retired + self.size as u64 == self.current_limit {
            return if must_succeed {
                debug!(limit = self.current_limit, "read past the end of a nested message");
                Err(CodecError::TruncatedMessage)
            } else {
                Ok(false)
            };
        }

        self.total_bytes_retired += self.size as u64;
        self.pos = 0;
        self.size = 0;
        self.size_after_limit = 0;

        let n = self.source.next_window()?;
        if n == 0 {
            return if must_succeed {
                debug!(position = self.total_bytes_retired, "source exhausted");
                Err(CodecError::TruncatedMessage)
            } else {
                Ok(false)
            };
        }
        self.size = n;
        self.recompute_size_after_limit();

        let total = self.total_bytes_retired + self.size as u64 + self.size_after_limit as u64;
        if total > self.options.size_limit {
            debug!(total, limit = self.options.size_limit, "size limit exceeded");
            return Err(CodecError::SizeLimitExceeded);
        }
        trace!(retired = self.total_bytes_retired, window = n, "refilled read window");
        Ok(true)
    }

    fn recompute_size_after_limit(&mut self) {
        self.size += self.size_after_limit;
        let window_end = self.total_bytes_retired + self.size as u64;
        if window_end > self.current_limit {
            self.size_after_limit = (window_end - self.current_limit) as usize;
            self.size -= self.size_after_limit;
        } else {
            self.size_after_limit = 0;
        }
    }

    /// Bytes of the current window not yet consumed.
    fn available(&self) -> &[u8] {
        &self.source.window()[self.pos..self.size]
    }

    /// True when no bytes remain in scope: the innermost limit is reached or the source
    /// is exhausted.
    pub fn is_at_end(&mut self) -> Result<bool, CodecError> {
        Ok(self.pos == self.size && !self.refill(false)?)
    }

    // ---- Limits --------------------------------------------------------------------

    /// Narrows the readable range to the next `byte_limit` bytes and returns the previous
    /// limit, to be handed back to [`pop_limit`](Self::pop_limit).
    pub fn push_limit(&mut self, byte_limit: usize) -> Result<u64, CodecError> {
        let new_limit = self.position().saturating_add(byte_limit as u64);
        let old_limit = self.current_limit;
        if new_limit > old_limit {
            debug!(new_limit, old_limit, "nested length runs past its enclosing message");
            return Err(CodecError::TruncatedMessage);
        }
        self.current_limit = new_limit;
        self.recompute_size_after_limit();
        Ok(old_limit)
    }

    pub fn pop_limit(&mut self, old_limit: u64) {
        self.current_limit = old_limit;
        self.recompute_size_after_limit();
    }

    /// True if a limit is in force and the cursor sits exactly on it.
    pub fn reached_limit(&self) -> bool {
        self.current_limit != NO_LIMIT && self.position() == self.current_limit
    }

    fn validate_current_limit(&self, length: usize) -> Result<(), CodecError> {
        if self.position().saturating_add(length as u64) > self.current_limit {
            return Err(CodecError::TruncatedMessage);
        }
        Ok(())
    }

    // ---- Raw primitives ------------------------------------------------------------

    pub fn read_raw_byte(&mut self) -> Result<u8, CodecError> {
        if self.pos == self.size {
            self.refill(true)?;
        }
        let b = self.source.window()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_raw_varint64(&mut self) -> Result<u64, CodecError> {
        let window = self.available();
        if window.len() >= MAX_VARINT64_LEN || window.iter().any(|&b| b < 0x80) {
            let (value, n) = varint::decode_varint64(window)?;
            self.pos += n;
            return Ok(value);
        }
        // The varint straddles a window boundary.
        let mut result = 0u64;
        for i in 0..MAX_VARINT64_LEN {
            let b = self.read_raw_byte()?;
            result |= ((b & 0x7F) as u64) << (7 * i);
            if b < 0x80 {
                return Ok(result);
            }
        }
        Err(CodecError::MalformedVarint)
    }

    /// Reads a varint and keeps the low 32 bits. Up to ten bytes are accepted, since
    /// negative `int32` values are written sign-extended.
    pub fn read_raw_varint32(&mut self) -> Result<u32, CodecError> {
        self.read_raw_varint64().map(|v| v as u32)
    }

    pub fn read_raw_little_endian32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        self.read_raw_array(&mut buf)?;
        Ok(varint::decode_fixed32(&buf))
    }

    pub fn read_raw_little_endian64(&mut self) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        self.read_raw_array(&mut buf)?;
        Ok(varint::decode_fixed64(&buf))
    }

    fn read_raw_array(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
        let window = self.available();
        if window.len() >= out.len() {
            out.copy_from_slice(&window[..out.len()]);
            self.pos += out.len();
            return Ok(());
        }
        for b in out.iter_mut() {
            *b = self.read_raw_byte()?;
        }
        Ok(())
    }

    /// Reads exactly `length` bytes.
    ///
    /// The buffer is only sized up front when the source can vouch for that many bytes;
    /// otherwise it grows as data actually arrives, so a hostile length cannot force a
    /// huge allocation.
    pub fn read_raw_bytes(&mut self, length: usize) -> Result<Vec<u8>, CodecError> {
        if length <= self.size - self.pos {
            let out = self.available()[..length].to_vec();
            self.pos += length;
            return Ok(out);
        }
        self.validate_current_limit(length)?;

        let vouched = self
            .source
            .remaining_hint()
            .map_or(false, |remaining| remaining.saturating_sub(self.pos as u64) >= length as u64);
        let mut out = if vouched {
            Vec::with_capacity(length)
        } else {
            Vec::with_capacity(self.size - self.pos)
        };

        let mut remaining = length;
        while remaining > 0 {
            if self.pos == self.size {
                self.refill(true)?;
            }
            let n = remaining.min(self.size - self.pos);
            out.extend_from_slice(&self.available()[..n]);
            self.pos += n;
            remaining -= n;
        }
        Ok(out)
    }

    pub fn skip_raw_bytes(&mut self, length: usize) -> Result<(), CodecError> {
        if length <= self.size - self.pos {
            self.pos += length;
            return Ok(());
        }
        self.validate_current_limit(length)?;
        let mut remaining = length;
        loop {
            let n = remaining.min(self.size - self.pos);
            self.pos += n;
            remaining -= n;
            if remaining == 0 {
                return Ok(());
            }
            self.refill(true)?;
        }
    }

    /// Reads a length prefix. Values that are negative as a signed 32-bit integer are
    /// rejected.
    pub fn read_length(&mut self) -> Result<usize, CodecError> {
        let length = self.read_raw_varint32()? as i32;
        if length < 0 {
            return Err(CodecError::NegativeSize);
        }
        Ok(length as usize)
    }

    // ---- Tags ----------------------------------------------------------------------

    /// Reads the next tag, or returns 0 at the end of the current scope.
    pub fn read_tag(&mut self) -> Result<u32, CodecError> {
        if let Some(tag) = self.next_tag.take() {
            self.last_tag = tag;
            return Ok(tag);
        }
        if self.is_at_end()? {
            self.last_tag = 0;
            return Ok(0);
        }
        let tag = self.read_raw_varint32()?;
        if tag_field_number(tag) == 0 {
            return Err(CodecError::InvalidTag(tag));
        }
        tag_wire_type(tag)?;
        self.last_tag = tag;
        Ok(tag)
    }

    /// Returns the next tag without consuming it. The following
    /// [`read_tag`](Self::read_tag) returns the same value.
    pub fn peek_tag(&mut self) -> Result<u32, CodecError> {
        if let Some(tag) = self.next_tag {
            return Ok(tag);
        }
        let saved = self.last_tag;
        let tag = self.read_tag()?;
        self.next_tag = Some(tag);
        self.last_tag = saved;
        Ok(tag)
    }

    /// Consumes the next tag only if it equals `tag`.
    pub fn maybe_consume_tag(&mut self, tag: u32) -> Result<bool, CodecError> {
        if self.peek_tag()? == tag {
            self.next_tag = None;
            self.last_tag = tag;
            return Ok(true);
        }
        Ok(false)
    }

    /// Fails with [`CodecError::MoreDataAvailable`] unless the last `read_tag` reported
    /// the end of the input.
    pub fn check_read_end_of_input_tag(&self) -> Result<(), CodecError> {
        if self.last_tag != 0 {
            return Err(CodecError::MoreDataAvailable);
        }
        Ok(())
    }

    // ---- Skipping ------------------------------------------------------------------

    /// Skips the value of the field whose tag was just read.
    pub fn skip_last_field(&mut self) -> Result<(), CodecError> {
        if self.last_tag == 0 {
            return Err(CodecError::InvalidOperation("skip_last_field called at end of input"));
        }
        match tag_wire_type(self.last_tag)? {
            WireType::StartGroup => self.skip_group(self.last_tag),
            WireType::EndGroup => Err(CodecError::InvalidOperation(
                "skip_last_field called on an end-group tag",
            )),
            WireType::Fixed32 => self.skip_raw_bytes(4),
            WireType::Fixed64 => self.skip_raw_bytes(8),
            WireType::LengthDelimited => {
                let length = self.read_length()?;
                self.skip_raw_bytes(length)
            }
            WireType::Varint => self.read_raw_varint32().map(|_| ()),
        }
    }

    fn skip_group(&mut self, start_tag: u32) -> Result<(), CodecError> {
        self.enter_nested()?;
        let end_tag = loop {
            let tag = self.read_tag()?;
            if tag == 0 {
                return Err(CodecError::TruncatedMessage);
            }
            if wire::is_end_group_tag(tag) {
                break tag;
            }
            self.skip_last_field()?;
        };
        self.recursion_depth -= 1;
        if tag_field_number(end_tag) != tag_field_number(start_tag) {
            return Err(CodecError::MismatchedEndGroup {
                start: tag_field_number(start_tag),
                end: tag_field_number(end_tag),
            });
        }
        Ok(())
    }

    fn enter_nested(&mut self) -> Result<(), CodecError> {
        if self.recursion_depth >= self.options.recursion_limit {
            debug!(limit = self.options.recursion_limit, "recursion limit exceeded");
            return Err(CodecError::RecursionLimitExceeded);
        }
        self.recursion_depth += 1;
        Ok(())
    }

    // ---- Nested values -------------------------------------------------------------

    /// Reads a length-prefixed embedded message into `message`, merging with its
    /// current contents.
    pub fn read_message<M: Message>(&mut self, message: &mut M) -> Result<(), CodecError> {
        let length = self.read_length()?;
        if self.recursion_depth >= self.options.recursion_limit {
            debug!(limit = self.options.recursion_limit, "recursion limit exceeded");
            return Err(CodecError::RecursionLimitExceeded);
        }
        let old_limit = self.push_limit(length)?;
        self.recursion_depth += 1;
        message.merge_from(self)?;
        self.check_read_end_of_input_tag()?;
        if !self.reached_limit() {
            return Err(CodecError::TruncatedMessage);
        }
        self.recursion_depth -= 1;
        self.pop_limit(old_limit);
        Ok(())
    }

    /// Reads a group into `message`. The start-group tag must be the last tag read; the
    /// message's merge loop stops on the matching end-group tag.
    pub fn read_group<M: Message>(&mut self, message: &mut M) -> Result<(), CodecError> {
        let start_tag = self.last_tag;
        if start_tag == 0 || tag_wire_type(start_tag)? != WireType::StartGroup {
            return Err(CodecError::InvalidOperation(
                "read_group called without a start-group tag",
            ));
        }
        self.enter_nested()?;
        message.merge_from(self)?;
        self.check_last_tag_was_end_group(start_tag)?;
        self.recursion_depth -= 1;
        Ok(())
    }

    fn check_last_tag_was_end_group(&self, start_tag: u32) -> Result<(), CodecError> {
        let end_tag = self.last_tag;
        if end_tag == 0 {
            return Err(CodecError::TruncatedMessage);
        }
        let expected = make_tag(tag_field_number(start_tag), WireType::EndGroup);
        if end_tag != expected {
            return Err(CodecError::MismatchedEndGroup {
                start: tag_field_number(start_tag),
                end: tag_field_number(end_tag),
            });
        }
        Ok(())
    }

    // ---- Typed values --------------------------------------------------------------

    pub fn read_double(&mut self) -> Result<f64, CodecError> {
        self.read_raw_little_endian64().map(f64::from_bits)
    }

    pub fn read_float(&mut self) -> Result<f32, CodecError> {
        self.read_raw_little_endian32().map(f32::from_bits)
    }

    pub fn read_uint64(&mut self) -> Result<u64, CodecError> {
        self.read_raw_varint64()
    }

    pub fn read_int64(&mut self) -> Result<i64, CodecError> {
        self.read_raw_varint64().map(|v| v as i64)
    }

    pub fn read_int32(&mut self) -> Result<i32, CodecError> {
        self.read_raw_varint32().map(|v| v as i32)
    }

    pub fn read_fixed64(&mut self) -> Result<u64, CodecError> {
        self.read_raw_little_endian64()
    }

    pub fn read_fixed32(&mut self) -> Result<u32, CodecError> {
        self.read_raw_little_endian32()
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        self.read_raw_varint64().map(|v| v != 0)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let length = self.read_length()?;
        let bytes = self.read_raw_bytes(length)?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let length = self.read_length()?;
        self.read_raw_bytes(length)
    }

    pub fn read_uint32(&mut self) -> Result<u32, CodecError> {
        self.read_raw_varint32()
    }

    pub fn read_enum(&mut self) -> Result<i32, CodecError> {
        self.read_int32()
    }

    pub fn read_sfixed32(&mut self) -> Result<i32, CodecError> {
        self.read_raw_little_endian32().map(|v| v as i32)
    }

    pub fn read_sfixed64(&mut self) -> Result<i64, CodecError> {
        self.read_raw_little_endian64().map(|v| v as i64)
    }

    pub fn read_sint32(&mut self) -> Result<i32, CodecError> {
        self.read_raw_varint32().map(wire::zigzag_decode32)
    }

    pub fn read_sint64(&mut self) -> Result<i64, CodecError> {
        self.read_raw_varint64().map(wire::zigzag_decode64)
    }
}
