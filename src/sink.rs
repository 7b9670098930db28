//! Byte sinks for [`CodedWriter`](crate::writer::CodedWriter).
//!
//! A sink lends the writer a window to fill. When the window is full the writer hands
//! back the filled length and gets a fresh window. Fixed sinks have a single window and
//! fail instead.

use crate::codec::CodecError;
use bytes::{Bytes, BytesMut};
use std::io::Write;
use tracing::debug;

/// Buffer size used by [`StreamSink`] unless told otherwise.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 4096;

/// Chunk size used by [`ChunkedSink`] unless told otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub trait WriteSink {
    fn window_mut(&mut self) -> &mut [u8];

    /// Commits the first `filled` bytes of the window and exposes a fresh one.
    fn refresh(&mut self, filled: usize) -> Result<(), CodecError>;

    /// Commits the first `filled` bytes and pushes them on to the destination. The
    /// window afterwards is empty.
    fn flush(&mut self, filled: usize) -> Result<(), CodecError> {
        self.refresh(filled)
    }

    /// True for sinks whose single window is all the space there is.
    fn is_fixed(&self) -> bool {
        false
    }
}

/// A caller-provided buffer of fixed capacity.
#[derive(Debug)]
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        SliceSink { buf }
    }
}

impl WriteSink for SliceSink<'_> {
    fn window_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    fn refresh(&mut self, filled: usize) -> Result<(), CodecError> {
        debug!(capacity = self.buf.len(), filled, "fixed output buffer is full");
        Err(CodecError::OutOfSpace)
    }

    fn flush(&mut self, _filled: usize) -> Result<(), CodecError> {
        Ok(())
    }

    fn is_fixed(&self) -> bool {
        true
    }
}

/// A blocking [`Write`] stream, written through an internal buffer.
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(inner, DEFAULT_STREAM_BUFFER_SIZE)
    }

    pub fn with_capacity(inner: W, capacity: usize) -> Self {
        StreamSink {
            inner,
            buf: vec![0u8; capacity.max(1)],
        }
    }

    /// Returns the stream. Call [`CodedWriter::flush`](crate::writer::CodedWriter::flush)
    /// first or buffered bytes are lost.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> WriteSink for StreamSink<W> {
    fn window_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn refresh(&mut self, filled: usize) -> Result<(), CodecError> {
        self.inner.write_all(&self.buf[..filled])?;
        Ok(())
    }

    fn flush(&mut self, filled: usize) -> Result<(), CodecError> {
        self.refresh(filled)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Collects output as a list of frozen [`Bytes`] chunks.
#[derive(Debug)]
pub struct ChunkedSink {
    chunk_size: usize,
    current: BytesMut,
    chunks: Vec<Bytes>,
}

impl Default for ChunkedSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedSink {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        ChunkedSink {
            chunk_size,
            current: BytesMut::zeroed(chunk_size),
            chunks: Vec::new(),
        }
    }

    /// Committed chunks. Flush the writer first to include the last partial chunk.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }

    /// Concatenation of all committed chunks.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

impl WriteSink for ChunkedSink {
    fn window_mut(&mut self) -> &mut [u8] {
        &mut self.current
    }

    fn refresh(&mut self, filled: usize) -> Result<(), CodecError> {
        if filled == 0 {
            return Ok(());
        }
        let mut chunk = std::mem::replace(&mut self.current, BytesMut::zeroed(self.chunk_size));
        chunk.truncate(filled);
        self.chunks.push(chunk.freeze());
        Ok(())
    }
}
