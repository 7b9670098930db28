//! Byte sources for [`CodedReader`](crate::reader::CodedReader).
//!
//! A source exposes its data one window at a time. Every source starts with an empty
//! window; the reader asks for the first one the same way it asks for every later one,
//! so the size limit is enforced uniformly whether the input is a flat slice, a stream
//! or a chain of chunks.

use crate::codec::CodecError;
use bytes::Buf;
use std::io::{self, Read};

/// Buffer size used by [`StreamSource`] unless told otherwise.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 4096;

pub trait ReadSource {
    /// The current window. Only the length returned by the last
    /// [`next_window`](ReadSource::next_window) is meaningful.
    fn window(&self) -> &[u8];

    /// Drops the current window and makes the next one visible, returning its length.
    /// Zero means the source is exhausted.
    fn next_window(&mut self) -> Result<usize, CodecError>;

    /// Bytes available from the start of the current window to the end of the source,
    /// when the source knows. Used to decide whether a large length can be preallocated.
    fn remaining_hint(&self) -> Option<u64> {
        None
    }
}

/// A contiguous in-memory buffer, handed out as a single window.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    started: bool,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data, started: false }
    }
}

impl ReadSource for SliceSource<'_> {
    fn window(&self) -> &[u8] {
        if self.started {
            self.data
        } else {
            &[]
        }
    }

    fn next_window(&mut self) -> Result<usize, CodecError> {
        if self.started {
            self.data = &[];
        }
        self.started = true;
        Ok(self.data.len())
    }

    fn remaining_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// A blocking [`Read`] stream, read through an internal buffer.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    buf: Vec<u8>,
    len: usize,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_STREAM_BUFFER_SIZE)
    }

    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        StreamSource {
            inner,
            buf: vec![0u8; capacity.max(1)],
            len: 0,
        }
    }

    /// Returns the stream. Bytes already buffered but not yet read are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ReadSource for StreamSource<R> {
    fn window(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn next_window(&mut self) -> Result<usize, CodecError> {
        self.len = loop {
            match self.inner.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.len = 0;
                    return Err(CodecError::Io(e));
                }
            }
        };
        Ok(self.len)
    }
}

/// A possibly non-contiguous buffer such as a `Bytes` chain; each chunk is one window.
#[derive(Debug)]
pub struct ChunkedSource<B> {
    inner: B,
    current: usize,
    started: bool,
}

impl<B: Buf> ChunkedSource<B> {
    pub fn new(inner: B) -> Self {
        ChunkedSource {
            inner,
            current: 0,
            started: false,
        }
    }

    /// Returns the buffer, positioned after the last window handed out.
    pub fn into_inner(mut self) -> B {
        self.inner.advance(self.current);
        self.inner
    }
}

impl<B: Buf> ReadSource for ChunkedSource<B> {
    fn window(&self) -> &[u8] {
        &self.inner.chunk()[..self.current]
    }

    fn next_window(&mut self) -> Result<usize, CodecError> {
        if self.started {
            self.inner.advance(self.current);
        }
        self.started = true;
        self.current = self.inner.chunk().len();
        Ok(self.current)
    }

    fn remaining_hint(&self) -> Option<u64> {
        Some(self.inner.remaining() as u64)
    }
}
