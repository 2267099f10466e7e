use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, UsageError};

/// Default capacity for transport-facing buffers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

const READ_CHUNK_SIZE: usize = 1024;

/// A fixed-capacity read window over an injected `Read` primitive.
///
/// Bytes are pulled from the primitive in chunks; `fill` guarantees a number
/// of unread bytes before indexed access, so callers never see a short read.
pub struct ReadBuffer<R> {
    inner: R,
    buf: BytesMut,
    capacity: usize,
}

impl<R: Read> ReadBuffer<R> {
    /// Create a read buffer with the default capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a read buffer with an explicit capacity.
    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            buf: BytesMut::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Ensure at least `n` unread bytes are buffered, invoking the underlying
    /// primitive as many times as needed.
    ///
    /// Returns `Ok(false)` if the stream ends before `n` bytes are available.
    /// Interrupted reads are retried.
    pub fn fill(&mut self, n: usize) -> Result<bool> {
        while self.buf.len() < n {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let want = chunk.len().min(self.capacity);
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => return Ok(false),
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    /// Take the next buffered byte, advancing the read cursor.
    ///
    /// Fails with a usage error if availability was not guaranteed with
    /// [`fill`](Self::fill) first.
    pub fn take_u8(&mut self) -> Result<u8> {
        if self.buf.is_empty() {
            return Err(UsageError::BufferUnderflow.into());
        }
        Ok(self.buf.get_u8())
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn unread(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying primitive.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying primitive.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the buffer and return the inner primitive. Unread buffered
    /// bytes are discarded.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// A fixed-capacity write window over an injected `Write` primitive.
///
/// `reserve` flushes buffered bytes as needed to guarantee room before the
/// caller writes raw bytes into the window.
#[derive(Debug)]
pub struct WriteBuffer<W> {
    inner: W,
    buf: BytesMut,
    capacity: usize,
}

impl<W: Write> WriteBuffer<W> {
    /// Create a write buffer with the default capacity.
    pub fn new(inner: W) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a write buffer with an explicit capacity.
    pub fn with_capacity(inner: W, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            buf: BytesMut::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Guarantee room for `n` more bytes, flushing buffered bytes to the
    /// primitive if needed. `n` must not exceed the buffer capacity.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        debug_assert!(n <= self.capacity);
        if self.buf.len() + n > self.capacity {
            self.drain()?;
        }
        Ok(())
    }

    /// Append one byte, advancing the write cursor.
    pub fn put_u8(&mut self, byte: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.put_u8(byte);
        Ok(())
    }

    /// Force all buffered bytes out and flush the primitive.
    pub fn flush(&mut self) -> Result<()> {
        self.drain()?;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn drain(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    return Err(std::io::Error::from(ErrorKind::WriteZero).into());
                }
                Ok(written) => offset += written,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.buf.clear();
        Ok(())
    }

    /// Number of bytes buffered but not yet written through.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying primitive.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying primitive.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the buffer and return the inner primitive. Buffered bytes that
    /// were never flushed are discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
