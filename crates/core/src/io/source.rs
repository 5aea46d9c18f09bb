use std::io::BufRead;

use super::{ByteSource, LineError};

/// Streaming source over any buffered reader.
///
/// End of input is whatever the reader says it is: reading past the end fails
/// with an `UnexpectedEof` I/O error, surfaced as [`LineError::Io`].
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    position: u64,
}

impl<R: BufRead> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> ByteSource for StreamSource<R> {
    fn position(&self) -> u64 {
        self.position
    }

    fn next_byte(&mut self) -> Result<u8, LineError> {
        let mut byte = [0u8; 1];
        self.inner
            .read_exact(&mut byte)
            .map_err(|source| LineError::Io { offset: self.position, source })?;
        self.position += 1;
        Ok(byte[0])
    }

    fn is_exhausted(&mut self) -> Result<bool, LineError> {
        let buffered = self
            .inner
            .fill_buf()
            .map_err(|source| LineError::Io { offset: self.position, source })?;
        Ok(buffered.is_empty())
    }
}

/// Source over fully loaded bytes with a known length.
///
/// The length is checked before every read; running off the end fails with
/// [`LineError::Truncated`] instead of delegating to anything else.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl ByteSource for SliceSource<'_> {
    fn position(&self) -> u64 {
        self.position as u64
    }

    fn next_byte(&mut self) -> Result<u8, LineError> {
        if self.position == self.bytes.len() {
            return Err(LineError::Truncated { offset: self.position as u64 });
        }
        let byte = self.bytes[self.position];
        self.position += 1;
        Ok(byte)
    }

    fn is_exhausted(&mut self) -> Result<bool, LineError> {
        Ok(self.position == self.bytes.len())
    }
}
