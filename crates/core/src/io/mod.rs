//! Strict line-oriented reading of coverage files.
//!
//! A coverage file is a sequence of printable-ASCII lines, each terminated by
//! a single `\n`. [`StrictLineReader`] pulls bytes one at a time from a
//! [`ByteSource`] and rejects anything outside `0x20..=0x7E` at the exact byte
//! offset where it appears.
//!
//! Two sources are provided because callers differ in what they know up front:
//! - [`StreamSource`] wraps a reader and lets the reader report exhaustion.
//! - [`SliceSource`] wraps fully loaded bytes and checks the known length
//!   before every read.

use std::io;

use thiserror::Error;

mod reader;
mod source;

pub use reader::StrictLineReader;
pub use source::{SliceSource, StreamSource};

/// Byte-level failures while reading a line.
#[derive(Debug, Error)]
pub enum LineError {
    /// A byte outside printable ASCII appeared before the terminator.
    #[error("invalid byte 0x{byte:02x} at offset {offset}")]
    InvalidByte { offset: u64, byte: u8 },

    /// A length-known source ran out before the line terminator.
    #[error("unexpected end of input at offset {offset}")]
    Truncated { offset: u64 },

    /// The underlying stream failed, including running out of bytes.
    #[error("read failed at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

impl LineError {
    /// Absolute byte offset the failure refers to.
    pub fn offset(&self) -> u64 {
        match self {
            LineError::InvalidByte { offset, .. }
            | LineError::Truncated { offset }
            | LineError::Io { offset, .. } => *offset,
        }
    }

    /// True when the failure means the input ended, for either kind of source.
    pub fn is_end_of_input(&self) -> bool {
        match self {
            LineError::Truncated { .. } => true,
            LineError::Io { source, .. } => source.kind() == io::ErrorKind::UnexpectedEof,
            LineError::InvalidByte { .. } => false,
        }
    }
}

/// A position-addressable supply of bytes.
pub trait ByteSource {
    /// Absolute offset of the next byte to be read.
    fn position(&self) -> u64;

    /// Consumes one byte and advances the cursor.
    fn next_byte(&mut self) -> Result<u8, LineError>;

    /// Whether the cursor sits at the end of the input.
    ///
    /// Whole-file parsers call this between lines to decide whether another
    /// line follows; the line reader itself never does.
    fn is_exhausted(&mut self) -> Result<bool, LineError>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn position(&self) -> u64 {
        (**self).position()
    }

    fn next_byte(&mut self) -> Result<u8, LineError> {
        (**self).next_byte()
    }

    fn is_exhausted(&mut self) -> Result<bool, LineError> {
        (**self).is_exhausted()
    }
}
