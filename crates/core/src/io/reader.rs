use super::{ByteSource, LineError};

const LINE_END: u8 = b'\n';

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Reads one strictly printable ASCII line per call.
///
/// Only `\n` terminates a line. A `\r` is validated like any other byte and
/// therefore rejected.
#[derive(Debug)]
pub struct StrictLineReader<S> {
    source: S,
}

impl<S: ByteSource> StrictLineReader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Offset of the next byte the reader will consume.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    pub fn is_exhausted(&mut self) -> Result<bool, LineError> {
        self.source.is_exhausted()
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reads bytes up to the next `\n` and returns them without the terminator.
    ///
    /// On failure the cursor stays just past the byte that failed; the partial
    /// line is discarded.
    pub fn read_line(&mut self) -> Result<String, LineError> {
        let mut line = String::new();
        loop {
            let offset = self.source.position();
            let byte = self.source.next_byte()?;
            if byte == LINE_END {
                return Ok(line);
            }
            if !is_printable(byte) {
                return Err(LineError::InvalidByte { offset, byte });
            }
            line.push(char::from(byte));
        }
    }
}
