//! Parsed coverage files.
//!
//! A [`CoverageRangeSet`] is the set of raw covered ranges read from one file.
//! Parsing is all-or-nothing: any bad byte or undecodable line rejects the
//! whole file and nothing from it is kept.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::address::AddressRange;
use crate::io::{ByteSource, LineError, SliceSource, StrictLineReader};
use crate::model::Progress;

mod decoder;

pub use decoder::{decoder_by_name, DecodeError, HexRangeDecoder, RangeLineDecoder};

/// Identity of an imported coverage file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CoverageSource {
    pub path: PathBuf,
    /// Hex SHA-256 of the file contents at import time.
    pub digest: String,
}

impl CoverageSource {
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let digest = format!("{:x}", Sha256::digest(bytes));
        Self { path: path.into(), digest }
    }
}

impl fmt::Display for CoverageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Failure importing one coverage file. Other files are unaffected.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{}: cannot read file: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {source}", file.display())]
    Format {
        file: PathBuf,
        line: usize,
        #[source]
        source: LineError,
    },

    #[error("{}:{line}: file ends without a line terminator (offset {offset})", file.display())]
    Truncated { file: PathBuf, line: usize, offset: u64 },

    #[error("{}:{line}: cannot decode {text:?}: {source}", file.display())]
    Decode {
        file: PathBuf,
        line: usize,
        text: String,
        #[source]
        source: DecodeError,
    },

    #[error("{}: import cancelled", file.display())]
    Cancelled { file: PathBuf },
}

impl ImportError {
    pub fn file(&self) -> &Path {
        match self {
            ImportError::Io { file, .. }
            | ImportError::Format { file, .. }
            | ImportError::Truncated { file, .. }
            | ImportError::Decode { file, .. }
            | ImportError::Cancelled { file } => file,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled { .. })
    }
}

/// Raw covered ranges decoded from one coverage file.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageRangeSet {
    source: CoverageSource,
    ranges: HashSet<AddressRange>,
    line_count: usize,
    imported_at: DateTime<Utc>,
}

impl CoverageRangeSet {
    /// Builds a set directly from ranges, bypassing file parsing.
    pub fn from_ranges(
        source: CoverageSource,
        ranges: impl IntoIterator<Item = AddressRange>,
    ) -> Self {
        let ranges: HashSet<AddressRange> = ranges.into_iter().collect();
        Self { source, line_count: ranges.len(), ranges, imported_at: Utc::now() }
    }

    /// Reads and parses `path` as a complete coverage file.
    pub fn import(
        path: impl AsRef<Path>,
        decoder: &dyn RangeLineDecoder,
        progress: &dyn Progress,
    ) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|source| ImportError::Io { file: path.to_path_buf(), source })?;
        let source = CoverageSource::from_bytes(path, &bytes);
        Self::parse(source, &bytes, decoder, progress)
    }

    /// Parses fully loaded file contents.
    pub fn parse(
        source: CoverageSource,
        bytes: &[u8],
        decoder: &dyn RangeLineDecoder,
        progress: &dyn Progress,
    ) -> Result<Self, ImportError> {
        Self::parse_from(source, SliceSource::new(bytes), decoder, progress)
    }

    /// Parses lines from any byte source until it is exhausted at a line boundary.
    pub fn parse_from<S: ByteSource>(
        source: CoverageSource,
        bytes: S,
        decoder: &dyn RangeLineDecoder,
        progress: &dyn Progress,
    ) -> Result<Self, ImportError> {
        let file = source.path.clone();
        let mut reader = StrictLineReader::new(bytes);
        let mut ranges = HashSet::new();
        let mut line_no = 0usize;

        loop {
            let at_end = reader
                .is_exhausted()
                .map_err(|e| ImportError::Format { file: file.clone(), line: line_no + 1, source: e })?;
            if at_end {
                break;
            }
            line_no += 1;
            if progress.check_cancelled().is_err() {
                tracing::warn!(file = %file.display(), line = line_no, "import cancelled");
                return Err(ImportError::Cancelled { file });
            }

            let text = reader.read_line().map_err(|e| {
                if e.is_end_of_input() {
                    ImportError::Truncated { file: file.clone(), line: line_no, offset: e.offset() }
                } else {
                    ImportError::Format { file: file.clone(), line: line_no, source: e }
                }
            })?;

            match decoder.decode(&text) {
                Ok(Some(range)) => {
                    ranges.insert(range);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ImportError::Decode { file, line: line_no, text, source: e });
                }
            }
        }

        tracing::debug!(
            file = %file.display(),
            lines = line_no,
            ranges = ranges.len(),
            decoder = decoder.name(),
            "parsed coverage file"
        );
        Ok(Self { source, ranges, line_count: line_no, imported_at: Utc::now() })
    }

    pub fn source(&self) -> &CoverageSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }

    pub fn ranges(&self) -> &HashSet<AddressRange> {
        &self.ranges
    }

    /// Ranges sorted by address.
    pub fn sorted_ranges(&self) -> Vec<AddressRange> {
        let mut ranges: Vec<AddressRange> = self.ranges.iter().copied().collect();
        ranges.sort();
        ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }
}
