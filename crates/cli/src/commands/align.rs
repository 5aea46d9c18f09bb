use std::path::{Path, PathBuf};

use anyhow::Result;
use covkeeper_core::model::CancellationToken;
use covkeeper_core::ranges::HexRangeDecoder;
use covkeeper_core::AddressRange;
use serde::Serialize;

use crate::{import_files, open_session, parse_base};

#[derive(Debug, Serialize)]
pub struct AlignOutput {
    pub files: usize,
    pub raw_ranges: usize,
    pub hits: Vec<AddressRange>,
}

/// Import coverage files against a binary and print instruction-aligned hits
/// (or the raw union with `raw`).
pub fn align_command(
    binary: &Path,
    arch: Option<&str>,
    base: Option<&str>,
    files: &[PathBuf],
    raw: bool,
    json: bool,
    token: &CancellationToken,
) -> Result<()> {
    let session = open_session(binary, arch, parse_base(base)?, Box::new(HexRangeDecoder))?;
    let report = import_files(&session, files, token)?;

    let raw_ranges = session.raw_ranges()?;
    let ranges = if raw { raw_ranges.clone() } else { session.hits()? };

    if json {
        let output =
            AlignOutput { files: report.imported.len(), raw_ranges: raw_ranges.len(), hits: ranges };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let label = if raw { "Raw covered ranges" } else { "Instruction hits" };
    println!("{label}: {}", ranges.len());
    for range in ranges {
        println!("  {}-{}", range.start(), range.end());
    }
    Ok(())
}
