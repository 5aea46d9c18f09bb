use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use covkeeper_core::model::Unbounded;
use covkeeper_core::ranges::{CoverageRangeSet, HexRangeDecoder};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FileCheck {
    pub path: PathBuf,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse each file on its own and report what it contains.
pub fn check_files(files: &[PathBuf]) -> Vec<FileCheck> {
    files
        .iter()
        .map(|path| match CoverageRangeSet::import(path, &HexRangeDecoder, &Unbounded) {
            Ok(set) => FileCheck {
                path: path.clone(),
                ok: true,
                lines: Some(set.line_count()),
                ranges: Some(set.len()),
                digest: Some(set.source().digest.clone()),
                error: None,
            },
            Err(err) => FileCheck {
                path: path.clone(),
                ok: false,
                lines: None,
                ranges: None,
                digest: None,
                error: Some(err.to_string()),
            },
        })
        .collect()
}

/// Validate coverage files without a binary. Fails if any file is rejected.
pub fn check_command(files: &[PathBuf], json: bool) -> Result<()> {
    let results = check_files(files);
    let failures = results.iter().filter(|r| !r.ok).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Coverage files:");
        for result in &results {
            print_check(&result.path, result);
        }
    }

    if failures > 0 {
        bail!("{failures} of {} coverage file(s) failed to parse", results.len());
    }
    Ok(())
}

fn print_check(path: &Path, result: &FileCheck) {
    match (&result.error, result.ranges, result.lines) {
        (Some(error), _, _) => println!("- {} FAILED: {}", path.display(), error),
        (None, Some(ranges), Some(lines)) => {
            println!("- {} ok ({} ranges, {} lines)", path.display(), ranges, lines)
        }
        _ => println!("- {} ok", path.display()),
    }
}
