use std::path::{Path, PathBuf};

use anyhow::Result;
use covkeeper_core::model::CancellationToken;
use covkeeper_core::ranges::RangeLineDecoder;
use covkeeper_core::report::CoverageSummary;

use crate::{import_files, open_session, parse_base};

/// Import coverage files against a binary and print per-function coverage.
pub fn summary_command(
    binary: &Path,
    arch: Option<&str>,
    base: Option<&str>,
    files: &[PathBuf],
    decoder: Box<dyn RangeLineDecoder>,
    json: bool,
    token: &CancellationToken,
) -> Result<()> {
    let session = open_session(binary, arch, parse_base(base)?, decoder)?;
    import_files(&session, files, token)?;
    let summary = session.summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

pub fn print_summary(summary: &CoverageSummary) {
    println!(
        "Coverage: {:.1}% ({}/{} instructions, {} hit ranges)",
        summary.ratio * 100.0,
        summary.hit_instructions,
        summary.instructions,
        summary.hit_ranges
    );
    if summary.regions.is_empty() {
        println!("Functions: (none)");
        return;
    }
    println!("Functions:");
    for region in &summary.regions {
        println!(
            "  {:>6.1}%  {:>5}/{:<5}  {} ({}-{})",
            region.ratio * 100.0,
            region.hit_instructions,
            region.instructions,
            region.name,
            region.start,
            region.end
        );
    }
}
