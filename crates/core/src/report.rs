//! Per-region coverage summaries over instruction hits.

use std::collections::HashSet;

use serde::Serialize;

use crate::address::{Address, AddressRange};
use crate::listing::Listing;

/// Coverage of one named region (usually a function).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionCoverage {
    pub name: String,
    pub start: Address,
    pub end: Address,
    pub instructions: usize,
    pub hit_instructions: usize,
    pub hit_bytes: u64,
    /// Fraction of the region's instructions that were hit, in `[0, 1]`.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    pub regions: Vec<RegionCoverage>,
    pub instructions: usize,
    pub hit_instructions: usize,
    /// Instruction hits overall, including those outside any region.
    pub hit_ranges: usize,
    pub ratio: f64,
}

fn ratio(hit: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hit as f64 / total as f64
    }
}

/// Summarizes `hits` against every region the listing knows about.
///
/// Regions are ordered by coverage ratio, highest first, then by address.
pub fn summarize(listing: &dyn Listing, hits: &HashSet<AddressRange>) -> CoverageSummary {
    let mut regions: Vec<RegionCoverage> = listing
        .regions()
        .iter()
        .map(|region| {
            let mut instructions = 0usize;
            let mut hit_instructions = 0usize;
            let mut hit_bytes = 0u64;
            for insn in listing.instructions_in(region.range) {
                instructions += 1;
                let span = insn.span();
                if hits.contains(&span) {
                    hit_instructions += 1;
                    hit_bytes += span.len();
                }
            }
            RegionCoverage {
                name: region.name.clone(),
                start: region.range.start(),
                end: region.range.end(),
                instructions,
                hit_instructions,
                hit_bytes,
                ratio: ratio(hit_instructions, instructions),
            }
        })
        .collect();

    regions.sort_by(|a, b| b.ratio.total_cmp(&a.ratio).then_with(|| a.start.cmp(&b.start)));

    let instructions = regions.iter().map(|r| r.instructions).sum();
    let hit_instructions = regions.iter().map(|r| r.hit_instructions).sum();
    CoverageSummary {
        regions,
        instructions,
        hit_instructions,
        hit_ranges: hits.len(),
        ratio: ratio(hit_instructions, instructions),
    }
}
