use std::collections::HashSet;

use covkeeper_core::listing::{Instruction, InstructionListing, Region};
use covkeeper_core::report::summarize;
use covkeeper_core::{Address, AddressRange};

fn range(min: u64, max: u64) -> AddressRange {
    AddressRange::new(Address::new(min), Address::new(max)).unwrap()
}

fn listing() -> InstructionListing {
    InstructionListing::new(vec![
        Instruction::new(0x100u64, 4),
        Instruction::new(0x104u64, 4),
        Instruction::new(0x200u64, 2),
        Instruction::new(0x202u64, 2),
        Instruction::new(0x300u64, 1),
    ])
    .with_regions(vec![
        Region { name: "alpha".into(), range: range(0x100, 0x107) },
        Region { name: "beta".into(), range: range(0x200, 0x203) },
        Region { name: "gamma".into(), range: range(0x300, 0x300) },
    ])
}

#[test]
fn regions_are_ordered_by_ratio_then_address() {
    let hits: HashSet<AddressRange> =
        [range(0x100, 0x103), range(0x200, 0x201), range(0x202, 0x203)].into_iter().collect();
    let summary = summarize(&listing(), &hits);

    let order: Vec<&str> = summary.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(order, vec!["beta", "alpha", "gamma"]);
    assert_eq!(summary.regions[0].ratio, 1.0);
    assert_eq!(summary.regions[1].ratio, 0.5);
    assert_eq!(summary.regions[2].hit_instructions, 0);
    assert_eq!(summary.instructions, 5);
    assert_eq!(summary.hit_instructions, 3);
    assert_eq!(summary.hit_ranges, 3);
    assert!((summary.ratio - 0.6).abs() < f64::EPSILON);
}

#[test]
fn hits_outside_regions_count_only_towards_hit_ranges() {
    let hits: HashSet<AddressRange> = [range(0x900, 0x903)].into_iter().collect();
    let summary = summarize(&listing(), &hits);
    assert_eq!(summary.hit_instructions, 0);
    assert_eq!(summary.hit_ranges, 1);
    assert_eq!(summary.ratio, 0.0);
}

#[test]
fn listing_without_regions_has_empty_summary() {
    let listing = InstructionListing::new(vec![Instruction::new(0x10u64, 1)]);
    let summary = summarize(&listing, &HashSet::new());
    assert!(summary.regions.is_empty());
    assert_eq!(summary.ratio, 0.0);
}
