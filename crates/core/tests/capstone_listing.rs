#![cfg(feature = "capstone-backend")]

use std::collections::HashSet;

use covkeeper_core::listing::{CapstoneListing, Instruction, Listing, ListingError};
use covkeeper_core::report::summarize;
use covkeeper_core::{Address, AddressRange};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

// push rbp; mov rbp, rsp; ret
const PROLOGUE: [u8; 5] = [0x55, 0x48, 0x89, 0xE5, 0xC3];

fn starts(listing: &dyn Listing) -> Vec<(u64, u32)> {
    listing.instructions_from(Address::new(0)).map(|i| (i.address.value(), i.length)).collect()
}

fn elf_fixture(symbol_size: u64) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.section_mut(text_id).set_data(PROLOGUE.to_vec(), 1);
    obj.add_symbol(Symbol {
        name: b"entry_fn".to_vec(),
        value: 0,
        size: symbol_size,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text_id),
        flags: SymbolFlags::Elf { st_info: 0x12, st_other: 0 },
    });
    obj.write().expect("write elf fixture")
}

#[test]
fn raw_blob_is_disassembled_at_its_base() {
    let listing = CapstoneListing::from_raw(&PROLOGUE, 0x1000, "x86_64").expect("disassemble");
    assert_eq!(listing.arch(), "x86_64");
    assert_eq!(starts(&listing), vec![(0x1000, 1), (0x1001, 3), (0x1004, 1)]);
    assert!(listing.regions().is_empty());
}

#[test]
fn undecodable_bytes_are_skipped() {
    // 0x06 is not a valid opcode in 64-bit mode.
    let listing = CapstoneListing::from_raw(&[0x06, 0xC3], 0x10, "amd64").expect("disassemble");
    assert_eq!(listing.listing().instructions(), &[Instruction::new(0x11u64, 1)]);
}

#[test]
fn unsupported_architecture_is_rejected() {
    let err = CapstoneListing::from_raw(&PROLOGUE, 0, "vax").unwrap_err();
    assert!(matches!(err, ListingError::UnsupportedArch(name) if name == "vax"));
}

#[test]
fn elf_symbols_become_regions() {
    let bytes = elf_fixture(0);
    let listing = CapstoneListing::from_object(&bytes, None).expect("parse elf");
    assert_eq!(listing.arch(), "x86_64");
    assert_eq!(starts(&listing), vec![(0, 1), (1, 3), (4, 1)]);

    let regions = listing.regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name, "entry_fn");
    assert_eq!(
        regions[0].range,
        AddressRange::new(Address::new(0), Address::new(4)).unwrap()
    );
}

#[test]
fn load_detects_objects_and_falls_back_to_raw() {
    let from_elf = CapstoneListing::load(&elf_fixture(5), None, 0x8000).expect("load elf");
    assert_eq!(from_elf.regions().len(), 1);

    let from_raw = CapstoneListing::load(&PROLOGUE, None, 0x8000).expect("load raw");
    assert_eq!(starts(&from_raw)[0], (0x8000, 1));
}

#[test]
fn summary_reports_per_function_coverage() {
    let listing = CapstoneListing::from_object(&elf_fixture(5), None).expect("parse elf");
    let hits: HashSet<AddressRange> = [
        AddressRange::new(Address::new(0), Address::new(0)).unwrap(),
        AddressRange::new(Address::new(1), Address::new(3)).unwrap(),
    ]
    .into_iter()
    .collect();

    let summary = summarize(&listing, &hits);
    assert_eq!(summary.regions.len(), 1);
    let region = &summary.regions[0];
    assert_eq!(region.instructions, 3);
    assert_eq!(region.hit_instructions, 2);
    assert_eq!(region.hit_bytes, 4);
}
