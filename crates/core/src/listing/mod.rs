//! Instruction listings: the disassembler's ordered view of a program.
//!
//! The alignment model only needs a forward walk over instructions starting
//! at some address. Implementations must yield instructions in non-decreasing
//! address order and must not yield overlapping instructions.

use serde::Serialize;
use thiserror::Error;

use crate::address::{Address, AddressRange};

#[cfg(feature = "capstone-backend")]
pub mod capstone;

#[cfg(feature = "capstone-backend")]
pub use capstone::CapstoneListing;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("could not determine architecture; pass one explicitly")]
    UnknownArch,

    #[error("disassembler error: {0}")]
    Disassembler(String),

    #[error("cannot parse object file: {0}")]
    Object(String),
}

/// One disassembled instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Instruction {
    pub address: Address,
    pub length: u32,
}

impl Instruction {
    pub fn new(address: impl Into<Address>, length: u32) -> Self {
        Self { address: address.into(), length }
    }

    /// Last address the instruction occupies. A zero-length instruction
    /// occupies only its start address.
    pub fn end(&self) -> Address {
        self.address.saturating_add(u64::from(self.length.saturating_sub(1)))
    }

    /// The instruction's own span, `[address, end]`.
    pub fn span(&self) -> AddressRange {
        AddressRange::new(self.address, self.end()).unwrap_or(AddressRange::single(self.address))
    }
}

/// A named address span, usually a function, used for coverage summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    pub name: String,
    pub range: AddressRange,
}

/// Source of disassembled instructions.
pub trait Listing: Send + Sync {
    /// Instructions whose start address is at or after `start`, ascending.
    fn instructions_from(&self, start: Address) -> Box<dyn Iterator<Item = Instruction> + '_>;

    /// Named regions known to the listing.
    fn regions(&self) -> &[Region] {
        &[]
    }

    /// Instructions that start inside `range`.
    fn instructions_in(&self, range: AddressRange) -> Box<dyn Iterator<Item = Instruction> + '_> {
        Box::new(
            self.instructions_from(range.start()).take_while(move |insn| insn.address <= range.end()),
        )
    }
}

/// In-memory listing backed by a sorted instruction vector.
#[derive(Debug, Clone, Default)]
pub struct InstructionListing {
    instructions: Vec<Instruction>,
    regions: Vec<Region>,
}

impl InstructionListing {
    pub fn new(mut instructions: Vec<Instruction>) -> Self {
        instructions.sort_by_key(|insn| insn.address);
        instructions.dedup_by_key(|insn| insn.address);
        Self { instructions, regions: Vec::new() }
    }

    pub fn with_regions(mut self, mut regions: Vec<Region>) -> Self {
        regions.sort_by(|a, b| a.range.cmp(&b.range).then_with(|| a.name.cmp(&b.name)));
        self.regions = regions;
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl Listing for InstructionListing {
    fn instructions_from(&self, start: Address) -> Box<dyn Iterator<Item = Instruction> + '_> {
        let first = self.instructions.partition_point(|insn| insn.address < start);
        Box::new(self.instructions[first..].iter().copied())
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }
}
