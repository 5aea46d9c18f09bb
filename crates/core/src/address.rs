//! Addresses and inclusive address ranges.
//!
//! Addresses are plain 64-bit values in the host disassembler's address space;
//! nothing here remaps or rebases them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single address in the program's address space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Next address, or `None` at the top of the address space.
    pub fn successor(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Previous address, or `None` at zero.
    pub fn predecessor(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    pub fn checked_add(self, offset: u64) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    /// Adds `offset`, clamping at the top of the address space.
    pub fn saturating_add(self, offset: u64) -> Self {
        Self(self.0.saturating_add(offset))
    }

    /// Distance from `base` to `self`, or `None` when `self < base`.
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for Address {
    type Err = RangeError;

    /// Parses hexadecimal text with an optional `0x`/`0X` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RangeError::InvalidAddress(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| RangeError::InvalidAddress(s.to_string()))
    }
}

/// Errors raised while constructing addresses or ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range minimum {min} is greater than maximum {max}")]
    Inverted { min: Address, max: Address },

    #[error("range starting at {0} has zero length")]
    Empty(Address),

    #[error("range starting at {start} with length 0x{len:x} overflows the address space")]
    Overflow { start: Address, len: u64 },

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}

/// Inclusive `[min, max]` address range. `min <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AddressRange {
    min: Address,
    max: Address,
}

impl AddressRange {
    pub fn new(min: Address, max: Address) -> Result<Self, RangeError> {
        if min > max {
            return Err(RangeError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn single(address: Address) -> Self {
        Self { min: address, max: address }
    }

    /// Range covering `len` bytes starting at `start`.
    pub fn from_start_len(start: Address, len: u64) -> Result<Self, RangeError> {
        if len == 0 {
            return Err(RangeError::Empty(start));
        }
        let max = start.checked_add(len - 1).ok_or(RangeError::Overflow { start, len })?;
        Ok(Self { min: start, max })
    }

    pub fn start(&self) -> Address {
        self.min
    }

    pub fn end(&self) -> Address {
        self.max
    }

    pub fn contains(&self, address: Address) -> bool {
        self.min <= address && address <= self.max
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Number of addresses in the range. Saturates for the full 64-bit space.
    pub fn len(&self) -> u64 {
        (self.max.value() - self.min.value()).saturating_add(1)
    }

    /// A range always holds at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
