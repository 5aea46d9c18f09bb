use thiserror::Error;

use crate::address::{Address, AddressRange, RangeError};

/// Why a single line failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected `ADDR`, `START-END` or `START+SIZE`")]
    Syntax,

    #[error(transparent)]
    Range(#[from] RangeError),
}

/// Turns one line of a coverage file into zero or one address range.
pub trait RangeLineDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` for lines that carry no range, such as blanks and comments.
    fn decode(&self, line: &str) -> Result<Option<AddressRange>, DecodeError>;
}

/// Hexadecimal range lines.
///
/// Accepted forms (surrounding spaces and tabs ignored):
///
/// ```text
/// # comment
/// 401000            single address
/// 0x401000-0x40100f inclusive range
/// 0x401000+0x10     start and byte count
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HexRangeDecoder;

impl HexRangeDecoder {
    pub const NAME: &'static str = "hex-range";
}

fn address(token: &str) -> Result<Address, DecodeError> {
    let token = token.trim_matches(|c| c == ' ' || c == '\t');
    if token.is_empty() {
        return Err(DecodeError::Syntax);
    }
    Ok(token.parse::<Address>()?)
}

impl RangeLineDecoder for HexRangeDecoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decode(&self, line: &str) -> Result<Option<AddressRange>, DecodeError> {
        let line = line.trim_matches(|c| c == ' ' || c == '\t');
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        if let Some((start, end)) = line.split_once('-') {
            let range = AddressRange::new(address(start)?, address(end)?)?;
            return Ok(Some(range));
        }

        if let Some((start, size)) = line.split_once('+') {
            let size = address(size)?.value();
            let range = AddressRange::from_start_len(address(start)?, size)?;
            return Ok(Some(range));
        }

        Ok(Some(AddressRange::single(address(line)?)))
    }
}

/// Looks up a decoder by the name used in configuration files.
pub fn decoder_by_name(name: &str) -> Option<Box<dyn RangeLineDecoder>> {
    match name {
        HexRangeDecoder::NAME => Some(Box::new(HexRangeDecoder)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: u64, max: u64) -> AddressRange {
        AddressRange::new(Address::new(min), Address::new(max)).unwrap()
    }

    #[test]
    fn decodes_all_forms() {
        let d = HexRangeDecoder;
        assert_eq!(d.decode("0x1000-0x1005").unwrap(), Some(range(0x1000, 0x1005)));
        assert_eq!(d.decode("  1000 - 1005\t").unwrap(), Some(range(0x1000, 0x1005)));
        assert_eq!(d.decode("0x1000+6").unwrap(), Some(range(0x1000, 0x1005)));
        assert_eq!(d.decode("401000").unwrap(), Some(range(0x401000, 0x401000)));
        assert_eq!(d.decode("").unwrap(), None);
        assert_eq!(d.decode("# module main").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        let d = HexRangeDecoder;
        assert_eq!(d.decode("0x1000-").unwrap_err(), DecodeError::Syntax);
        assert!(matches!(d.decode("0x10-0x1-0x2"), Err(DecodeError::Range(_))));
        assert!(matches!(
            d.decode("0x2000-0x1000"),
            Err(DecodeError::Range(RangeError::Inverted { .. }))
        ));
        assert!(matches!(d.decode("0x1000+0"), Err(DecodeError::Range(RangeError::Empty(_)))));
        assert!(matches!(d.decode("hello"), Err(DecodeError::Range(_))));
    }

    #[test]
    fn decoder_lookup_knows_hex_range() {
        assert!(decoder_by_name("hex-range").is_some());
        assert!(decoder_by_name("drcov").is_none());
    }
}
