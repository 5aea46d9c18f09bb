use capstone::{arch, prelude::*, Capstone};
use goblin::{elf, mach, pe, Object};

use super::{Instruction, InstructionListing, Listing, ListingError, Region};
use crate::address::{Address, AddressRange};

const ELF_SHF_EXECINSTR: u64 = 0x4;
const ELF_SHT_NOBITS: u32 = 8;
const PE_SCN_CNT_CODE: u32 = 0x0000_0020;
const PE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const MACH_S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
const MACH_S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

/// Listing produced by disassembling raw bytes or an object file with Capstone.
#[derive(Debug, Clone)]
pub struct CapstoneListing {
    arch: String,
    inner: InstructionListing,
}

#[derive(Debug)]
struct CodeSection<'a> {
    name: String,
    address: u64,
    bytes: &'a [u8],
}

impl CodeSection<'_> {
    fn end(&self) -> u64 {
        self.address.saturating_add(self.bytes.len() as u64)
    }

    fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }
}

struct SymbolInfo {
    name: String,
    address: u64,
    size: Option<u64>,
}

fn normalize_arch(name: &str) -> Result<&'static str, ListingError> {
    match name.to_lowercase().as_str() {
        "x86_64" | "amd64" => Ok("x86_64"),
        "x86" | "i386" => Ok("x86"),
        "arm" | "armv7" => Ok("arm"),
        "arm64" | "aarch64" => Ok("arm64"),
        "riscv" | "riscv64" => Ok("riscv64"),
        "riscv32" => Ok("riscv32"),
        _ => Err(ListingError::UnsupportedArch(name.to_string())),
    }
}

fn arch_from_object(obj: &Object) -> Option<&'static str> {
    match obj {
        Object::Elf(elf) => match elf.header.e_machine {
            elf::header::EM_X86_64 => Some("x86_64"),
            elf::header::EM_386 => Some("x86"),
            elf::header::EM_AARCH64 => Some("arm64"),
            elf::header::EM_ARM => Some("arm"),
            elf::header::EM_RISCV if elf.is_64 => Some("riscv64"),
            elf::header::EM_RISCV => Some("riscv32"),
            _ => None,
        },
        Object::PE(pe) => match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Some("x86"),
            pe::header::COFF_MACHINE_X86_64 => Some("x86_64"),
            pe::header::COFF_MACHINE_ARM => Some("arm"),
            pe::header::COFF_MACHINE_ARM64 => Some("arm64"),
            _ => None,
        },
        Object::Mach(mach::Mach::Binary(bin)) => match bin.header.cputype() {
            mach::cputype::CPU_TYPE_X86 => Some("x86"),
            mach::cputype::CPU_TYPE_X86_64 => Some("x86_64"),
            mach::cputype::CPU_TYPE_ARM => Some("arm"),
            mach::cputype::CPU_TYPE_ARM64 => Some("arm64"),
            _ => None,
        },
        _ => None,
    }
}

fn make_cs(arch: &str) -> Result<Capstone, ListingError> {
    let built = match arch {
        "x86_64" => Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).build(),
        "x86" => Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).build(),
        "arm" => Capstone::new().arm().mode(arch::arm::ArchMode::Arm).build(),
        "arm64" => Capstone::new().arm64().mode(arch::arm64::ArchMode::Arm).build(),
        "riscv64" => Capstone::new().riscv().mode(arch::riscv::ArchMode::RiscV64).build(),
        "riscv32" => Capstone::new().riscv().mode(arch::riscv::ArchMode::RiscV32).build(),
        other => return Err(ListingError::UnsupportedArch(other.to_string())),
    };
    built.map_err(|e| ListingError::Disassembler(format!("capstone init failed: {e}")))
}

/// Disassembles `code` linearly, skipping one byte wherever decoding fails.
fn disassemble(
    cs: &Capstone,
    code: &[u8],
    base: u64,
    out: &mut Vec<Instruction>,
) -> Result<(), ListingError> {
    let mut offset = 0usize;
    while offset < code.len() {
        let insns = cs
            .disasm_all(&code[offset..], base.saturating_add(offset as u64))
            .map_err(|e| ListingError::Disassembler(e.to_string()))?;
        if insns.is_empty() {
            offset += 1;
            continue;
        }
        for insn in insns.iter() {
            out.push(Instruction::new(insn.address(), insn.bytes().len() as u32));
            offset += insn.bytes().len();
        }
    }
    Ok(())
}

fn elf_code_sections<'a>(elf: &elf::Elf, bytes: &'a [u8]) -> Vec<CodeSection<'a>> {
    elf.section_headers
        .iter()
        .filter(|sh| sh.sh_flags & ELF_SHF_EXECINSTR != 0 && sh.sh_type != ELF_SHT_NOBITS)
        .filter_map(|sh| {
            let start = usize::try_from(sh.sh_offset).ok()?;
            let end = start.checked_add(usize::try_from(sh.sh_size).ok()?)?;
            Some(CodeSection {
                name: elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string(),
                address: sh.sh_addr,
                bytes: bytes.get(start..end)?,
            })
        })
        .collect()
}

fn elf_symbols(elf: &elf::Elf) -> Vec<SymbolInfo> {
    elf.syms
        .iter()
        .filter(|sym| sym.is_function() && sym.st_shndx != elf::section_header::SHN_UNDEF as usize)
        .filter_map(|sym| {
            let name = elf.strtab.get_at(sym.st_name).unwrap_or("");
            if name.is_empty() {
                return None;
            }
            Some(SymbolInfo {
                name: name.to_string(),
                address: sym.st_value,
                size: (sym.st_size > 0).then_some(sym.st_size),
            })
        })
        .collect()
}

/// Virtual address of `rva` in an image loaded at `image_base`, or `None`
/// when a malformed header pushes it past the address space.
fn pe_address(image_base: u64, rva: u64) -> Option<u64> {
    image_base.checked_add(rva)
}

fn pe_code_sections<'a>(pe: &pe::PE, bytes: &'a [u8]) -> Vec<CodeSection<'a>> {
    let image_base = pe.image_base as u64;
    pe.sections
        .iter()
        .filter(|sec| sec.characteristics & (PE_SCN_CNT_CODE | PE_SCN_MEM_EXECUTE) != 0)
        .filter_map(|sec| {
            let start = sec.pointer_to_raw_data as usize;
            let mut size = sec.size_of_raw_data as usize;
            if sec.virtual_size != 0 {
                size = size.min(sec.virtual_size as usize);
            }
            Some(CodeSection {
                name: sec.name().unwrap_or_default().to_string(),
                address: pe_address(image_base, u64::from(sec.virtual_address))?,
                bytes: bytes.get(start..start.checked_add(size)?)?,
            })
        })
        .collect()
}

fn pe_symbols(pe: &pe::PE) -> Vec<SymbolInfo> {
    let image_base = pe.image_base as u64;
    pe.exports
        .iter()
        .filter(|exp| exp.rva != 0)
        .filter_map(|exp| {
            let name = exp.name.unwrap_or_default();
            if name.is_empty() {
                return None;
            }
            Some(SymbolInfo {
                name: name.to_string(),
                address: pe_address(image_base, exp.rva as u64)?,
                size: None,
            })
        })
        .collect()
}

fn mach_code_sections<'a>(bin: &mach::MachO<'a>) -> Vec<CodeSection<'a>> {
    bin.segments
        .sections()
        .flatten()
        .filter_map(Result::ok)
        .filter(|(sec, _)| {
            sec.flags & (MACH_S_ATTR_PURE_INSTRUCTIONS | MACH_S_ATTR_SOME_INSTRUCTIONS) != 0
                || sec.name().map(|n| n == "__text").unwrap_or(false)
        })
        .map(|(sec, data)| CodeSection {
            name: sec.name().unwrap_or("").to_string(),
            address: sec.addr,
            bytes: data,
        })
        .collect()
}

fn mach_symbols(bin: &mach::MachO) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if nlist.is_undefined() {
            continue;
        }
        let name = name.trim_start_matches('_');
        if name.is_empty() {
            continue;
        }
        symbols.push(SymbolInfo { name: name.to_string(), address: nlist.n_value, size: None });
    }
    symbols
}

/// Turns symbols into regions. A symbol without a size runs up to the next
/// symbol in the same section, or to the end of the section.
fn symbol_regions(mut symbols: Vec<SymbolInfo>, sections: &[CodeSection]) -> Vec<Region> {
    symbols.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
    symbols.dedup_by(|a, b| a.address == b.address && a.name == b.name);

    let mut regions = Vec::new();
    for (idx, sym) in symbols.iter().enumerate() {
        let Some(section) = sections.iter().find(|s| s.contains(sym.address)) else { continue };
        let end = match sym.size {
            Some(size) => sym.address.saturating_add(size).min(section.end()),
            None => symbols[idx + 1..]
                .iter()
                .map(|next| next.address)
                .find(|&next| next > sym.address)
                .unwrap_or(section.end())
                .min(section.end()),
        };
        if end <= sym.address {
            continue;
        }
        if let Ok(range) = AddressRange::new(Address::new(sym.address), Address::new(end - 1)) {
            regions.push(Region { name: sym.name.clone(), range });
        }
    }
    regions
}

impl CapstoneListing {
    /// Disassembles a flat blob of code loaded at `base`.
    pub fn from_raw(bytes: &[u8], base: u64, arch: &str) -> Result<Self, ListingError> {
        let arch = normalize_arch(arch)?;
        let cs = make_cs(arch)?;
        let mut instructions = Vec::new();
        disassemble(&cs, bytes, base, &mut instructions)?;
        tracing::debug!(arch, base, instructions = instructions.len(), "disassembled raw image");
        Ok(Self { arch: arch.to_string(), inner: InstructionListing::new(instructions) })
    }

    /// Parses an ELF, PE or Mach-O image and disassembles its code sections.
    ///
    /// `arch_hint` overrides the architecture recorded in the header.
    pub fn from_object(bytes: &[u8], arch_hint: Option<&str>) -> Result<Self, ListingError> {
        let obj = Object::parse(bytes).map_err(|e| ListingError::Object(e.to_string()))?;
        let arch = match arch_hint {
            Some(hint) => normalize_arch(hint)?,
            None => arch_from_object(&obj).ok_or(ListingError::UnknownArch)?,
        };
        let (sections, symbols) = match &obj {
            Object::Elf(elf) => (elf_code_sections(elf, bytes), elf_symbols(elf)),
            Object::PE(pe) => (pe_code_sections(pe, bytes), pe_symbols(pe)),
            Object::Mach(mach::Mach::Binary(bin)) => (mach_code_sections(bin), mach_symbols(bin)),
            _ => return Err(ListingError::Object("unsupported object format".into())),
        };

        let cs = make_cs(arch)?;
        let mut instructions = Vec::new();
        for section in &sections {
            disassemble(&cs, section.bytes, section.address, &mut instructions)?;
            tracing::debug!(
                section = %section.name,
                address = section.address,
                size = section.bytes.len(),
                "disassembled code section"
            );
        }
        let regions = symbol_regions(symbols, &sections);
        Ok(Self {
            arch: arch.to_string(),
            inner: InstructionListing::new(instructions).with_regions(regions),
        })
    }

    /// Loads `bytes` as an object file, or as a raw image at `base` when it is
    /// not one.
    pub fn load(bytes: &[u8], arch_hint: Option<&str>, base: u64) -> Result<Self, ListingError> {
        match Object::parse(bytes) {
            Ok(Object::Elf(_)) | Ok(Object::PE(_)) | Ok(Object::Mach(mach::Mach::Binary(_))) => {
                Self::from_object(bytes, arch_hint)
            }
            _ => Self::from_raw(bytes, base, arch_hint.unwrap_or("x86_64")),
        }
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn listing(&self) -> &InstructionListing {
        &self.inner
    }
}

impl Listing for CapstoneListing {
    fn instructions_from(&self, start: Address) -> Box<dyn Iterator<Item = Instruction> + '_> {
        self.inner.instructions_from(start)
    }

    fn regions(&self) -> &[Region] {
        self.inner.regions()
    }
}
