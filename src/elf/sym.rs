//! Symbol-table entry accessors, width- and endian-normalised.

use object::elf::{Sym32, Sym64};
use object::Endianness;

use super::ElfClass;
use crate::error::{self, Result};

#[derive(Debug, Clone, Copy)]
pub struct SymEntry {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl SymEntry {
    pub fn bind(&self) -> u8 {
        self.st_info >> 4
    }
    pub fn sym_type(&self) -> u8 {
        self.st_info & 0xf
    }
    /// Dummy-symbol predicate (SPEC_FULL §2b): a symbol inserted by a prior
    /// patching step to mark a sentinel address, identified by the
    /// out-of-band `STT_NUM` type.
    pub fn is_dummy(&self) -> bool {
        self.sym_type() == object::elf::STT_NUM
    }
}

pub fn parse_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, size: u64) -> Result<Vec<SymEntry>> {
    let off = off as usize;
    match class {
        ElfClass::B32 => {
            let entsize = std::mem::size_of::<Sym32<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("symbol table truncated"))?;
                let (sym, _): (&Sym32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed symbol entry"))?;
                out.push(SymEntry {
                    st_name: sym.st_name.get(endian),
                    st_info: sym.st_info,
                    st_other: sym.st_other,
                    st_shndx: sym.st_shndx.get(endian),
                    st_value: sym.st_value.get(endian) as u64,
                    st_size: sym.st_size.get(endian) as u64,
                });
            }
            Ok(out)
        }
        ElfClass::B64 => {
            let entsize = std::mem::size_of::<Sym64<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("symbol table truncated"))?;
                let (sym, _): (&Sym64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed symbol entry"))?;
                out.push(SymEntry {
                    st_name: sym.st_name.get(endian),
                    st_info: sym.st_info,
                    st_other: sym.st_other,
                    st_shndx: sym.st_shndx.get(endian),
                    st_value: sym.st_value.get(endian),
                    st_size: sym.st_size.get(endian),
                });
            }
            Ok(out)
        }
    }
}
