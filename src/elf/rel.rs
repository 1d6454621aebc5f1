//! Relocation-entry accessors (REL and RELA flavours), width- and
//! endian-normalised.

use object::elf::{Rel32, Rel64, Rela32, Rela64};
use object::Endianness;

use super::ElfClass;
use crate::error::{self, Result};

#[derive(Debug, Clone, Copy)]
pub struct RelEntry {
    pub r_offset: u64,
    pub r_sym: u32,
    pub r_type: u32,
    /// `None` for REL-flavour entries; the addend must be read back out of
    /// the instruction bits at `r_offset` by the caller.
    pub r_addend: Option<i64>,
}

pub fn parse_rel_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, size: u64) -> Result<Vec<RelEntry>> {
    let off = off as usize;
    match class {
        ElfClass::B32 => {
            let entsize = std::mem::size_of::<Rel32<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("REL table truncated"))?;
                let (rel, _): (&Rel32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed REL entry"))?;
                let (sym, ty) = rel.r_info(endian);
                out.push(RelEntry {
                    r_offset: rel.r_offset.get(endian) as u64,
                    r_sym: sym,
                    r_type: ty,
                    r_addend: None,
                });
            }
            Ok(out)
        }
        ElfClass::B64 => {
            let entsize = std::mem::size_of::<Rel64<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("REL table truncated"))?;
                let (rel, _): (&Rel64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed REL entry"))?;
                let (sym, ty) = rel.r_info(endian, true);
                out.push(RelEntry {
                    r_offset: rel.r_offset.get(endian),
                    r_sym: sym,
                    r_type: ty,
                    r_addend: None,
                });
            }
            Ok(out)
        }
    }
}

pub fn parse_rela_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, size: u64) -> Result<Vec<RelEntry>> {
    let off = off as usize;
    match class {
        ElfClass::B32 => {
            let entsize = std::mem::size_of::<Rela32<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("RELA table truncated"))?;
                let (rela, _): (&Rela32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed RELA entry"))?;
                let (sym, ty) = rela.r_info(endian);
                out.push(RelEntry {
                    r_offset: rela.r_offset.get(endian) as u64,
                    r_sym: sym,
                    r_type: ty,
                    r_addend: Some(rela.r_addend.get(endian) as i64),
                });
            }
            Ok(out)
        }
        ElfClass::B64 => {
            let entsize = std::mem::size_of::<Rela64<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("RELA table truncated"))?;
                let (rela, _): (&Rela64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed RELA entry"))?;
                let (sym, ty) = rela.r_info(endian, true);
                out.push(RelEntry {
                    r_offset: rela.r_offset.get(endian),
                    r_sym: sym,
                    r_type: ty,
                    r_addend: Some(rela.r_addend.get(endian)),
                });
            }
            Ok(out)
        }
    }
}
