//! `.dynamic` entry accessors, width- and endian-normalised.

use object::elf::{Dyn32, Dyn64};
use object::Endianness;

use super::ElfClass;
use crate::error::{self, Result};

#[derive(Debug, Clone, Copy)]
pub struct DynEntry {
    pub d_tag: i64,
    pub d_val: u64,
}

pub fn parse_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, size: u64) -> Result<Vec<DynEntry>> {
    let off = off as usize;
    match class {
        ElfClass::B32 => {
            let entsize = std::mem::size_of::<Dyn32<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("dynamic table truncated"))?;
                let (d, _): (&Dyn32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed dynamic entry"))?;
                out.push(DynEntry {
                    d_tag: d.d_tag.get(endian) as i64,
                    d_val: d.d_val.get(endian) as u64,
                });
                if d.d_tag.get(endian) == 0 {
                    break;
                }
            }
            Ok(out)
        }
        ElfClass::B64 => {
            let entsize = std::mem::size_of::<Dyn64<Endianness>>();
            let count = size as usize / entsize;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = off + i * entsize;
                let slice = data
                    .get(start..start + entsize)
                    .ok_or_else(|| error::missing_section("dynamic table truncated"))?;
                let (d, _): (&Dyn64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed dynamic entry"))?;
                out.push(DynEntry {
                    d_tag: d.d_tag.get(endian),
                    d_val: d.d_val.get(endian),
                });
                if d.d_tag.get(endian) == 0 {
                    break;
                }
            }
            Ok(out)
        }
    }
}
