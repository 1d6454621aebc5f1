//! Section header accessors, width- and endian-normalised.

use object::elf::{SectionHeader32, SectionHeader64};
use object::Endianness;

use super::ElfClass;
use crate::error::{self, Result};

#[derive(Debug, Clone, Copy)]
pub struct Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

pub fn parse_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, count: u16) -> Result<Vec<Shdr>> {
    let off = off as usize;
    let mut out = Vec::with_capacity(count as usize);
    match class {
        ElfClass::B32 => {
            let size = std::mem::size_of::<SectionHeader32<Endianness>>();
            for i in 0..count as usize {
                let start = off + i * size;
                let slice = data
                    .get(start..start + size)
                    .ok_or_else(|| error::missing_section("section header table truncated"))?;
                let (shdr, _): (&SectionHeader32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed section header"))?;
                out.push(Shdr {
                    sh_name: shdr.sh_name.get(endian),
                    sh_type: shdr.sh_type.get(endian),
                    sh_flags: shdr.sh_flags.get(endian) as u64,
                    sh_addr: shdr.sh_addr.get(endian) as u64,
                    sh_offset: shdr.sh_offset.get(endian) as u64,
                    sh_size: shdr.sh_size.get(endian) as u64,
                    sh_link: shdr.sh_link.get(endian),
                    sh_info: shdr.sh_info.get(endian),
                    sh_addralign: shdr.sh_addralign.get(endian) as u64,
                    sh_entsize: shdr.sh_entsize.get(endian) as u64,
                });
            }
        }
        ElfClass::B64 => {
            let size = std::mem::size_of::<SectionHeader64<Endianness>>();
            for i in 0..count as usize {
                let start = off + i * size;
                let slice = data
                    .get(start..start + size)
                    .ok_or_else(|| error::missing_section("section header table truncated"))?;
                let (shdr, _): (&SectionHeader64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_section("malformed section header"))?;
                out.push(Shdr {
                    sh_name: shdr.sh_name.get(endian),
                    sh_type: shdr.sh_type.get(endian),
                    sh_flags: shdr.sh_flags.get(endian),
                    sh_addr: shdr.sh_addr.get(endian),
                    sh_offset: shdr.sh_offset.get(endian),
                    sh_size: shdr.sh_size.get(endian),
                    sh_link: shdr.sh_link.get(endian),
                    sh_info: shdr.sh_info.get(endian),
                    sh_addralign: shdr.sh_addralign.get(endian),
                    sh_entsize: shdr.sh_entsize.get(endian),
                });
            }
        }
    }
    Ok(out)
}
