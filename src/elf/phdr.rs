//! Program header accessors, width- and endian-normalised.

use object::elf::{ProgramHeader32, ProgramHeader64};
use object::Endianness;

use super::ElfClass;
use crate::error::{self, Result};

#[derive(Debug, Clone, Copy)]
pub struct Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

pub fn parse_table(data: &[u8], class: ElfClass, endian: Endianness, off: u64, count: u16) -> Result<Vec<Phdr>> {
    let off = off as usize;
    let mut out = Vec::with_capacity(count as usize);
    match class {
        ElfClass::B32 => {
            let size = std::mem::size_of::<ProgramHeader32<Endianness>>();
            for i in 0..count as usize {
                let start = off + i * size;
                let slice = data
                    .get(start..start + size)
                    .ok_or_else(|| error::missing_segment("program header table truncated"))?;
                let (phdr, _): (&ProgramHeader32<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_segment("malformed program header"))?;
                out.push(Phdr {
                    p_type: phdr.p_type.get(endian),
                    p_flags: phdr.p_flags.get(endian),
                    p_offset: phdr.p_offset.get(endian) as u64,
                    p_vaddr: phdr.p_vaddr.get(endian) as u64,
                    p_paddr: phdr.p_paddr.get(endian) as u64,
                    p_filesz: phdr.p_filesz.get(endian) as u64,
                    p_memsz: phdr.p_memsz.get(endian) as u64,
                    p_align: phdr.p_align.get(endian) as u64,
                });
            }
        }
        ElfClass::B64 => {
            let size = std::mem::size_of::<ProgramHeader64<Endianness>>();
            for i in 0..count as usize {
                let start = off + i * size;
                let slice = data
                    .get(start..start + size)
                    .ok_or_else(|| error::missing_segment("program header table truncated"))?;
                let (phdr, _): (&ProgramHeader64<Endianness>, _) = object::pod::from_bytes(slice)
                    .map_err(|_| error::missing_segment("malformed program header"))?;
                out.push(Phdr {
                    p_type: phdr.p_type.get(endian),
                    p_flags: phdr.p_flags.get(endian),
                    p_offset: phdr.p_offset.get(endian),
                    p_vaddr: phdr.p_vaddr.get(endian),
                    p_paddr: phdr.p_paddr.get(endian),
                    p_filesz: phdr.p_filesz.get(endian),
                    p_memsz: phdr.p_memsz.get(endian),
                    p_align: phdr.p_align.get(endian),
                });
            }
        }
    }
    Ok(out)
}
