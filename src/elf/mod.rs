//! ELF primitive accessors (SPEC_FULL §4.B).
//!
//! C's duplicated 32/64-bit structures become a single tagged type here:
//! [`ElfClass`] distinguishes the two widths, and [`Header`] reads the
//! handful of fields the rest of the crate needs directly out of
//! `object::elf`'s `FileHeader32`/`FileHeader64` wire structs (the same
//! ones the teacher's `elf` crate re-derived by hand in `elf/defs.rs`),
//! resolving the 32-vs-64 duplication once here instead of at every call
//! site.

use object::elf::{FileHeader32, FileHeader64};
use object::Endianness;

use crate::error::{self, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    B32,
    B64,
}

/// A parsed, width- and endian-normalised view of an ELF file header. Every
/// field is stored in native `u64`/`u32` form; callers never see an
/// endian-wrapped integer.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub class: ElfClass,
    pub endian: Endianness,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Header {
    pub fn word(&self) -> crate::arch::Word {
        match self.class {
            ElfClass::B32 => crate::arch::Word::W32,
            ElfClass::B64 => crate::arch::Word::W64,
        }
    }

    /// Parses the ELF identification bytes and file header out of `data`,
    /// selecting 32- or 64-bit and little- or big-endian layout from the
    /// `e_ident` prefix, exactly as `object::FileKind::parse` does.
    pub fn parse(data: &[u8]) -> Result<Header> {
        if data.len() < 20 || &data[0..4] != object::elf::ELFMAG {
            return Err(error::missing_section("not an ELF file: bad magic"));
        }
        let ei_class = data[object::elf::EI_CLASS];
        let ei_data = data[object::elf::EI_DATA];
        let endian = match ei_data {
            object::elf::ELFDATA2LSB => Endianness::Little,
            object::elf::ELFDATA2MSB => Endianness::Big,
            other => {
                return Err(error::missing_section(format!(
                    "unrecognised ELF data encoding {other}"
                )))
            }
        };
        match ei_class {
            object::elf::ELFCLASS32 => {
                let hdr: &FileHeader32<Endianness> = object::pod::from_bytes(data)
                    .map_err(|_| error::missing_section("truncated ELF32 header"))?
                    .0;
                Ok(Header {
                    class: ElfClass::B32,
                    endian,
                    e_type: hdr.e_type.get(endian),
                    e_machine: hdr.e_machine.get(endian),
                    e_entry: hdr.e_entry.get(endian) as u64,
                    e_phoff: hdr.e_phoff.get(endian) as u64,
                    e_shoff: hdr.e_shoff.get(endian) as u64,
                    e_flags: hdr.e_flags.get(endian),
                    e_phentsize: hdr.e_phentsize.get(endian),
                    e_phnum: hdr.e_phnum.get(endian),
                    e_shentsize: hdr.e_shentsize.get(endian),
                    e_shnum: hdr.e_shnum.get(endian),
                    e_shstrndx: hdr.e_shstrndx.get(endian),
                })
            }
            object::elf::ELFCLASS64 => {
                let hdr: &FileHeader64<Endianness> = object::pod::from_bytes(data)
                    .map_err(|_| error::missing_section("truncated ELF64 header"))?
                    .0;
                Ok(Header {
                    class: ElfClass::B64,
                    endian,
                    e_type: hdr.e_type.get(endian),
                    e_machine: hdr.e_machine.get(endian),
                    e_entry: hdr.e_entry.get(endian),
                    e_phoff: hdr.e_phoff.get(endian),
                    e_shoff: hdr.e_shoff.get(endian),
                    e_flags: hdr.e_flags.get(endian),
                    e_phentsize: hdr.e_phentsize.get(endian),
                    e_phnum: hdr.e_phnum.get(endian),
                    e_shentsize: hdr.e_shentsize.get(endian),
                    e_shnum: hdr.e_shnum.get(endian),
                    e_shstrndx: hdr.e_shstrndx.get(endian),
                })
            }
            other => Err(error::missing_section(format!(
                "unrecognised ELF class {other}"
            ))),
        }
    }
}

pub mod dynent;
pub mod phdr;
pub mod rel;
pub mod shdr;
pub mod sym;

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_ehdr64() -> Vec<u8> {
        let mut v = vec![0u8; 64];
        v[0..4].copy_from_slice(object::elf::ELFMAG);
        v[object::elf::EI_CLASS] = object::elf::ELFCLASS64;
        v[object::elf::EI_DATA] = object::elf::ELFDATA2LSB;
        v[object::elf::EI_VERSION] = object::elf::EV_CURRENT;
        v[16..18].copy_from_slice(&object::elf::ET_EXEC.to_le_bytes());
        v[18..20].copy_from_slice(&object::elf::EM_X86_64.to_le_bytes());
        v
    }

    #[test]
    fn parses_minimal_64_bit_header() {
        let bytes = minimal_ehdr64();
        let hdr = Header::parse(&bytes).unwrap();
        assert_eq!(hdr.class, ElfClass::B64);
        assert_eq!(hdr.endian, Endianness::Little);
        assert_eq!(hdr.e_machine, object::elf::EM_X86_64);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_ehdr64();
        bytes[0] = 0;
        assert!(Header::parse(&bytes).is_err());
    }
}
