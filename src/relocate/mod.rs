//! Relocation applier (SPEC_FULL §4.E): one function per `(architecture,
//! relocation-type)`, reached through the architecture descriptor rather than
//! a giant match in this module. This module owns only the parts common to
//! every architecture: truncating the resolved value to its target width and
//! writing it into a section's byte buffer in the file's endianness.

pub mod request;

use object::Endianness;

use crate::arch::ArchDescriptor;
use crate::error::{self, Result};
use request::{RelocationRequest, Resolved, Width};

/// Applies `req` using `arch`'s arithmetic table and returns the exact bytes
/// to splice into the target section at `req.place`'s section-relative
/// offset, encoded in `endian`.
pub fn apply(arch: &ArchDescriptor, req: &RelocationRequest, endian: Endianness) -> Result<Vec<u8>> {
    if !arch.supports_relocation(req.rel_type) {
        return Err(error::custom_error(format!(
            "{} does not support relocation type {} ({})",
            arch.name,
            req.rel_type,
            (arch.rel_type_name)(req.rel_type)
        )));
    }
    let resolved: Resolved = (arch.apply_reloc)(req)?;
    Ok(encode(resolved, endian))
}

fn encode(resolved: Resolved, endian: Endianness) -> Vec<u8> {
    let v = resolved.value;
    match (resolved.width, endian) {
        (Width::W8, _) => vec![v as u8],
        (Width::W16, Endianness::Little) => (v as u16).to_le_bytes().to_vec(),
        (Width::W16, Endianness::Big) => (v as u16).to_be_bytes().to_vec(),
        (Width::W32, Endianness::Little) => (v as u32).to_le_bytes().to_vec(),
        (Width::W32, Endianness::Big) => (v as u32).to_be_bytes().to_vec(),
        (Width::W64, Endianness::Little) => v.to_le_bytes().to_vec(),
        (Width::W64, Endianness::Big) => v.to_be_bytes().to_vec(),
    }
}

/// Applies the same request twice and checks the two encodings agree, the
/// idempotence property of SPEC_FULL §8.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Registry;

    #[test]
    fn pc32_matches_worked_example() {
        let reg = Registry::new();
        let arch = reg.by_name("x86_64").unwrap();
        // S=0x401000, A=-4, P=0x401010: expected S+A-P = 0xFFFFFFFFFFFFFFEC mod 2^32 = 0xFFFFFFEC
        let req = RelocationRequest {
            rel_type: object::elf::R_X86_64_PC32,
            place: 0x401010,
            addend: -4,
            sym_value: 0x401000,
            plt_entry: None,
            got_entry: None,
            got_base: None,
            load_bias: 0,
            tls_offset: None,
        };
        let bytes = apply(arch, &req, Endianness::Little).unwrap();
        assert_eq!(bytes, 0xFFFFFFECu32.to_le_bytes().to_vec());
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let reg = Registry::new();
        let arch = reg.by_name("x86_64").unwrap();
        let req = RelocationRequest {
            rel_type: object::elf::R_X86_64_64,
            place: 0x2000,
            addend: 8,
            sym_value: 0x1000,
            plt_entry: None,
            got_entry: None,
            got_base: None,
            load_bias: 0,
            tls_offset: None,
        };
        let first = apply(arch, &req, Endianness::Little).unwrap();
        let second = apply(arch, &req, Endianness::Little).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unsupported_relocation_errors() {
        let reg = Registry::new();
        let arch = reg.by_name("arm").unwrap();
        let req = RelocationRequest {
            rel_type: object::elf::R_X86_64_64,
            place: 0,
            addend: 0,
            sym_value: 0,
            plt_entry: None,
            got_entry: None,
            got_base: None,
            load_bias: 0,
            tls_offset: None,
        };
        assert!(apply(arch, &req, Endianness::Little).is_err());
    }
}
