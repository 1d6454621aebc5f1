//! AArch64 architecture descriptor.

use object::elf;

use crate::error::{Error, Result};
use crate::relocate::request::{RelocationRequest, Resolved, Width};

use super::ArchDescriptor;

pub const REL_TYPES: &[u32] = &[
    elf::R_AARCH64_NONE,
    elf::R_AARCH64_ABS64,
    elf::R_AARCH64_ABS32,
    elf::R_AARCH64_PREL32,
    elf::R_AARCH64_PREL64,
    elf::R_AARCH64_GLOB_DAT,
    elf::R_AARCH64_JUMP_SLOT,
    elf::R_AARCH64_RELATIVE,
    elf::R_AARCH64_IRELATIVE,
    elf::R_AARCH64_TLS_TPREL64,
];

pub fn rel_type_name(t: u32) -> &'static str {
    match t {
        elf::R_AARCH64_NONE => "R_AARCH64_NONE",
        elf::R_AARCH64_ABS64 => "R_AARCH64_ABS64",
        elf::R_AARCH64_ABS32 => "R_AARCH64_ABS32",
        elf::R_AARCH64_PREL32 => "R_AARCH64_PREL32",
        elf::R_AARCH64_PREL64 => "R_AARCH64_PREL64",
        elf::R_AARCH64_GLOB_DAT => "R_AARCH64_GLOB_DAT",
        elf::R_AARCH64_JUMP_SLOT => "R_AARCH64_JUMP_SLOT",
        elf::R_AARCH64_RELATIVE => "R_AARCH64_RELATIVE",
        elf::R_AARCH64_IRELATIVE => "R_AARCH64_IRELATIVE",
        elf::R_AARCH64_TLS_TPREL64 => "R_AARCH64_TLS_TPREL64",
        _ => "R_AARCH64_UNKNOWN",
    }
}

pub fn apply(req: &RelocationRequest) -> Result<Resolved> {
    let s = req.sym_value as i64;
    let a = req.addend;
    let p = req.place as i64;
    let b = req.load_bias as i64;

    let (value, width): (i64, Width) = match req.rel_type {
        elf::R_AARCH64_NONE => (0, Width::W64),
        elf::R_AARCH64_ABS64 => (s + a, Width::W64),
        elf::R_AARCH64_ABS32 => (s + a, Width::W32),
        elf::R_AARCH64_PREL32 => (s + a - p, Width::W32),
        elf::R_AARCH64_PREL64 => (s + a - p, Width::W64),
        elf::R_AARCH64_GLOB_DAT => (s + a, Width::W64),
        elf::R_AARCH64_JUMP_SLOT => (s + a, Width::W64),
        elf::R_AARCH64_RELATIVE => (b + a, Width::W64),
        elf::R_AARCH64_IRELATIVE => (b + a, Width::W64),
        elf::R_AARCH64_TLS_TPREL64 => (s + a, Width::W64),
        other => {
            return Err(Error::RelocationNotSupported {
                rel_type: other,
                rel_type_name: rel_type_name(other).into(),
            })
        }
    };
    Ok(Resolved {
        value: value as u64,
        width,
    })
}

/// `ldr x16, #8 ; br x16 ; .quad got_slot_addr`.
pub fn plt_stub(_stub_addr: u64, got_slot_addr: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&0x58000050u32.to_le_bytes());
    bytes.extend_from_slice(&0xd61f0200u32.to_le_bytes());
    bytes.extend_from_slice(&got_slot_addr.to_le_bytes());
    bytes
}

pub const PLT_STUB_SIZE: usize = 16;

pub fn descriptor() -> ArchDescriptor {
    ArchDescriptor {
        name: "aarch64",
        code: super::ARCH_CODE_AARCH64,
        format: super::Format::Elf,
        machine: elf::EM_AARCH64,
        word: super::Word::W64,
        rel_types: REL_TYPES,
        rel_type_name,
        apply_reloc: apply,
        plt_stub,
        plt_stub_size: PLT_STUB_SIZE,
    }
}
