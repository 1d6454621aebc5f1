//! ARM (AArch32) architecture descriptor.

use object::elf;

use crate::error::{Error, Result};
use crate::relocate::request::{RelocationRequest, Resolved, Width};

use super::ArchDescriptor;

pub const REL_TYPES: &[u32] = &[
    elf::R_ARM_NONE,
    elf::R_ARM_ABS32,
    elf::R_ARM_REL32,
    elf::R_ARM_GLOB_DAT,
    elf::R_ARM_JUMP_SLOT,
    elf::R_ARM_RELATIVE,
    elf::R_ARM_GOTOFF32,
    elf::R_ARM_GOT_BREL,
    elf::R_ARM_COPY,
    elf::R_ARM_TLS_TPOFF32,
];

pub fn rel_type_name(t: u32) -> &'static str {
    match t {
        elf::R_ARM_NONE => "R_ARM_NONE",
        elf::R_ARM_ABS32 => "R_ARM_ABS32",
        elf::R_ARM_REL32 => "R_ARM_REL32",
        elf::R_ARM_GLOB_DAT => "R_ARM_GLOB_DAT",
        elf::R_ARM_JUMP_SLOT => "R_ARM_JUMP_SLOT",
        elf::R_ARM_RELATIVE => "R_ARM_RELATIVE",
        elf::R_ARM_GOTOFF32 => "R_ARM_GOTOFF32",
        elf::R_ARM_GOT_BREL => "R_ARM_GOT_BREL",
        elf::R_ARM_COPY => "R_ARM_COPY",
        elf::R_ARM_TLS_TPOFF32 => "R_ARM_TLS_TPOFF32",
        _ => "R_ARM_UNKNOWN",
    }
}

/// ARM ELF ABI relocation arithmetic. Unlike x86-64, REL (not RELA) is the
/// common flavour, so `addend` is supplied by the caller after reading it
/// back out of the instruction bits; this applier only does the arithmetic.
pub fn apply(req: &RelocationRequest) -> Result<Resolved> {
    let s = req.sym_value as i64;
    let a = req.addend;
    let p = req.place as i64;
    let b = req.load_bias as i64;

    let (value, width): (i64, Width) = match req.rel_type {
        elf::R_ARM_NONE => (0, Width::W32),
        elf::R_ARM_ABS32 => (s + a, Width::W32),
        elf::R_ARM_REL32 => (s + a - p, Width::W32),
        elf::R_ARM_GLOB_DAT => (s + a, Width::W32),
        elf::R_ARM_JUMP_SLOT => (s + a, Width::W32),
        elf::R_ARM_RELATIVE => (b + a, Width::W32),
        elf::R_ARM_GOTOFF32 => (s + a - got_base(req)? as i64, Width::W32),
        elf::R_ARM_GOT_BREL => (got_entry(req)? as i64 + a - got_base(req)? as i64, Width::W32),
        elf::R_ARM_COPY => (0, Width::W32),
        elf::R_ARM_TLS_TPOFF32 => (s + a, Width::W32),
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

fn got_entry(req: &RelocationRequest) -> Result<u64> {
    req.got_entry
        .ok_or_else(|| crate::error::relocation_invalid(req.place, "no GOT entry allocated"))
}

fn got_base(req: &RelocationRequest) -> Result<u64> {
    req.got_base
        .ok_or_else(|| crate::error::relocation_invalid(req.place, "no GOT base known"))
}

/// `ldr pc, [pc, #-4]` followed by the absolute GOT slot address, the
/// classic ARM PLT0-less import stub.
pub fn plt_stub(_stub_addr: u64, got_slot_addr: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8);
    bytes.extend_from_slice(&0xe51ff004u32.to_le_bytes());
    bytes.extend_from_slice(&(got_slot_addr as u32).to_le_bytes());
    bytes
}

pub const PLT_STUB_SIZE: usize = 8;

pub fn descriptor() -> ArchDescriptor {
    ArchDescriptor {
        name: "arm",
        code: super::ARCH_CODE_ARM,
        format: super::Format::Elf,
        machine: elf::EM_ARM,
        word: super::Word::W32,
        rel_types: REL_TYPES,
        rel_type_name,
        apply_reloc: apply,
        plt_stub,
        plt_stub_size: PLT_STUB_SIZE,
    }
}
