//! i386 (32-bit x86) architecture descriptor.

use object::elf;

use crate::error::{Error, Result};
use crate::relocate::request::{RelocationRequest, Resolved, Width};

use super::ArchDescriptor;

pub const REL_TYPES: &[u32] = &[
    elf::R_386_NONE,
    elf::R_386_32,
    elf::R_386_PC32,
    elf::R_386_GOT32,
    elf::R_386_PLT32,
    elf::R_386_GLOB_DAT,
    elf::R_386_JMP_SLOT,
    elf::R_386_RELATIVE,
    elf::R_386_GOTOFF,
    elf::R_386_GOTPC,
];

pub fn rel_type_name(t: u32) -> &'static str {
    match t {
        elf::R_386_NONE => "R_386_NONE",
        elf::R_386_32 => "R_386_32",
        elf::R_386_PC32 => "R_386_PC32",
        elf::R_386_GOT32 => "R_386_GOT32",
        elf::R_386_PLT32 => "R_386_PLT32",
        elf::R_386_GLOB_DAT => "R_386_GLOB_DAT",
        elf::R_386_JMP_SLOT => "R_386_JMP_SLOT",
        elf::R_386_RELATIVE => "R_386_RELATIVE",
        elf::R_386_GOTOFF => "R_386_GOTOFF",
        elf::R_386_GOTPC => "R_386_GOTPC",
        _ => "R_386_UNKNOWN",
    }
}

pub fn apply(req: &RelocationRequest) -> Result<Resolved> {
    let s = req.sym_value as i64;
    let a = req.addend;
    let p = req.place as i64;
    let b = req.load_bias as i64;

    let (value, width): (i64, Width) = match req.rel_type {
        elf::R_386_NONE => (0, Width::W32),
        elf::R_386_32 => (s + a, Width::W32),
        elf::R_386_PC32 => (s + a - p, Width::W32),
        elf::R_386_GOT32 => (got_entry(req)? as i64 + a, Width::W32),
        elf::R_386_PLT32 => (plt_entry(req)? as i64 + a - p, Width::W32),
        elf::R_386_GLOB_DAT => (s, Width::W32),
        elf::R_386_JMP_SLOT => (s, Width::W32),
        elf::R_386_RELATIVE => (b + a, Width::W32),
        elf::R_386_GOTOFF => (s + a - got_base(req)? as i64, Width::W32),
        elf::R_386_GOTPC => (got_base(req)? as i64 + a - p, Width::W32),
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

fn plt_entry(req: &RelocationRequest) -> Result<u64> {
    req.plt_entry
        .ok_or_else(|| crate::error::relocation_invalid(req.place, "no PLT entry allocated"))
}

/// `jmp *got_slot` encoded as an absolute indirect jump through the GOT.
pub fn plt_stub(_stub_addr: u64, got_slot_addr: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(6);
    bytes.extend_from_slice(&[0xff, 0x25]);
    bytes.extend_from_slice(&(got_slot_addr as u32).to_le_bytes());
    bytes
}

pub const PLT_STUB_SIZE: usize = 6;

pub fn descriptor() -> ArchDescriptor {
    ArchDescriptor {
        name: "x86",
        code: super::ARCH_CODE_X86,
        format: super::Format::Elf,
        machine: elf::EM_386,
        word: super::Word::W32,
        rel_types: REL_TYPES,
        rel_type_name,
        apply_reloc: apply,
        plt_stub,
        plt_stub_size: PLT_STUB_SIZE,
    }
}
