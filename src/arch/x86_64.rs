//! x86-64 architecture descriptor: relocation arithmetic and PLT stub shape.

use object::elf;

use crate::error::{Error, Result};
use crate::relocate::request::{RelocationRequest, Resolved, Width};

use super::ArchDescriptor;

pub const REL_TYPES: &[u32] = &[
    elf::R_X86_64_NONE,
    elf::R_X86_64_64,
    elf::R_X86_64_PC32,
    elf::R_X86_64_GOT32,
    elf::R_X86_64_PLT32,
    elf::R_X86_64_COPY,
    elf::R_X86_64_GLOB_DAT,
    elf::R_X86_64_JUMP_SLOT,
    elf::R_X86_64_RELATIVE,
    elf::R_X86_64_GOTPCREL,
    elf::R_X86_64_32,
    elf::R_X86_64_32S,
    elf::R_X86_64_16,
    elf::R_X86_64_PC16,
    elf::R_X86_64_8,
    elf::R_X86_64_PC8,
    elf::R_X86_64_TPOFF64,
    elf::R_X86_64_DTPOFF64,
    elf::R_X86_64_IRELATIVE,
    elf::R_X86_64_GOTOFF64,
    elf::R_X86_64_GOTPC32,
    elf::R_X86_64_GOT64,
    elf::R_X86_64_GOTPCREL64,
    elf::R_X86_64_GOTPC64,
    elf::R_X86_64_GOTPLT64,
    elf::R_X86_64_PLTOFF64,
    elf::R_X86_64_TPOFF32,
    elf::R_X86_64_GOTTPOFF,
    elf::R_X86_64_GOTPCRELX,
    elf::R_X86_64_REX_GOTPCRELX,
];

pub fn rel_type_name(t: u32) -> &'static str {
    match t {
        elf::R_X86_64_NONE => "R_X86_64_NONE",
        elf::R_X86_64_64 => "R_X86_64_64",
        elf::R_X86_64_PC32 => "R_X86_64_PC32",
        elf::R_X86_64_GOT32 => "R_X86_64_GOT32",
        elf::R_X86_64_PLT32 => "R_X86_64_PLT32",
        elf::R_X86_64_COPY => "R_X86_64_COPY",
        elf::R_X86_64_GLOB_DAT => "R_X86_64_GLOB_DAT",
        elf::R_X86_64_JUMP_SLOT => "R_X86_64_JUMP_SLOT",
        elf::R_X86_64_RELATIVE => "R_X86_64_RELATIVE",
        elf::R_X86_64_GOTPCREL => "R_X86_64_GOTPCREL",
        elf::R_X86_64_32 => "R_X86_64_32",
        elf::R_X86_64_32S => "R_X86_64_32S",
        elf::R_X86_64_16 => "R_X86_64_16",
        elf::R_X86_64_PC16 => "R_X86_64_PC16",
        elf::R_X86_64_8 => "R_X86_64_8",
        elf::R_X86_64_PC8 => "R_X86_64_PC8",
        elf::R_X86_64_TPOFF64 => "R_X86_64_TPOFF64",
        elf::R_X86_64_DTPOFF64 => "R_X86_64_DTPOFF64",
        elf::R_X86_64_IRELATIVE => "R_X86_64_IRELATIVE",
        elf::R_X86_64_GOTOFF64 => "R_X86_64_GOTOFF64",
        elf::R_X86_64_GOTPC32 => "R_X86_64_GOTPC32",
        elf::R_X86_64_GOT64 => "R_X86_64_GOT64",
        elf::R_X86_64_GOTPCREL64 => "R_X86_64_GOTPCREL64",
        elf::R_X86_64_GOTPC64 => "R_X86_64_GOTPC64",
        elf::R_X86_64_GOTPLT64 => "R_X86_64_GOTPLT64",
        elf::R_X86_64_PLTOFF64 => "R_X86_64_PLTOFF64",
        elf::R_X86_64_TPOFF32 => "R_X86_64_TPOFF32",
        elf::R_X86_64_GOTTPOFF => "R_X86_64_GOTTPOFF",
        elf::R_X86_64_GOTPCRELX => "R_X86_64_GOTPCRELX",
        elf::R_X86_64_REX_GOTPCRELX => "R_X86_64_REX_GOTPCRELX",
        _ => "R_X86_64_UNKNOWN",
    }
}

/// `S+A`, `S+A-P`, `B+A`, `L+A-P`, ... per the x86-64 psABI relocation table.
pub fn apply(req: &RelocationRequest) -> Result<Resolved> {
    let s = req.sym_value as i64;
    let a = req.addend;
    let p = req.place as i64;
    let b = req.load_bias as i64;

    let (value, width): (i64, Width) = match req.rel_type {
        elf::R_X86_64_NONE => (0, Width::W64),
        elf::R_X86_64_64 => (s + a, Width::W64),
        elf::R_X86_64_PC32 => (s + a - p, Width::W32),
        elf::R_X86_64_GOT32 => (got_entry(req)? as i64 + a, Width::W32),
        // `L+A-P` when a PLT slot was actually allocated for this symbol,
        // else falls back to a direct `S+A-P` call (SPEC_FULL §4.E table).
        elf::R_X86_64_PLT32 => match req.plt_entry {
            Some(l) => (l as i64 + a - p, Width::W32),
            None => (s + a - p, Width::W32),
        },
        elf::R_X86_64_GLOB_DAT => (s, Width::W64),
        elf::R_X86_64_JUMP_SLOT => (s, Width::W64),
        elf::R_X86_64_RELATIVE => (b + a, Width::W64),
        elf::R_X86_64_GOTPCREL | elf::R_X86_64_GOTPCRELX | elf::R_X86_64_REX_GOTPCRELX | elf::R_X86_64_GOTTPOFF => {
            (got_entry(req)? as i64 + got_base(req)? as i64 + a - p, Width::W32)
        }
        elf::R_X86_64_32 => (s + a, Width::W32),
        elf::R_X86_64_32S => (s + a, Width::W32),
        elf::R_X86_64_16 => (s + a, Width::W16),
        elf::R_X86_64_PC16 => (s + a - p, Width::W16),
        elf::R_X86_64_8 => (s + a, Width::W8),
        elf::R_X86_64_PC8 => (s + a - p, Width::W8),
        elf::R_X86_64_TPOFF64 => (s + a, Width::W64),
        elf::R_X86_64_DTPOFF64 => (s + a, Width::W64),
        elf::R_X86_64_IRELATIVE => (b + a, Width::W64),
        elf::R_X86_64_GOTOFF64 => (s + a - got_base(req)? as i64, Width::W64),
        elf::R_X86_64_GOTPC32 => (got_base(req)? as i64 + a - p, Width::W32),
        elf::R_X86_64_GOT64 => (got_entry(req)? as i64 + a, Width::W64),
        elf::R_X86_64_GOTPCREL64 => (got_entry(req)? as i64 + got_base(req)? as i64 - p + a, Width::W64),
        elf::R_X86_64_GOTPC64 => (got_base(req)? as i64 - p + a, Width::W64),
        elf::R_X86_64_GOTPLT64 => (got_entry(req)? as i64 + a, Width::W64),
        elf::R_X86_64_PLTOFF64 => (plt_entry(req)? as i64 - got_base(req)? as i64 + a, Width::W64),
        // Precomputed TLS offset (SPEC_FULL §4.F step 4), written directly
        // as an immediate rather than derived from S/A/P.
        elf::R_X86_64_TPOFF32 => (
            req.tls_offset
                .ok_or_else(|| crate::error::relocation_invalid(req.place, "no TLS offset computed"))?,
            Width::W32,
        ),
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

/// A minimal PIC-friendly PLT0-style stub: `jmp *got_slot(%rip)`, padded with
/// `nop`s to a fixed 16-byte entry, matching the layout `ld.bso` emits.
pub fn plt_stub(stub_addr: u64, got_slot_addr: u64) -> Vec<u8> {
    let rel = (got_slot_addr as i64 - (stub_addr as i64 + 6)) as i32;
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&[0xff, 0x25]);
    bytes.extend_from_slice(&rel.to_le_bytes());
    bytes.extend_from_slice(&[0x66, 0x90, 0x66, 0x90, 0x66, 0x90, 0x66, 0x90, 0x66, 0x90]);
    bytes
}

pub const PLT_STUB_SIZE: usize = 16;

pub fn descriptor() -> ArchDescriptor {
    ArchDescriptor {
        name: "x86_64",
        code: super::ARCH_CODE_X86_64,
        format: super::Format::Elf,
        machine: elf::EM_X86_64,
        word: super::Word::W64,
        rel_types: REL_TYPES,
        rel_type_name,
        apply_reloc: apply,
        plt_stub,
        plt_stub_size: PLT_STUB_SIZE,
    }
}
