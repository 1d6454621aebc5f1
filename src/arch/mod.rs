//! Architecture registry (SPEC_FULL §4.A).
//!
//! The teacher crate this repository descends from selects exactly one
//! architecture at compile time via `cfg_if!` on `target_arch`, because it
//! only ever loads code for the host it runs on. A rewriter has no such
//! luxury: it must be able to open an ELF file built for any architecture
//! regardless of where the rewriter itself runs. So every descriptor below
//! is compiled in unconditionally and looked up at runtime through
//! [`Registry`], a `HashMap<(Format, u16), &'static ArchDescriptor>` built
//! once at startup — there is no `target_arch` gate anywhere in this crate.

pub mod aarch64;
pub mod arm;
pub mod x86;
pub mod x86_64;

use hashbrown::HashMap;

use crate::error::{self, Error, Result};
use crate::relocate::request::{RelocationRequest, Resolved};

/// Binary container format. ELF is the only format this crate parses; the
/// variant exists because the architecture-lookup keys of the original tool
/// are `(format, machine-code)` pairs, not bare machine codes, to leave room
/// for other container formats at the dispatch layer without disturbing the
/// registry's key shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Elf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    W32,
    W64,
}

impl Word {
    pub fn bytes(self) -> usize {
        match self {
            Word::W32 => 4,
            Word::W64 => 8,
        }
    }
}

/// Internal numeric architecture codes, stable across process runs, used by
/// the name/code/fmt-and-code lookup triad (SPEC_FULL §2b).
pub const ARCH_CODE_X86_64: u32 = 1;
pub const ARCH_CODE_X86: u32 = 2;
pub const ARCH_CODE_AARCH64: u32 = 3;
pub const ARCH_CODE_ARM: u32 = 4;

pub struct ArchDescriptor {
    pub name: &'static str,
    pub code: u32,
    pub format: Format,
    pub machine: u16,
    pub word: Word,
    pub rel_types: &'static [u32],
    pub rel_type_name: fn(u32) -> &'static str,
    pub apply_reloc: fn(&RelocationRequest) -> Result<Resolved>,
    pub plt_stub: fn(stub_addr: u64, got_slot_addr: u64) -> Vec<u8>,
    pub plt_stub_size: usize,
}

impl ArchDescriptor {
    pub fn supports_relocation(&self, rel_type: u32) -> bool {
        self.rel_types.contains(&rel_type)
    }
}

/// Runtime architecture registry, built once and looked up by
/// `(format, machine-code)`, by short name, or by internal numeric code.
pub struct Registry {
    by_fmt_and_code: HashMap<(Format, u16), &'static ArchDescriptor>,
    by_name: HashMap<&'static str, &'static ArchDescriptor>,
    by_code: HashMap<u32, &'static ArchDescriptor>,
}

static X86_64: std::sync::OnceLock<ArchDescriptor> = std::sync::OnceLock::new();
static X86: std::sync::OnceLock<ArchDescriptor> = std::sync::OnceLock::new();
static AARCH64: std::sync::OnceLock<ArchDescriptor> = std::sync::OnceLock::new();
static ARM: std::sync::OnceLock<ArchDescriptor> = std::sync::OnceLock::new();

fn all_descriptors() -> [&'static ArchDescriptor; 4] {
    [
        X86_64.get_or_init(x86_64::descriptor),
        X86.get_or_init(x86::descriptor),
        AARCH64.get_or_init(aarch64::descriptor),
        ARM.get_or_init(arm::descriptor),
    ]
}

impl Registry {
    pub fn new() -> Self {
        let mut by_fmt_and_code = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_code = HashMap::new();
        for desc in all_descriptors() {
            by_fmt_and_code.insert((desc.format, desc.machine), desc);
            by_name.insert(desc.name, desc);
            by_code.insert(desc.code, desc);
        }
        Registry {
            by_fmt_and_code,
            by_name,
            by_code,
        }
    }

    pub fn by_format_and_machine(&self, format: Format, machine: u16) -> Result<&'static ArchDescriptor> {
        self.by_fmt_and_code
            .get(&(format, machine))
            .copied()
            .ok_or_else(|| error::arch_unknown(format!("machine code {machine:#x}")))
    }

    pub fn by_name(&self, name: &str) -> Result<&'static ArchDescriptor> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| error::arch_unknown(name.to_string()))
    }

    pub fn by_code(&self, code: u32) -> Result<&'static ArchDescriptor> {
        self.by_code
            .get(&code)
            .copied()
            .ok_or_else(|| error::arch_unknown(format!("architecture code {code}")))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_x86_64_by_all_three_keys() {
        let reg = Registry::new();
        let by_machine = reg
            .by_format_and_machine(Format::Elf, object::elf::EM_X86_64)
            .unwrap();
        assert_eq!(by_machine.name, "x86_64");
        assert_eq!(reg.by_name("x86_64").unwrap().machine, object::elf::EM_X86_64);
        assert_eq!(reg.by_code(ARCH_CODE_X86_64).unwrap().name, "x86_64");
    }

    #[test]
    fn unknown_machine_is_an_error() {
        let reg = Registry::new();
        assert!(reg.by_format_and_machine(Format::Elf, 0xffff).is_err());
    }

    #[test]
    fn rel_type_name_falls_back_to_unknown() {
        assert_eq!(x86_64::rel_type_name(0xffff), "R_X86_64_UNKNOWN");
    }
}
