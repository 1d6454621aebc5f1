//! The parsed-ELF model's section entity (`binscn`, SPEC_FULL §3).

use bitflags::bitflags;

use crate::elf::rel::RelEntry;
use crate::elf::sym::SymEntry;
use crate::model::dynamic::DynTag;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScnAttrs: u32 {
        const LOAD          = 1 << 0;
        const READ          = 1 << 1;
        const WRITE         = 1 << 2;
        const EXEC          = 1 << 3;
        const TLS           = 1 << 4;
        const PATCHED       = 1 << 5;
        const PATCH_REORDER = 1 << 6;
        const STDCODE       = 1 << 7;
        const EXTFCT_STUBS  = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScnKind {
    Code,
    Data,
    ZeroData,
    String,
    Label,
    Reloc { rela: bool },
    Refs,
    Unknown,
}

/// A section's typed entry array. Heterogeneous sections (string tables,
/// raw byte blobs) use `Raw`; everything the model understands structurally
/// uses the variant matching its kind.
#[derive(Debug, Clone)]
pub enum Entry {
    Nil,
    Raw(Vec<u8>),
    Val(u64),
    Str(String),
    Sym(SymEntry),
    Rel(RelEntry),
    Dyn(DynTag),
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub sh_name: u32,
    pub kind: ScnKind,
    pub sh_type: u32,
    pub attrs: ScnAttrs,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub align: u64,
    pub entsize: u64,
    pub link: u32,
    pub info: u32,
    pub entries: Vec<Entry>,
    /// Raw bytes as last written out; `None` for `NOBITS`. Authoritative
    /// only until the first mutation of `entries`, per the copy-on-write
    /// rule in SPEC_FULL §3's Lifecycle section.
    pub raw: Option<Vec<u8>>,
    pub patched: bool,
}

impl Section {
    pub fn is_nobits(&self) -> bool {
        self.sh_type == object::elf::SHT_NOBITS
    }

    pub fn mark_patched(&mut self) {
        self.patched = true;
        self.attrs.insert(ScnAttrs::PATCHED);
    }
}
