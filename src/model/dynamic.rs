//! `.dynamic` section entry, and the parsed dynamic-section summary used by
//! the grafter and reorder passes (SPEC_FULL §4.C, §4.F).
//!
//! Grounded on `examples/weizhiao-rust-elfloader/src/dynamic.rs`'s
//! `ElfDynamic::new`, which walks every `DT_*` tag in one exhaustive match;
//! the runtime-loader fields that only matter to a live process (hash-table
//! pointers used for symbol lookup at load time, `DT_FLAGS`/`DT_FLAGS_1`
//! bit tests gating lazy binding) are dropped, since this crate never
//! resolves symbols through a hash table at runtime (DESIGN.md, GNU hash
//! table maintenance).

use object::elf as e;

use crate::elf::dynent::DynEntry;

#[derive(Debug, Clone, Copy)]
pub struct DynTag {
    pub tag: i64,
    pub val: u64,
}

impl From<DynEntry> for DynTag {
    fn from(d: DynEntry) -> Self {
        DynTag {
            tag: d.d_tag,
            val: d.d_val,
        }
    }
}

/// Summary of the handful of `.dynamic` tags the rewriter actually acts on:
/// `DT_NEEDED` entries (to add/rename a library dependency), the string
/// table backing them, and the relocation-table bounds (to grow them when
/// grafting).
#[derive(Debug, Clone, Default)]
pub struct DynamicSummary {
    pub needed_str_offsets: Vec<u64>,
    pub strtab_off: Option<u64>,
    pub strtab_size: Option<u64>,
    pub symtab_off: Option<u64>,
    pub pltgot: Option<u64>,
    pub pltrelsz: Option<u64>,
    pub pltrel_is_rela: bool,
    pub jmprel_off: Option<u64>,
    pub rela_off: Option<u64>,
    pub rela_size: Option<u64>,
    pub rel_off: Option<u64>,
    pub rel_size: Option<u64>,
    pub init_array: Option<(u64, u64)>,
    pub fini_array: Option<(u64, u64)>,
}

impl DynamicSummary {
    pub fn from_entries(entries: &[DynTag]) -> DynamicSummary {
        let mut out = DynamicSummary::default();
        for d in entries {
            match d.tag {
                x if x == e::DT_NEEDED as i64 => out.needed_str_offsets.push(d.val),
                x if x == e::DT_STRTAB as i64 => out.strtab_off = Some(d.val),
                x if x == e::DT_STRSZ as i64 => out.strtab_size = Some(d.val),
                x if x == e::DT_SYMTAB as i64 => out.symtab_off = Some(d.val),
                x if x == e::DT_PLTGOT as i64 => out.pltgot = Some(d.val),
                x if x == e::DT_PLTRELSZ as i64 => out.pltrelsz = Some(d.val),
                x if x == e::DT_PLTREL as i64 => out.pltrel_is_rela = d.val == e::DT_RELA as u64,
                x if x == e::DT_JMPREL as i64 => out.jmprel_off = Some(d.val),
                x if x == e::DT_RELA as i64 => out.rela_off = Some(d.val),
                x if x == e::DT_RELASZ as i64 => out.rela_size = Some(d.val),
                x if x == e::DT_REL as i64 => out.rel_off = Some(d.val),
                x if x == e::DT_RELSZ as i64 => out.rel_size = Some(d.val),
                x if x == e::DT_INIT_ARRAY as i64 => {
                    out.init_array = Some((d.val, out.init_array.map_or(0, |(_, s)| s)))
                }
                x if x == e::DT_INIT_ARRAYSZ as i64 => {
                    out.init_array = Some((out.init_array.map_or(0, |(a, _)| a), d.val))
                }
                x if x == e::DT_FINI_ARRAY as i64 => {
                    out.fini_array = Some((d.val, out.fini_array.map_or(0, |(_, s)| s)))
                }
                x if x == e::DT_FINI_ARRAYSZ as i64 => {
                    out.fini_array = Some((out.fini_array.map_or(0, |(a, _)| a), d.val))
                }
                _ => {}
            }
        }
        out
    }
}
