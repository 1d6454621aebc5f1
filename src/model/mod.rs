//! Parsed-ELF model (SPEC_FULL §4.C): the in-memory mirror of one ELF file —
//! headers, section array, segment array, per-section typed entry array,
//! the label index, and the cross-reference table.
//!
//! Parsing order follows SPEC_FULL §4.C verbatim: the section-names string
//! table first, then every section carrying symbols (which recursively pull
//! in their linked string tables), then every remaining non-relocation
//! section, then relocation sections last (they address other sections
//! either by index or by virtual address, both of which must already exist).

pub mod dynamic;
pub mod label;
pub mod pointer;
pub mod section;
pub mod segment;
pub mod xref;

use hashbrown::HashMap;
use object::elf as e;
use object::Endianness;

use crate::elf::{dynent, phdr, rel, shdr, sym, ElfClass, Header};
use crate::error::{self, Result};

use dynamic::DynTag;
use label::{Label, LabelKind, TargetKind};
use section::{Entry, ScnAttrs, ScnKind, Section};
use segment::Segment;
use xref::{Updater, XrefEntry, XrefTable};

/// Resolves a label's apparent type to `Function` when the address is known
/// to be a function entry. The real debug-info reader lives outside this
/// crate (SPEC_FULL §6); this trait is the seam it plugs into.
pub trait DebugInfo {
    fn function_at(&self, _addr: u64) -> Option<String> {
        None
    }
}

/// No-op default used when no debug-info reader is supplied to [`parse`].
pub struct NoDebugInfo;
impl DebugInfo for NoDebugInfo {}

/// Important, name-addressed section indices (SPEC_FULL §3, `elffile`).
#[derive(Debug, Clone, Default)]
pub struct ImportantSections {
    pub symtab: Option<usize>,
    pub dynsym: Option<usize>,
    pub strtab: Option<usize>,
    pub dynstr: Option<usize>,
    pub shstrtab: Option<usize>,
    pub dynamic: Option<usize>,
    pub jmprel: Option<usize>,
    pub relaplt: Option<usize>,
    pub got: Option<usize>,
    pub gotplt: Option<usize>,
    pub plt: Option<usize>,
    pub madras_text: Option<usize>,
    pub madras_plt: Option<usize>,
    pub madras_data: Option<usize>,
    pub bss: Option<usize>,
    pub tbss: Option<usize>,
    pub tdata: Option<usize>,
    pub versym: Option<usize>,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModelFlags: u32 {
        /// This model is a patching copy of another (SPEC_FULL §3/§5).
        const PATCHCOPY = 1 << 0;
    }
}

/// The parsed-ELF model (`elffile`, SPEC_FULL §3).
#[derive(Clone)]
pub struct ElfModel {
    pub header: Header,
    pub sections: Vec<Section>,
    pub segments: Vec<Segment>,
    pub important: ImportantSections,
    pub xref: XrefTable,
    pub labels: Vec<Label>,
    pub label_index: HashMap<String, usize>,
    pub extern_libs: Vec<String>,
    pub flags: ModelFlags,
    /// old section index -> new section index, filled in by finalise (§4.G).
    pub old_to_new: Vec<Option<usize>>,
}

impl ElfModel {
    pub fn word(&self) -> crate::arch::Word {
        self.header.word()
    }

    pub fn section(&self, i: usize) -> Result<&Section> {
        self.sections
            .get(i)
            .ok_or_else(|| error::missing_section(format!("no section at index {i}")))
    }

    pub fn section_mut(&mut self, i: usize) -> Result<&mut Section> {
        self.sections
            .get_mut(i)
            .ok_or_else(|| error::missing_section(format!("no section at index {i}")))
    }

    pub fn section_by_name(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// `lookup_scn_span_addr` (SPEC_FULL §4.D): the loaded section whose
    /// `[addr, addr+size)` range contains `addr`.
    pub fn lookup_scn_span_addr(&self, addr: u64) -> Option<usize> {
        self.sections.iter().position(|s| {
            s.attrs.contains(ScnAttrs::LOAD) && addr >= s.addr && addr < s.addr + s.size.max(1)
        })
    }

    pub fn label_by_name(&self, name: &str) -> Option<&Label> {
        self.label_index.get(name).map(|&i| &self.labels[i])
    }

    /// Clones this model for a patching session (SPEC_FULL §3/§5): the copy
    /// starts subordinate to its creator with every section unpatched; see
    /// `binfile::patch::patch_init_copy`.
    pub fn clone_for_patch(&self) -> ElfModel {
        let mut copy = self.clone();
        copy.flags.insert(ModelFlags::PATCHCOPY);
        copy
    }

    /// Registers or overwrites a label by name; SPEC_FULL §8's label
    /// uniqueness property — the later insertion wins.
    pub fn insert_label(&mut self, label: Label) {
        let name = label.name.clone();
        if let Some(&existing) = self.label_index.get(&name) {
            self.labels[existing] = label;
        } else {
            let idx = self.labels.len();
            self.labels.push(label);
            self.label_index.insert(name, idx);
        }
    }
}

fn classify_kind(name: &str, sh_type: u32, sh_flags: u64) -> ScnKind {
    match sh_type {
        e::SHT_NOBITS => ScnKind::ZeroData,
        e::SHT_STRTAB => ScnKind::String,
        e::SHT_SYMTAB | e::SHT_DYNSYM => ScnKind::Label,
        e::SHT_REL => ScnKind::Reloc { rela: false },
        e::SHT_RELA => ScnKind::Reloc { rela: true },
        e::SHT_DYNAMIC => ScnKind::Data,
        _ if sh_flags & e::SHF_EXECINSTR as u64 != 0 => ScnKind::Code,
        _ if name == ".got" || name == ".got.plt" || name == ".init_array" || name == ".fini_array" => {
            ScnKind::Refs
        }
        e::SHT_PROGBITS if sh_flags & e::SHF_ALLOC as u64 != 0 => ScnKind::Data,
        e::SHT_NULL => ScnKind::Unknown,
        _ => ScnKind::Unknown,
    }
}

fn classify_attrs(name: &str, sh_flags: u64) -> ScnAttrs {
    let mut attrs = ScnAttrs::empty();
    if sh_flags & e::SHF_ALLOC as u64 != 0 {
        attrs.insert(ScnAttrs::LOAD);
        attrs.insert(ScnAttrs::READ);
    }
    if sh_flags & e::SHF_WRITE as u64 != 0 {
        attrs.insert(ScnAttrs::WRITE);
    }
    if sh_flags & e::SHF_EXECINSTR as u64 != 0 {
        attrs.insert(ScnAttrs::EXEC);
    }
    if sh_flags & e::SHF_TLS as u64 != 0 {
        attrs.insert(ScnAttrs::TLS);
    }
    if matches!(name, ".text" | ".init" | ".fini") {
        attrs.insert(ScnAttrs::STDCODE);
    }
    if name == ".plt" {
        attrs.insert(ScnAttrs::EXTFCT_STUBS);
    }
    if name.starts_with(".madras.") || name == ".dyninst" {
        attrs.insert(ScnAttrs::PATCHED);
    }
    attrs
}

fn read_cstr(buf: &[u8], off: usize) -> String {
    let end = buf[off..].iter().position(|&b| b == 0).map(|p| off + p).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[off..end]).into_owned()
}

/// Implements SPEC_FULL §4.C's parse algorithm: verify magic, read headers,
/// load section names, then symbol-bearing sections, then the rest, then
/// relocations last. `debug` refines ambiguous generic labels into functions
/// (SPEC_FULL §6); pass [`NoDebugInfo`] when no reader is available.
pub fn parse(data: &[u8], debug: &dyn DebugInfo) -> Result<ElfModel> {
    let header = Header::parse(data)?;
    let class = header.class;
    let endian = header.endian;

    let shdrs = if header.e_shoff != 0 && header.e_shnum != 0 {
        shdr::parse_table(data, class, endian, header.e_shoff, header.e_shnum)?
    } else {
        Vec::new()
    };
    let phdrs = if header.e_phoff != 0 && header.e_phnum != 0 {
        phdr::parse_table(data, class, endian, header.e_phoff, header.e_phnum)?
    } else {
        Vec::new()
    };

    // Section-names string table first.
    let shstrtab_data: &[u8] = if (header.e_shstrndx as usize) < shdrs.len() {
        let s = &shdrs[header.e_shstrndx as usize];
        data.get(s.sh_offset as usize..(s.sh_offset + s.sh_size) as usize)
            .unwrap_or(&[])
    } else {
        &[]
    };

    let mut sections: Vec<Section> = shdrs
        .iter()
        .map(|s| {
            let name = read_cstr(shstrtab_data, s.sh_name as usize);
            Section {
                sh_name: s.sh_name,
                kind: classify_kind(&name, s.sh_type, s.sh_flags),
                sh_type: s.sh_type,
                attrs: classify_attrs(&name, s.sh_flags),
                addr: s.sh_addr,
                offset: s.sh_offset,
                size: s.sh_size,
                align: s.sh_addralign.max(1),
                entsize: s.sh_entsize,
                link: s.sh_link,
                info: s.sh_info,
                entries: Vec::new(),
                raw: None,
                patched: false,
                name,
            }
        })
        .collect();

    let mut important = ImportantSections::default();
    for (i, s) in sections.iter().enumerate() {
        match s.name.as_str() {
            ".symtab" => important.symtab = Some(i),
            ".dynsym" => important.dynsym = Some(i),
            ".strtab" => important.strtab = Some(i),
            ".dynstr" => important.dynstr = Some(i),
            ".shstrtab" => important.shstrtab = Some(i),
            ".dynamic" => important.dynamic = Some(i),
            ".rela.plt" | ".rel.plt" => {
                important.jmprel = Some(i);
                important.relaplt = Some(i);
            }
            ".got" => important.got = Some(i),
            ".got.plt" => important.gotplt = Some(i),
            ".plt" => important.plt = Some(i),
            ".madras.text" => important.madras_text = Some(i),
            ".madras.plt" => important.madras_plt = Some(i),
            ".madras.data" => important.madras_data = Some(i),
            ".bss" => important.bss = Some(i),
            ".tbss" => important.tbss = Some(i),
            ".tdata" => important.tdata = Some(i),
            ".gnu.version" => important.versym = Some(i),
            _ => {}
        }
    }

    let mut model = ElfModel {
        header,
        sections: Vec::new(),
        segments: Vec::new(),
        important,
        xref: XrefTable::new(),
        labels: Vec::new(),
        label_index: HashMap::new(),
        extern_libs: Vec::new(),
        flags: ModelFlags::empty(),
        old_to_new: Vec::new(),
    };

    // Pass order: symbol sections first (they recursively need their linked
    // string tables), then everything else non-relocation, then relocations.
    let symbol_idxs: Vec<usize> = (0..sections.len())
        .filter(|&i| matches!(sections[i].sh_type, x if x == e::SHT_SYMTAB || x == e::SHT_DYNSYM))
        .collect();
    let reloc_idxs: Vec<usize> = (0..sections.len())
        .filter(|&i| matches!(sections[i].sh_type, x if x == e::SHT_REL || x == e::SHT_RELA))
        .collect();
    let rest_idxs: Vec<usize> = (0..sections.len())
        .filter(|i| !symbol_idxs.contains(i) && !reloc_idxs.contains(i))
        .collect();

    for &i in symbol_idxs.iter().chain(rest_idxs.iter()) {
        load_section(data, class, endian, &mut sections, i, debug, &mut model)?;
    }
    for &i in &reloc_idxs {
        load_section(data, class, endian, &mut sections, i, debug, &mut model)?;
    }

    model.sections = sections;
    model.segments = build_segments(&phdrs, &model.sections);
    model.old_to_new = (0..model.sections.len()).map(Some).collect();

    Ok(model)
}

#[allow(clippy::too_many_arguments)]
fn load_section(
    data: &[u8],
    class: ElfClass,
    endian: Endianness,
    sections: &mut [Section],
    i: usize,
    debug: &dyn DebugInfo,
    model: &mut ElfModel,
) -> Result<()> {
    let sh_type = sections[i].sh_type;
    let off = sections[i].offset;
    let size = sections[i].size;
    let link = sections[i].link as usize;

    match sh_type {
        x if x == e::SHT_SYMTAB || x == e::SHT_DYNSYM => {
            let entries = sym::parse_table(data, class, endian, off, size)?;
            let strtab_off = sections.get(link).map(|s| s.offset).unwrap_or(0);
            let strtab_size = sections.get(link).map(|s| s.size).unwrap_or(0);
            let strtab = data
                .get(strtab_off as usize..(strtab_off + strtab_size) as usize)
                .unwrap_or(&[]);
            let owning_is_code = |shndx: u16| {
                sections
                    .get(shndx as usize)
                    .map(|s| s.attrs.contains(ScnAttrs::EXEC))
                    .unwrap_or(false)
            };
            let mut out_entries = Vec::with_capacity(entries.len());
            for (j, se) in entries.iter().enumerate() {
                let name = read_cstr(strtab, se.st_name as usize);
                let mut kind = if se.st_shndx == e::SHN_UNDEF {
                    LabelKind::ExternalFunction
                } else if se.sym_type() == e::STT_FUNC {
                    LabelKind::Function
                } else if se.sym_type() == e::STT_OBJECT {
                    LabelKind::Variable
                } else if se.is_dummy() {
                    LabelKind::Dummy
                } else if se.bind() == e::STB_LOCAL {
                    LabelKind::NoFunction
                } else if name.starts_with('$') {
                    LabelKind::NoFunction
                } else {
                    LabelKind::Generic
                };
                if kind == LabelKind::Generic {
                    if let Some(fname) = debug.function_at(se.st_value) {
                        kind = LabelKind::Function;
                        if name.is_empty() {
                            log::trace!("promoted anonymous generic label at {:#x} to function {fname}", se.st_value);
                        }
                    }
                }
                let target = if se.st_shndx == e::SHN_UNDEF {
                    TargetKind::Undef
                } else if owning_is_code(se.st_shndx) {
                    TargetKind::Insn
                } else {
                    TargetKind::Data
                };
                if !name.is_empty() {
                    model.insert_label(Label {
                        name: name.clone(),
                        address: se.st_value,
                        kind,
                        target,
                        section: se.st_shndx as usize,
                    });
                }
                if se.st_shndx != e::SHN_UNDEF {
                    if let Some(owner) = sections.get(se.st_shndx as usize) {
                        let offset = se.st_value.saturating_sub(owner.addr);
                        model.xref.insert((i, j), XrefEntry::new(se.st_shndx as usize, offset, Updater::Sym));
                    }
                }
                out_entries.push(Entry::Sym(*se));
            }
            sections[i].entries = out_entries;
        }
        x if x == e::SHT_REL || x == e::SHT_RELA => {
            let entries = if x == e::SHT_RELA {
                rel::parse_rela_table(data, class, endian, off, size)?
            } else {
                rel::parse_rel_table(data, class, endian, off, size)?
            };
            // sh_info gives the target section only for relocatable files
            // (r_offset is an in-section offset there); for executables and
            // shared libraries r_offset is a virtual address instead, so the
            // target must be found by address regardless of sh_info.
            let target_by_info = if model.header.e_type == e::ET_REL {
                sections.get(sections[i].info as usize).map(|_| sections[i].info as usize)
            } else {
                None
            };
            let mut out = Vec::with_capacity(entries.len());
            for (j, re) in entries.iter().enumerate() {
                let (target_section, offset) = if let Some(t) = target_by_info {
                    (t, re.r_offset)
                } else if let Some(t) = model.lookup_scn_span_addr(re.r_offset) {
                    let base = sections[t].addr;
                    (t, re.r_offset.saturating_sub(base))
                } else {
                    (i, 0)
                };
                let updater = if re.r_addend.is_some() { Updater::Rela } else { Updater::Rel };
                model.xref.insert((i, j), XrefEntry::new(target_section, offset, updater));
                out.push(Entry::Rel(*re));
            }
            sections[i].entries = out;
        }
        x if x == e::SHT_DYNAMIC => {
            let entries = dynent::parse_table(data, class, endian, off, size)?;
            let dynstr = model.important.dynstr.and_then(|idx| sections.get(idx)).map(|s| (s.offset, s.size));
            let mut out = Vec::with_capacity(entries.len());
            for (j, d) in entries.iter().enumerate() {
                let tag = d.d_tag;
                out.push(Entry::Dyn(DynTag::from(*d)));
                if tag == e::DT_NEEDED as i64 || tag == e::DT_SONAME as i64 || tag == e::DT_RPATH as i64 {
                    if tag == e::DT_NEEDED as i64 {
                        if let Some((doff, dsize)) = dynstr {
                            let strtab = data.get(doff as usize..(doff + dsize) as usize).unwrap_or(&[]);
                            model.extern_libs.push(read_cstr(strtab, d.d_val as usize));
                        }
                    }
                } else if is_addr_valued_tag(tag) {
                    if let Some(t) = model.lookup_scn_span_addr(d.d_val) {
                        let base = sections[t].addr;
                        model.xref.insert((i, j), XrefEntry::new(t, d.d_val.saturating_sub(base), Updater::Dyn { tag }));
                    }
                }
            }
            sections[i].entries = out;
        }
        x if x == e::SHT_STRTAB => {
            let bytes = data.get(off as usize..(off + size) as usize).unwrap_or(&[]).to_vec();
            sections[i].raw = Some(bytes);
        }
        x if x == e::SHT_NOBITS => {
            // No file bytes; entries stay empty, matching the NOBITS invariant.
        }
        _ if sections[i].name == ".gnu.version" => {
            let bytes = data.get(off as usize..(off + size) as usize).unwrap_or(&[]);
            let mut out = Vec::with_capacity(bytes.len() / 2);
            for chunk in bytes.chunks_exact(2) {
                let v = match endian {
                    Endianness::Little => u16::from_le_bytes([chunk[0], chunk[1]]),
                    Endianness::Big => u16::from_be_bytes([chunk[0], chunk[1]]),
                };
                out.push(Entry::Val(v as u64));
            }
            sections[i].entries = out;
        }
        _ => {
            let name = sections[i].name.clone();
            if name.starts_with(".got") {
                let bytes = data.get(off as usize..(off + size) as usize).unwrap_or(&[]);
                let word = model.word().bytes();
                let mut out = Vec::new();
                for (j, chunk) in bytes.chunks_exact(word).enumerate() {
                    let v = read_word(chunk, word, endian);
                    if v != 0 {
                        if let Some(t) = model.lookup_scn_span_addr(v) {
                            let base = sections[t].addr;
                            model.xref.insert((i, j), XrefEntry::new(t, v.saturating_sub(base), Updater::Addr));
                        }
                    }
                    out.push(Entry::Val(v));
                }
                sections[i].entries = out;
            } else {
                let bytes = data.get(off as usize..(off + size) as usize).unwrap_or(&[]).to_vec();
                sections[i].raw = Some(bytes);
            }
        }
    }
    Ok(())
}

fn is_addr_valued_tag(tag: i64) -> bool {
    matches!(
        tag as u32,
        x if x == e::DT_PLTGOT
            || x == e::DT_JMPREL
            || x == e::DT_HASH
            || x == e::DT_STRTAB
            || x == e::DT_SYMTAB
            || x == e::DT_RELA
            || x == e::DT_INIT
            || x == e::DT_FINI
            || x == e::DT_REL
            || x == e::DT_VERSYM
    )
}

fn read_word(chunk: &[u8], word: usize, endian: Endianness) -> u64 {
    match (word, endian) {
        (4, Endianness::Little) => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64,
        (4, Endianness::Big) => u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64,
        (8, Endianness::Little) => u64::from_le_bytes(chunk.try_into().unwrap()),
        (8, Endianness::Big) => u64::from_be_bytes(chunk.try_into().unwrap()),
        _ => 0,
    }
}

fn build_segments(phdrs: &[crate::elf::phdr::Phdr], sections: &[Section]) -> Vec<Segment> {
    phdrs
        .iter()
        .map(|p| {
            let mut attrs = ScnAttrs::empty();
            if p.p_flags & e::PF_R != 0 {
                attrs.insert(ScnAttrs::READ);
            }
            if p.p_flags & e::PF_W != 0 {
                attrs.insert(ScnAttrs::WRITE);
            }
            if p.p_flags & e::PF_X != 0 {
                attrs.insert(ScnAttrs::EXEC);
            }
            if p.p_type == e::PT_TLS {
                attrs.insert(ScnAttrs::TLS);
            }
            if p.p_type == e::PT_LOAD {
                attrs.insert(ScnAttrs::LOAD);
            }
            let owned: Vec<usize> = if p.p_type == e::PT_LOAD || p.p_type == e::PT_TLS {
                sections
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| {
                        s.attrs.contains(ScnAttrs::LOAD)
                            && s.addr >= p.p_vaddr
                            && s.addr < p.p_vaddr + p.p_memsz.max(1)
                    })
                    .map(|(i, _)| i)
                    .collect()
            } else {
                Vec::new()
            };
            Segment {
                p_type: p.p_type,
                attrs,
                offset: p.p_offset,
                vaddr: p.p_vaddr,
                paddr: p.p_paddr,
                filesz: p.p_filesz,
                memsz: p.p_memsz,
                align: p.p_align,
                sections: owned,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf64() -> Vec<u8> {
        let mut v = vec![0u8; 64];
        v[0..4].copy_from_slice(e::ELFMAG);
        v[e::EI_CLASS] = e::ELFCLASS64;
        v[e::EI_DATA] = e::ELFDATA2LSB;
        v[e::EI_VERSION] = e::EV_CURRENT;
        v[16..18].copy_from_slice(&e::ET_EXEC.to_le_bytes());
        v[18..20].copy_from_slice(&e::EM_X86_64.to_le_bytes());
        v[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        v
    }

    #[test]
    fn parses_header_only_fixture_with_no_sections() {
        let bytes = minimal_elf64();
        let model = parse(&bytes, &NoDebugInfo).unwrap();
        assert_eq!(model.sections.len(), 0);
        assert_eq!(model.segments.len(), 0);
    }

    #[test]
    fn classify_attrs_marks_madras_sections_patched() {
        let attrs = classify_attrs(".madras.text", e::SHF_ALLOC as u64 | e::SHF_EXECINSTR as u64);
        assert!(attrs.contains(ScnAttrs::PATCHED));
        assert!(attrs.contains(ScnAttrs::EXEC));
    }
}
