//! Patching-session API (SPEC_FULL §4.D): copy-on-write section/entry access,
//! label/section/segment insertion, and the finalise/write pipeline that
//! hands off to the reorder packer (§4.G) and writer (§4.H).

use crate::binfile::scn;
use crate::binfile::{BinFile, PatchState};
use crate::error::{self, Result};
use crate::model::label::{Label, LabelKind};
use crate::model::section::{Entry, ScnAttrs, Section};
use crate::model::segment::Segment;
use crate::model::xref::{Updater, XrefEntry};

impl BinFile {
    /// `patch_init_copy` (SPEC_FULL §4.D): clones `origin`'s model into a new
    /// `binfile` in `patching` state. The clone starts with every section's
    /// `patched` flag unset; the first mutation of a section flips it.
    pub fn patch_init_copy(origin: &BinFile) -> BinFile {
        let mut copy = BinFile {
            format: origin.format,
            file_type: origin.file_type,
            arch: origin.arch,
            model: origin.model.clone_for_patch(),
            state: PatchState::Patching,
            is_patch_copy: true,
            empty_spaces: Vec::new(),
            last_error: None,
        };
        for s in &mut copy.model.sections {
            s.patched = false;
        }
        log::debug!("opened patching copy with {} sections", copy.model.sections.len());
        copy
    }

    fn require_patching(&self) -> Result<()> {
        if self.state != PatchState::Patching {
            return Err(error::Error::FileNotBeingPatched);
        }
        Ok(())
    }

    /// `patch_get_scn_copy` (SPEC_FULL §4.D): marks section `i` as patched
    /// (the eager-clone stand-in for lazy copy-on-write, see module doc) and
    /// returns it mutably.
    pub fn patch_get_scn_copy(&mut self, i: usize) -> Result<&mut Section> {
        self.require_patching()?;
        let s = self.model.section_mut(i)?;
        scn::ensure_string_entries(s);
        s.mark_patched();
        Ok(s)
    }

    pub fn patch_get_scn_entry(&self, i: usize, j: usize) -> Result<&Entry> {
        let s = self.model.section(i)?;
        s.entries
            .get(j)
            .ok_or_else(|| error::missing_section(format!("no entry {j} in section {i}")))
    }

    /// `patch_get_scn_entrycopy` (SPEC_FULL §4.D): the entry-granular
    /// copy-on-write path — triggers the containing section's copy-on-write
    /// and returns the entry mutably.
    pub fn patch_get_scn_entrycopy(&mut self, i: usize, j: usize) -> Result<&mut Entry> {
        let s = self.patch_get_scn_copy(i)?;
        s.entries
            .get_mut(j)
            .ok_or_else(|| error::missing_section(format!("no entry {j} in section {i}")))
    }

    /// `patch_add_entry` (SPEC_FULL §4.D): appends `entry` to section `scn`'s
    /// entry array and grows the section's size by the entry's byte size.
    pub fn patch_add_entry(&mut self, scn: usize, entry: Entry) -> Result<usize> {
        let word = self.model.word();
        let s = self.patch_get_scn_copy(scn)?;
        let size = scn::entry_size(&entry, s, word);
        s.entries.push(entry);
        s.size += size;
        Ok(s.entries.len() - 1)
    }

    /// `patch_add_str_entry` (SPEC_FULL §4.D): idempotent string interning —
    /// returns the index of a pre-existing identical entry instead of
    /// duplicating it.
    pub fn patch_add_str_entry(&mut self, scn: usize, s: &str) -> Result<usize> {
        // Triggers the string-table copy-on-write rebuild first (raw bytes
        // -> Entry::Str records) so a string already present in a
        // never-before-patched table like `.dynstr` is found, not duplicated.
        let section = self.patch_get_scn_copy(scn)?;
        if let Some(idx) = scn::find_str_entry(section, s) {
            return Ok(idx);
        }
        self.patch_add_entry(scn, Entry::Str(s.to_string()))
    }

    /// `patch_add_label` (SPEC_FULL §4.D): dispatches to `.symtab` or
    /// `.dynsym` depending on the label's kind, and registers it in the
    /// model's label index (last-insertion-wins, SPEC_FULL §8).
    pub fn patch_add_label(&mut self, label: Label) -> Result<usize> {
        self.require_patching()?;
        let target_scn = if label.kind == LabelKind::ExternalFunction {
            self.model
                .important
                .dynsym
                .ok_or_else(|| error::Error::NoSymbolSection {
                    msg: "no .dynsym section to hold an external-function label".into(),
                })?
        } else {
            self.model
                .important
                .symtab
                .ok_or_else(|| error::Error::NoSymbolSection {
                    msg: "no .symtab section to hold a label".into(),
                })?
        };
        let sym = crate::elf::sym::SymEntry {
            st_name: 0,
            st_info: label_st_info(&label),
            st_other: 0,
            st_shndx: label.section as u16,
            st_value: label.address,
            st_size: 0,
        };
        self.model.insert_label(label);
        let entry_idx = self.patch_add_entry(target_scn, Entry::Sym(sym))?;
        self.model
            .xref
            .insert((target_scn, entry_idx), XrefEntry::new(sym.st_shndx as usize, 0, Updater::Sym));
        Ok(entry_idx)
    }

    /// `patch_add_extlib` (SPEC_FULL §1, §8 scenario 2): adds a library
    /// dependency by interning `name` into `.dynstr` (idempotent) and
    /// inserting a fresh `DT_NEEDED` tag immediately before `.dynamic`'s
    /// terminating `DT_NULL` entry, leaving every other entry untouched.
    pub fn patch_add_extlib(&mut self, name: &str) -> Result<usize> {
        self.require_patching()?;
        let dynstr = self.model.important.dynstr.ok_or_else(|| error::Error::NoExtlibs {
            msg: "no .dynstr section to hold a new library name".into(),
        })?;
        let dynamic = self.model.important.dynamic.ok_or_else(|| error::Error::NoExtlibs {
            msg: "no .dynamic section to hold a new DT_NEEDED entry".into(),
        })?;
        let name_idx = self.patch_add_str_entry(dynstr, name)?;

        let word = self.model.word();
        let section = self.patch_get_scn_copy(dynamic)?;
        let null_pos = section
            .entries
            .iter()
            .position(|e| matches!(e, Entry::Dyn(d) if d.tag == object::elf::DT_NULL as i64))
            .unwrap_or(section.entries.len());
        let entry = Entry::Dyn(crate::model::dynamic::DynTag {
            tag: object::elf::DT_NEEDED as i64,
            val: name_idx as u64,
        });
        let size = scn::entry_size(&entry, section, word);
        section.entries.insert(null_pos, entry);
        section.size += size;

        self.model.extern_libs.push(name.to_string());
        log::debug!("added DT_NEEDED {name}");
        Ok(null_pos)
    }

    /// `patch_rename_extlib` (SPEC_FULL §1, §8 scenario 3): retargets the
    /// `DT_NEEDED` entry currently naming `old` to a freshly interned `new`
    /// string. The old string's bytes are left in `.dynstr` untouched and no
    /// section is reordered — only the dynamic tag's string-offset pointer
    /// moves.
    pub fn patch_rename_extlib(&mut self, old: &str, new: &str) -> Result<()> {
        self.require_patching()?;
        let dynstr = self.model.important.dynstr.ok_or_else(|| error::Error::NoExtlibs {
            msg: "no .dynstr section to resolve a DT_NEEDED name".into(),
        })?;
        let dynamic = self.model.important.dynamic.ok_or_else(|| error::Error::NoExtlibs {
            msg: "no .dynamic section to hold a DT_NEEDED entry".into(),
        })?;

        let old_idx = {
            let section = self.patch_get_scn_copy(dynstr)?;
            scn::find_str_entry(section, old).ok_or_else(|| error::Error::ExtlibNotFound {
                msg: format!("{old} not found in .dynstr").into(),
            })?
        };
        let new_idx = self.patch_add_str_entry(dynstr, new)?;

        let section = self.patch_get_scn_copy(dynamic)?;
        let mut retargeted = false;
        for entry in &mut section.entries {
            if let Entry::Dyn(d) = entry {
                if d.tag == object::elf::DT_NEEDED as i64 && d.val == old_idx as u64 {
                    d.val = new_idx as u64;
                    retargeted = true;
                }
            }
        }
        if !retargeted {
            return Err(error::Error::ExtlibNotFound {
                msg: format!("no DT_NEEDED entry references {old}").into(),
            });
        }

        if let Some(lib) = self.model.extern_libs.iter_mut().find(|l| l.as_str() == old) {
            *lib = new.to_string();
        }
        log::debug!("renamed dependency {old} -> {new}");
        Ok(())
    }

    /// `patch_add_scn` (SPEC_FULL §4.D): appends a new section.
    pub fn patch_add_scn(&mut self, section: Section) -> Result<usize> {
        self.require_patching()?;
        self.model.sections.push(section);
        let idx = self.model.sections.len() - 1;
        self.model.old_to_new.push(Some(idx));
        log::debug!("added section {idx}");
        Ok(idx)
    }

    /// `patch_add_seg` (SPEC_FULL §4.D): appends a new segment.
    pub fn patch_add_seg(&mut self, segment: Segment) -> Result<usize> {
        self.require_patching()?;
        self.model.segments.push(segment);
        Ok(self.model.segments.len() - 1)
    }

    /// `patch_move_scn_to_interval` (SPEC_FULL §4.D): consumes an interval
    /// from the empty-space queue and assigns the section an address/offset
    /// pair satisfying the page-alignment congruence of SPEC_FULL §3. `.got`
    /// and `.got.plt` are special-cased to move together as one unit.
    pub fn patch_move_scn_to_interval(&mut self, i: usize, interval: (u64, u64)) -> Result<()> {
        self.require_patching()?;
        let align = crate::reorder::NEW_SEGMENT_ALIGNMENT;
        let (start, len) = interval;
        let size = self.model.section(i)?.size;
        if size > len {
            return Err(error::Error::SectionNotRelocated {
                section: self.model.section(i)?.name.clone().into(),
            });
        }
        let addr = crate::reorder::interval::round_up(start, self.model.section(i)?.align.max(1));
        let offset = crate::reorder::congruent_offset(addr, align, start);
        {
            let s = self.patch_get_scn_copy(i)?;
            s.addr = addr;
            s.offset = offset;
        }
        crate::reorder::update_section_references(self, i);
        if self.model.section(i)?.name == ".got" {
            if let Some(gotplt) = self.model.important.gotplt {
                if gotplt != i {
                    let gotplt_size = self.model.section(gotplt)?.size;
                    let gotplt_addr = addr + size;
                    let gotplt_offset = offset + size;
                    let s = self.patch_get_scn_copy(gotplt)?;
                    s.addr = gotplt_addr;
                    s.offset = gotplt_offset;
                    let _ = gotplt_size;
                    crate::reorder::update_section_references(self, gotplt);
                }
            }
        }
        Ok(())
    }

    /// `patch_finalise` (SPEC_FULL §4.D/§4.G): runs the section reorder /
    /// segment packer over every altered section.
    pub fn patch_finalise(&mut self, empty_spaces: Vec<(u64, u64)>) -> Result<()> {
        self.require_patching()?;
        crate::reorder::finalise(self, empty_spaces)?;
        self.state = PatchState::MadrasPatched;
        Ok(())
    }

    /// `patch_write_file` (SPEC_FULL §4.D/§4.H): rebuilds the ELF byte image.
    pub fn patch_write_file(&self) -> Result<Vec<u8>> {
        crate::writer::write(self)
    }
}

fn label_st_info(label: &Label) -> u8 {
    let ty = match label.kind {
        LabelKind::Function | LabelKind::ExternalFunction => object::elf::STT_FUNC,
        LabelKind::Variable => object::elf::STT_OBJECT,
        LabelKind::Dummy => object::elf::STT_NUM,
        _ => object::elf::STT_NOTYPE,
    };
    let bind = if label.kind == LabelKind::NoFunction {
        object::elf::STB_LOCAL
    } else {
        object::elf::STB_GLOBAL
    };
    (bind << 4) | ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binfile::BinFile;

    fn minimal_elf64() -> Vec<u8> {
        let mut v = vec![0u8; 64];
        v[0..4].copy_from_slice(object::elf::ELFMAG);
        v[object::elf::EI_CLASS] = object::elf::ELFCLASS64;
        v[object::elf::EI_DATA] = object::elf::ELFDATA2LSB;
        v[object::elf::EI_VERSION] = object::elf::EV_CURRENT;
        v[16..18].copy_from_slice(&object::elf::ET_EXEC.to_le_bytes());
        v[18..20].copy_from_slice(&object::elf::EM_X86_64.to_le_bytes());
        v[52..54].copy_from_slice(&64u16.to_le_bytes());
        v
    }

    #[test]
    fn patching_requires_a_copy() {
        let bf = BinFile::open(&minimal_elf64()).unwrap();
        let mut bf = bf;
        assert!(bf.patch_add_seg(Segment {
            p_type: object::elf::PT_LOAD,
            attrs: ScnAttrs::empty(),
            offset: 0,
            vaddr: 0,
            paddr: 0,
            filesz: 0,
            memsz: 0,
            align: 0x1000,
            sections: Vec::new(),
        })
        .is_err());
        let mut copy = BinFile::patch_init_copy(&bf);
        assert!(copy
            .patch_add_seg(Segment {
                p_type: object::elf::PT_LOAD,
                attrs: ScnAttrs::empty(),
                offset: 0,
                vaddr: 0,
                paddr: 0,
                filesz: 0,
                memsz: 0,
                align: 0x1000,
                sections: Vec::new(),
            })
            .is_ok());
        bf.state = PatchState::None;
    }
}
