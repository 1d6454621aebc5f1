//! Section-entry sizing and string-table helpers shared by the patching API.

use crate::arch::Word;
use crate::model::section::{Entry, ScnKind, Section};

/// The number of bytes one entry occupies once written back to the file.
/// Prefers the section's own `sh_entsize` (authoritative for homogeneous
/// tables: `.symtab`, `.rela.*`, `.dynamic`), falling back to a per-variant
/// default for heterogeneous sections.
pub fn entry_size(entry: &Entry, section: &Section, word: Word) -> u64 {
    if section.entsize != 0 {
        return section.entsize;
    }
    match entry {
        Entry::Nil => 0,
        Entry::Raw(bytes) => bytes.len() as u64,
        Entry::Val(_) => word.bytes() as u64,
        Entry::Str(s) => s.len() as u64 + 1,
        Entry::Sym(_) => match word {
            Word::W32 => 16,
            Word::W64 => 24,
        },
        Entry::Rel(r) => match (word, r.r_addend.is_some()) {
            (Word::W32, false) => 8,
            (Word::W32, true) => 12,
            (Word::W64, false) => 16,
            (Word::W64, true) => 24,
        },
        Entry::Dyn(_) => match word {
            Word::W32 => 8,
            Word::W64 => 16,
        },
    }
}

/// Splits a string-kind section's raw byte buffer into `Entry::Str` records
/// (one per NUL-delimited run, including the mandatory leading empty string),
/// the copy-on-write rebuild SPEC_FULL §3 requires before the first mutation
/// of a section whose entry array and raw buffer disagree on which side is
/// authoritative. A no-op once `entries` is already populated, or for any
/// non-`String` section (those own their entries from parse time).
pub fn ensure_string_entries(section: &mut Section) {
    if section.kind != ScnKind::String || !section.entries.is_empty() {
        return;
    }
    let Some(raw) = section.raw.take() else { return };
    let mut entries = Vec::new();
    let mut start = 0usize;
    while start < raw.len() {
        let end = raw[start..].iter().position(|&b| b == 0).map(|p| start + p).unwrap_or(raw.len());
        entries.push(Entry::Str(String::from_utf8_lossy(&raw[start..end]).into_owned()));
        start = end + 1;
    }
    section.entries = entries;
}

/// Finds a `Str` entry in `section` equal to `s`, the `patch_add_str_entry`
/// idempotence rule of SPEC_FULL §4.D: returns the existing entry's index
/// instead of duplicating a byte-identical string.
pub fn find_str_entry(section: &Section, s: &str) -> Option<usize> {
    section.entries.iter().position(|e| matches!(e, Entry::Str(existing) if existing == s))
}

/// Offset, in bytes, of entry `idx` within `section`'s eventual byte layout —
/// used by the writer (§4.H) to compute `r_offset`/name offsets without
/// re-walking the whole entry array.
pub fn entry_byte_offset(section: &Section, idx: usize, word: Word) -> u64 {
    section.entries[..idx]
        .iter()
        .map(|e| entry_size(e, section, word))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::section::{ScnAttrs, ScnKind};

    fn empty_section() -> Section {
        Section {
            name: ".strtab".into(),
            sh_name: 0,
            kind: ScnKind::String,
            sh_type: object::elf::SHT_STRTAB,
            attrs: ScnAttrs::empty(),
            addr: 0,
            offset: 0,
            size: 0,
            align: 1,
            entsize: 0,
            link: 0,
            info: 0,
            entries: Vec::new(),
            raw: None,
            patched: false,
        }
    }

    #[test]
    fn str_entry_size_includes_nul_terminator() {
        let s = empty_section();
        let e = Entry::Str("foo".into());
        assert_eq!(entry_size(&e, &s, Word::W64), 4);
    }

    #[test]
    fn ensure_string_entries_splits_raw_strtab() {
        let mut s = empty_section();
        s.raw = Some(b"\0libc.so.6\0libm.so.6\0".to_vec());
        ensure_string_entries(&mut s);
        assert_eq!(s.raw, None);
        let names: Vec<&str> = s
            .entries
            .iter()
            .map(|e| match e {
                Entry::Str(v) => v.as_str(),
                _ => panic!("expected Str entry"),
            })
            .collect();
        assert_eq!(names, vec!["", "libc.so.6", "libm.so.6"]);
    }

    #[test]
    fn ensure_string_entries_is_a_no_op_once_populated() {
        let mut s = empty_section();
        s.entries.push(Entry::Str("already-split".into()));
        s.raw = Some(b"ignored\0".to_vec());
        ensure_string_entries(&mut s);
        assert_eq!(s.entries.len(), 1);
        assert!(s.raw.is_some());
    }

    #[test]
    fn find_str_entry_is_idempotent() {
        let mut s = empty_section();
        s.entries.push(Entry::Str("libfoo.so".into()));
        assert_eq!(find_str_entry(&s, "libfoo.so"), Some(0));
        assert_eq!(find_str_entry(&s, "libbar.so"), None);
    }
}
