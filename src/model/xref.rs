//! The cross-reference table (SPEC_FULL §3, §9): every entity that stores an
//! address is indexed here as `(section-id, entry-id) -> (target-section,
//! offset, updater)`, so moving a section's target rewrites every dependent
//! address in a single pass instead of the caller hunting down each one.

use hashbrown::HashMap;

use super::pointer::{Address, Pointer, Target};

pub type SectionId = usize;
pub type EntryId = usize;

/// How to recompute the stored address for one cross-reference table entry
/// once its target has moved. Each variant mirrors one of the `Entry`
/// variants in `model::section` that can carry an address.
#[derive(Debug, Clone, Copy)]
pub enum Updater {
    Sym,
    Rel,
    Rela,
    Dyn { tag: i64 },
    Addr,
}

/// One cross-reference table entry. `pointer` is the `Pointer` entity of
/// SPEC_FULL §3 ("Updating a pointer rereads the target's current address"):
/// `target_section`/`offset` stay as the lookup key `referencing` filters by,
/// while recomputing the stored address after a move goes through
/// `pointer.refresh` rather than ad hoc arithmetic at each call site.
#[derive(Debug, Clone, Copy)]
pub struct XrefEntry {
    pub target_section: SectionId,
    pub offset: u64,
    pub updater: Updater,
    pub pointer: Pointer,
}

impl XrefEntry {
    pub fn new(target_section: SectionId, offset: u64, updater: Updater) -> Self {
        XrefEntry {
            target_section,
            offset,
            updater,
            pointer: Pointer {
                addr: Address::None,
                offset: offset as i64,
                target: Target::Bscn { section: target_section },
            },
        }
    }

    /// Rereads `self.pointer`'s target address (now `target_addr`) and
    /// returns the entity's recomputed stored address.
    pub fn refresh_address(&mut self, target_addr: u64) -> u64 {
        self.pointer.refresh(target_addr);
        match self.pointer.addr {
            Address::Absolute(a) => a,
            _ => target_addr + self.offset,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct XrefTable {
    entries: HashMap<(SectionId, EntryId), XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        XrefTable {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: (SectionId, EntryId), entry: XrefEntry) {
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: (SectionId, EntryId)) -> Option<&XrefEntry> {
        self.entries.get(&key)
    }

    pub fn remove(&mut self, key: (SectionId, EntryId)) {
        self.entries.remove(&key);
    }

    /// All entries whose target is `section`, used when that section's
    /// address changes during reorder.
    pub fn referencing(&self, section: SectionId) -> impl Iterator<Item = (&(SectionId, EntryId), &XrefEntry)> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.target_section == section)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entries_by_target_section() {
        let mut t = XrefTable::new();
        t.insert((0, 0), XrefEntry::new(3, 8, Updater::Sym));
        t.insert((0, 1), XrefEntry::new(4, 0, Updater::Addr));
        let hits: Vec<_> = t.referencing(3).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, &(0, 0));
    }

    #[test]
    fn refresh_address_rereads_pointer_target() {
        let mut entry = XrefEntry::new(3, 8, Updater::Sym);
        assert_eq!(entry.refresh_address(0x1000), 0x1008);
        assert_eq!(entry.refresh_address(0x2000), 0x2008);
    }
}
