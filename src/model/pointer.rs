//! The `Pointer` entity (SPEC_FULL §3): an address that knows what it
//! targets, so re-reading the target after a move recomputes the address.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Absolute(u64),
    Relative(i64),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Insn { section: usize, entry: usize },
    Data { section: usize, entry: usize },
    Bscn { section: usize },
    Undef,
}

#[derive(Debug, Clone, Copy)]
pub struct Pointer {
    pub addr: Address,
    pub offset: i64,
    pub target: Target,
}

impl Pointer {
    pub fn undefined() -> Pointer {
        Pointer {
            addr: Address::None,
            offset: 0,
            target: Target::Undef,
        }
    }

    /// Recomputes `self.addr` from `target_addr`, the current address of
    /// this pointer's target, honouring the offset-in-target invariant of
    /// SPEC_FULL §3.
    pub fn refresh(&mut self, target_addr: u64) {
        self.addr = Address::Absolute((target_addr as i64 + self.offset) as u64);
    }
}
