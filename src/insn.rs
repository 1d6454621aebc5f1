//! The assembler/disassembler seam (SPEC_FULL §6): building a PLT stub and
//! patching an instruction's operand both require encoding/decoding real
//! machine code, which lives outside this crate. [`InsnCodec`] is the trait
//! boundary; [`NoCodec`] is the default used when no concrete codec is
//! wired in (every relocation this crate resolves on its own only needs the
//! architecture descriptor's `plt_stub`/`apply_reloc` functions, not a full
//! codec).
//!
//! Grounded on `model::DebugInfo`'s no-op-default shape, reused here for the
//! same kind of external collaborator (DESIGN.md).

/// One decoded instruction: its address, encoded length, and the absolute
/// address it references, if any (a call/jump target or RIP-relative
/// operand).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    pub addr: u64,
    pub len: usize,
    pub operand_addr: Option<u64>,
}

/// The assembler/disassembler interface (SPEC_FULL §6): producing the
/// instructions of a PLT stub, re-encoding one instruction whose operand
/// changed, and inspecting an instruction's referenced address. No concrete
/// disassembler ships in this crate; implementations live in the embedding
/// application.
pub trait InsnCodec {
    /// Instructions forming a PLT stub that jumps through `got_slot_addr`,
    /// placed starting at `stub_addr`.
    fn plt_stub(&self, stub_addr: u64, got_slot_addr: u64) -> Vec<Insn>;

    /// Re-encodes `insn` after its operand address has been updated to
    /// `new_operand_addr`, returning the new instruction bytes. Fails if the
    /// new address cannot be expressed in the instruction's existing
    /// encoding (e.g. a `rel8` branch whose target moved out of range).
    fn reencode(&self, insn: Insn, new_operand_addr: u64) -> Option<Vec<u8>>;

    /// Decodes the single instruction at `addr` within `code`.
    fn decode(&self, code: &[u8], addr: u64) -> Option<Insn>;
}

/// No-op default: every instruction decodes to a zero-length, addressless
/// stub. Sufficient for this crate's own relocation resolution, which never
/// re-encodes instruction operands directly — only the architecture
/// descriptor's byte-level `apply_reloc`/`plt_stub` functions are used for
/// that (SPEC_FULL §4.A/§4.E). A real codec plugs in here for the startup
/// helper rewrite use case named in §6.
pub struct NoCodec;

impl InsnCodec for NoCodec {
    fn plt_stub(&self, _stub_addr: u64, _got_slot_addr: u64) -> Vec<Insn> {
        Vec::new()
    }
    fn reencode(&self, _insn: Insn, _new_operand_addr: u64) -> Option<Vec<u8>> {
        None
    }
    fn decode(&self, _code: &[u8], _addr: u64) -> Option<Insn> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_codec_is_inert() {
        let codec = NoCodec;
        assert!(codec.plt_stub(0, 0).is_empty());
        assert!(codec.decode(&[], 0).is_none());
    }
}
