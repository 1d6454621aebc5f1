//! ELF binary rewriter core: parses relocatable objects, executables,
//! shared libraries, and archives into an editable in-memory model, applies
//! semantic patches (inserting code/data, grafting whole object files,
//! adding labels/relocations/library dependencies, relocating grown
//! sections), and re-emits a valid ELF file whose load image stays
//! consistent with the original program's addressing assumptions.
//!
//! The crate is organised bottom-up, mirroring the teacher crate's
//! `arch`/`dynamic`/`relocation`/`segment` layering:
//!
//! - [`arch`] — the architecture registry (§4.A).
//! - [`elf`] — width-polymorphic ELF primitive accessors (§4.B).
//! - [`model`] — the parsed-ELF data model and cross-reference table (§4.C).
//! - [`binfile`] — the patching-session API layered over the model (§4.D).
//! - [`relocate`] — the per-architecture relocation applier (§4.E).
//! - [`graft`] — the object-file grafter (§4.F).
//! - [`reorder`] — the section reorder / segment packer (§4.G).
//! - [`writer`] — ELF byte-image emission (§4.H).
//! - [`archive`] — `ar`-format archive member splitting.
//! - [`insn`] — the assembler/disassembler trait seam.
//!
//! [`error::Error`]/[`error::Result`] is the single error channel threaded
//! through every one of these.

pub mod arch;
pub mod archive;
pub mod binfile;
pub mod elf;
pub mod error;
pub mod graft;
pub mod insn;
pub mod model;
pub mod relocate;
pub mod reorder;
pub mod writer;

pub use binfile::BinFile;
pub use error::{Error, Result};
