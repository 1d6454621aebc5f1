//! Error channel. One variant per canonical error kind; every variant carries
//! enough context to print a single diagnostic line naming the offending
//! file, entity, and code.

use std::borrow::Cow;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing, modelling, patching, or writing an ELF file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no binary file open: {msg}")]
    MissingBinfile { msg: Cow<'static, str> },
    #[error("missing section: {msg}")]
    MissingSection { msg: Cow<'static, str> },
    #[error("missing segment: {msg}")]
    MissingSegment { msg: Cow<'static, str> },
    #[error("missing label: {msg}")]
    MissingLabel { msg: Cow<'static, str> },
    #[error("missing parameter: {msg}")]
    MissingParameter { msg: Cow<'static, str> },

    #[error("unable to open file {path}: {source}")]
    UnableToOpenFile {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to create file {path}: {source}")]
    UnableToCreateFile {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write file {path}: {source}")]
    UnableToWriteFile {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("ELF header not found: {msg}")]
    HeaderNotFound { msg: Cow<'static, str> },
    #[error("file format not recognized: {msg}")]
    FormatNotRecognized { msg: Cow<'static, str> },
    #[error("archive parsing error: {msg}")]
    ArchiveParsingError { msg: Cow<'static, str> },
    #[error("unknown file type: {msg}")]
    UnknownFileType { msg: Cow<'static, str> },
    #[error("unexpected file format: {msg}")]
    UnexpectedFileFormat { msg: Cow<'static, str> },

    #[error("no external libraries recorded: {msg}")]
    NoExtlibs { msg: Cow<'static, str> },
    #[error("no external-function section: {msg}")]
    NoExtfctsSection { msg: Cow<'static, str> },
    #[error("no symbol table: {msg}")]
    NoSymbolSection { msg: Cow<'static, str> },
    #[error("no string table: {msg}")]
    NoStringSection { msg: Cow<'static, str> },
    #[error("external library not found: {msg}")]
    ExtlibNotFound { msg: Cow<'static, str> },
    #[error("symbol not found: {msg}")]
    SymbolNotFound { msg: Cow<'static, str> },

    #[error("relocation type {rel_type} ({rel_type_name}) not supported on this architecture")]
    RelocationNotSupported {
        rel_type: u32,
        rel_type_name: Cow<'static, str>,
    },
    #[error("invalid relocation at offset {offset:#x}: {msg}")]
    RelocationInvalid { offset: u64, msg: Cow<'static, str> },
    #[error("relocation type {rel_type} not recognised")]
    RelocationNotRecognised { rel_type: u32 },
    #[error("target address not found for {msg}")]
    TargetAddressNotFound { msg: Cow<'static, str> },
    #[error("section {section} was not relocated")]
    SectionNotRelocated { section: Cow<'static, str> },

    #[error("unknown architecture: {msg}")]
    ArchUnknown { msg: Cow<'static, str> },
    #[error("invalid processor name: {msg}")]
    ProcNameInvalid { msg: Cow<'static, str> },
    #[error("invalid micro-architecture name: {msg}")]
    UarchNameInvalid { msg: Cow<'static, str> },

    #[error("file is not currently being patched")]
    FileNotBeingPatched,
    #[error("file has already been parsed")]
    FileAlreadyParsed,

    #[error("patching architecture {arch} not supported")]
    PatchArchNotSupported { arch: Cow<'static, str> },
    #[error("external-function stub could not be generated: {msg}")]
    PatchExtfctStubNotGenerated { msg: Cow<'static, str> },

    #[error("ELF read error: {0}")]
    ElfRead(#[source] object::read::Error),
    #[error("ELF write error: {0}")]
    ElfWrite(#[source] object::write::Error),

    #[error("{msg}")]
    Custom { msg: Cow<'static, str> },
}

impl From<object::read::Error> for Error {
    fn from(e: object::read::Error) -> Self {
        Error::ElfRead(e)
    }
}

impl From<object::write::Error> for Error {
    fn from(e: object::write::Error) -> Self {
        Error::ElfWrite(e)
    }
}

#[cold]
#[inline(never)]
pub fn missing_section(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::MissingSection { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn missing_segment(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::MissingSegment { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn missing_label(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::MissingLabel { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn relocation_invalid(offset: u64, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::RelocationInvalid {
        offset,
        msg: msg.into(),
    }
}

#[cold]
#[inline(never)]
pub fn custom_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Custom { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn arch_unknown(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ArchUnknown { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn symbol_not_found(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::SymbolNotFound { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn unable_to_open_file(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Error {
    Error::UnableToOpenFile {
        path: path.into(),
        source,
    }
}
