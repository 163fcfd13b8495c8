//! Error taxonomy for the loader.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error returned by any `objld` entry point.
#[derive(Debug, Error, Diagnostic)]
#[error("{kind}")]
pub struct ObjldError {
    #[source]
    pub kind: ObjldErrorKind,
}

impl ObjldError {
    pub fn kind(&self) -> &ObjldErrorKind {
        &self.kind
    }
}

impl<K: Into<ObjldErrorKind>> From<K> for ObjldError {
    fn from(kind: K) -> Self {
        Self { kind: kind.into() }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ObjldErrorKind {
    #[error("cannot find library '{name}' on search path")]
    CannotFindLibrary { name: String },

    #[error("library name '{name}' exceeds the {max} byte limit")]
    NameTooLong { name: String, max: usize },

    #[error("invalid handle")]
    InvalidHandle,

    #[error("bad symbol name")]
    BadSymbolName,

    #[error("symbol '{name}' not found")]
    SymbolNotFound { name: String },

    #[error("symbol '{name}' is not global")]
    SymbolNotGlobal { name: String },

    #[error("handle pool exhausted (max {max} libraries)")]
    TooManyLibraries { max: usize },

    #[error("not a 32-bit relocatable ELF object: {reason}")]
    InvalidElf { reason: String },

    #[error("failed to parse ELF data")]
    ElfParse(#[from] elf::ParseError),

    #[error("symbol table entry {index} has unknown type code {code}")]
    UnknownSymbolType { index: usize, code: u8 },

    #[error("unsupported relocation type {r_type} in section '{section}'")]
    UnsupportedRelocation { section: String, r_type: u32 },

    #[error("required section '{name}' is missing")]
    MissingSection { name: String },

    #[error("failed to allocate module image of {size} bytes")]
    AllocationFailed { size: usize },

    #[error("I/O error while reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
