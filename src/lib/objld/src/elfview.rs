//! Component A/B — object-file reader and ELF32 validator.

use std::path::{Path, PathBuf};

use elf::{endian::AnyEndian, ElfBytes};
use tracing::{debug, warn};

use crate::error::{ObjldError, ObjldErrorKind};

pub const MAX_NAME_LEN: usize = 256;

/// Resolve `name` against `search_paths`, following the original policy: an
/// absolute name is tried verbatim, otherwise each path prefix is tried in
/// order and the first regular, readable file wins.
pub fn resolve(name: &str, search_paths: &[PathBuf]) -> Result<PathBuf, ObjldError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ObjldErrorKind::NameTooLong {
            name: name.to_string(),
            max: MAX_NAME_LEN,
        }
        .into());
    }

    if let Some(stripped) = name.strip_prefix('/') {
        let p = Path::new("/").join(stripped);
        return if p.is_file() {
            Ok(p)
        } else {
            Err(ObjldErrorKind::CannotFindLibrary {
                name: name.to_string(),
            }
            .into())
        };
    }

    for prefix in search_paths {
        let candidate = prefix.join(name);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "resolved library");
            return Ok(candidate);
        }
    }

    Err(ObjldErrorKind::CannotFindLibrary {
        name: name.to_string(),
    }
    .into())
}

/// A parsed, validated ET_REL object. Owns the raw file bytes; every
/// `elf` crate view borrows from them.
pub struct ObjectFile {
    pub(crate) bytes: Vec<u8>,
}

impl ObjectFile {
    pub fn open(path: &Path) -> Result<Self, ObjldError> {
        let bytes = std::fs::read(path).map_err(|source| ObjldErrorKind::Io {
            path: path.display().to_string(),
            source,
        })?;
        let obj = Self { bytes };
        obj.validate()?;
        Ok(obj)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ObjldError> {
        let obj = Self { bytes };
        obj.validate()?;
        Ok(obj)
    }

    /// Component B: magic + `e_type == ET_REL`. Class/endian/version/machine
    /// are parsed but not enforced, matching the documented limitation.
    fn validate(&self) -> Result<(), ObjldError> {
        if self.bytes.len() < elf::abi::EI_NIDENT || &self.bytes[0..4] != elf::abi::ELFMAG {
            return Err(ObjldErrorKind::InvalidElf {
                reason: "bad magic".to_string(),
            }
            .into());
        }

        let elf = self.parse()?;
        if elf.ehdr.e_type != elf::abi::ET_REL {
            return Err(ObjldErrorKind::InvalidElf {
                reason: format!("e_type {} is not ET_REL", elf.ehdr.e_type),
            }
            .into());
        }
        if elf.ehdr.e_machine != elf::abi::EM_386 {
            warn!(
                e_machine = elf.ehdr.e_machine,
                "object's e_machine is not EM_386; relocation semantics assume x86"
            );
        }
        Ok(())
    }

    pub fn parse(&self) -> Result<ElfBytes<'_, AnyEndian>, ObjldError> {
        Ok(ElfBytes::minimal_parse(&self.bytes)?)
    }
}
