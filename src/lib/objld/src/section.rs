//! Component C — section loader.
//!
//! Allocates one contiguous image for every loadable section and records the
//! runtime base address each section header ends up at.

use elf::{endian::AnyEndian, section::SectionHeader, ElfBytes};
use humansize::{format_size, BINARY};
use tracing::debug;

use crate::error::{ObjldError, ObjldErrorKind};

const WHITELIST_DATA: &str = ".data";
const WHITELIST_TEXT: &str = ".text";
const WHITELIST_REL_DATA: &str = ".rel.data";
const WHITELIST_REL_TEXT: &str = ".rel.text";

fn is_loadable(name: &str, sh: &SectionHeader) -> bool {
    match sh.sh_type {
        elf::abi::SHT_PROGBITS => name == WHITELIST_DATA || name == WHITELIST_TEXT,
        elf::abi::SHT_NOBITS => true,
        elf::abi::SHT_SYMTAB => true,
        elf::abi::SHT_REL => name == WHITELIST_REL_DATA || name == WHITELIST_REL_TEXT,
        _ => false,
    }
}

/// Per-section runtime placement, indexed by the section's own header index.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionAddr {
    pub addr: u32,
    pub size: u32,
}

pub struct LoadedSections {
    /// The single allocation backing every whitelisted PROGBITS/NOBITS/SYMTAB/REL
    /// section. Never reallocated once built, so addresses taken from it are
    /// stable for the handle's lifetime.
    pub image: Box<[u8]>,
    /// Indexed by section header index; zero entries mean "not loaded."
    pub addrs: Vec<SectionAddr>,
    /// Header index of the first SYMTAB section encountered, if any.
    pub symtab_shndx: Option<usize>,
    /// Separately allocated string table linked from the symtab's `sh_link`.
    pub strtab: Option<Box<[u8]>>,
    /// Section header names, indexed by header index (from the section
    /// header string table); kept around so the relocation engine can
    /// re-filter by name without reparsing the ELF headers.
    pub names: Vec<String>,
    /// Raw section headers, indexed by header index, for the relocation
    /// engine's `sh_info`/`sh_entsize` lookups.
    pub headers: Vec<SectionHeader>,
}

pub fn load_sections(
    raw: &[u8],
    elf: &ElfBytes<'_, AnyEndian>,
) -> Result<LoadedSections, ObjldError> {
    let shdrs = elf
        .section_headers()
        .ok_or_else(|| ObjldErrorKind::MissingSection {
            name: "section header table".into(),
        })?;
    let (_, shstrtab) =
        elf.section_headers_with_strtab()
            .map_err(ObjldError::from)?;
    let shstrtab = shstrtab.ok_or_else(|| ObjldErrorKind::MissingSection {
        name: "section header string table".into(),
    })?;

    // First pass: sum bytes to allocate, in ascending header index order.
    let mut total: usize = 0;
    let mut names = Vec::with_capacity(shdrs.len());
    let mut headers = Vec::with_capacity(shdrs.len());
    for sh in shdrs.iter() {
        let name = shstrtab.get(sh.sh_name as usize).unwrap_or("").to_string();
        if is_loadable(&name, &sh) {
            total += sh.sh_size as usize;
        }
        names.push(name);
        headers.push(sh);
    }

    debug!(total = %format_size(total, BINARY), "allocating module image");
    let mut image = vec![0u8; total].into_boxed_slice();
    let mut addrs = vec![SectionAddr::default(); shdrs.len()];
    let mut symtab_shndx = None;
    let mut strtab: Option<Box<[u8]>> = None;
    let mut symtab_link: Option<usize> = None;

    // Second pass: copy in ascending header index order, advancing the cursor.
    let mut q: usize = 0;
    for (shndx, sh) in shdrs.iter().enumerate() {
        let name = &names[shndx];
        if !is_loadable(name, &sh) {
            continue;
        }
        let size = sh.sh_size as usize;
        if sh.sh_type != elf::abi::SHT_NOBITS {
            let start = sh.sh_offset as usize;
            let end = start
                .checked_add(size)
                .ok_or_else(|| ObjldErrorKind::InvalidElf {
                    reason: format!("section '{name}' size overflows file"),
                })?;
            let src = raw.get(start..end).ok_or_else(|| ObjldErrorKind::InvalidElf {
                reason: format!("section '{name}' extends past end of file"),
            })?;
            image[q..q + size].copy_from_slice(src);
        }
        // runtime base of this section is where we just placed it in `image`.
        let base_ptr = image.as_ptr() as usize + q;
        addrs[shndx] = SectionAddr {
            addr: base_ptr as u32,
            size: size as u32,
        };

        if sh.sh_type == elf::abi::SHT_SYMTAB {
            if symtab_shndx.is_none() {
                symtab_shndx = Some(shndx);
                symtab_link = Some(sh.sh_link as usize);
            }
        }
        q += size;
    }

    if let (Some(_), Some(link)) = (symtab_shndx, symtab_link) {
        let strtab_sh = shdrs
            .get(link)
            .map_err(|_| ObjldErrorKind::MissingSection {
                name: "linked string table".into(),
            })?;
        let start = strtab_sh.sh_offset as usize;
        let end = start + strtab_sh.sh_size as usize;
        let bytes = raw
            .get(start..end)
            .ok_or_else(|| ObjldErrorKind::InvalidElf {
                reason: "string table extends past end of file".into(),
            })?
            .to_vec()
            .into_boxed_slice();
        strtab = Some(bytes);
    }

    Ok(LoadedSections {
        image,
        addrs,
        symtab_shndx,
        strtab,
        names,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_matches_spec() {
        let text = SectionHeader {
            sh_name: 0,
            sh_type: elf::abi::SHT_PROGBITS,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: 0,
            sh_size: 0,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 0,
            sh_entsize: 0,
        };
        assert!(is_loadable(".text", &text));
        assert!(is_loadable(".data", &text));
        assert!(!is_loadable(".rodata", &text));
    }
}
