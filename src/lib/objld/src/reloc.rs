//! Component E — relocation engine.

use tracing::trace;

use crate::{
    error::{ObjldError, ObjldErrorKind},
    section::LoadedSections,
    symbol::Elf32Sym,
};

pub const R_386_32: u32 = 1;
pub const R_386_PC32: u32 = 2;

const REL_ENTSIZE: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Elf32Rel {
    pub r_offset: u32,
    pub r_info: u32,
}

impl Elf32Rel {
    fn parse(bytes: &[u8]) -> Self {
        Self {
            r_offset: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            r_info: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }

    pub fn sym(&self) -> usize {
        (self.r_info >> 8) as usize
    }

    pub fn r_type(&self) -> u32 {
        self.r_info & 0xff
    }
}

fn section_bytes(sections: &LoadedSections, shndx: usize) -> &[u8] {
    let info = sections.addrs[shndx];
    let base = sections.image.as_ptr() as u32;
    let offset = (info.addr - base) as usize;
    &sections.image[offset..offset + info.size as usize]
}

/// Apply every `.rel.data`/`.rel.text` relocation section against the
/// already-resolved symbol table. Entries are processed in ascending
/// section-header order, and within a section, in array order.
pub fn apply_relocations(
    sections: &LoadedSections,
    syms: &[Elf32Sym],
) -> Result<(), ObjldError> {
    // `info_sec.addr` is a truncated u32 pointer (section.rs); recover the
    // offset the same way `section_bytes`/`parse_symtab` do, or the
    // subtraction below underflows on a 64-bit host.
    let base = sections.image.as_ptr() as u32 as usize;

    for (shndx, sh) in sections.headers.iter().enumerate() {
        if sh.sh_type != elf::abi::SHT_REL {
            continue;
        }
        let name = &sections.names[shndx];
        if name != ".rel.data" && name != ".rel.text" {
            continue;
        }

        let info_shndx = sh.sh_info as usize;
        let info_sec = *sections
            .addrs
            .get(info_shndx)
            .ok_or_else(|| ObjldErrorKind::MissingSection {
                name: format!("relocation target section #{info_shndx}"),
            })?;

        let rel_bytes = section_bytes(sections, shndx);
        let count = rel_bytes.len() / REL_ENTSIZE;
        for i in 0..count {
            let rel = Elf32Rel::parse(&rel_bytes[i * REL_ENTSIZE..(i + 1) * REL_ENTSIZE]);
            let sym = syms.get(rel.sym().wrapping_sub(1)).ok_or_else(|| {
                ObjldErrorKind::UnsupportedRelocation {
                    section: name.clone(),
                    r_type: rel.r_type(),
                }
            })?;

            let where_addr = info_sec.addr as usize + rel.r_offset as usize;
            let word_offset = where_addr - base;
            let word = sections_word_mut(sections, word_offset);

            match rel.r_type() {
                R_386_32 => {
                    trace!(where_addr, sym = sym.st_value, "R_386_32");
                    *word = word.wrapping_add(sym.st_value);
                }
                R_386_PC32 => {
                    trace!(where_addr, sym = sym.st_value, "R_386_PC32");
                    *word = word.wrapping_add(sym.st_value.wrapping_sub(where_addr as u32));
                }
                other => {
                    return Err(ObjldErrorKind::UnsupportedRelocation {
                        section: name.clone(),
                        r_type: other,
                    }
                    .into())
                }
            }
        }
    }
    Ok(())
}

/// Borrow the 4-byte little-endian word at `offset` in the image mutably.
///
/// # Safety note
/// `LoadedSections::image` is a boxed slice never reallocated after
/// `load_sections`, so this raw pointer arithmetic does not outlive it.
fn sections_word_mut(sections: &LoadedSections, offset: usize) -> &mut u32 {
    unsafe {
        let ptr = sections.image.as_ptr().add(offset) as *mut u32;
        &mut *ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_bitfields_split_correctly() {
        let rel = Elf32Rel {
            r_offset: 0,
            r_info: (7 << 8) | R_386_PC32,
        };
        assert_eq!(rel.sym(), 7);
        assert_eq!(rel.r_type(), R_386_PC32);
    }
}
