//! Component D — symbol resolver.
//!
//! Parses `Elf32_Sym` entries directly out of the module image's symtab
//! bytes (16 bytes each: name, value, size, info, other, shndx) rather than
//! going through a higher-level symbol-table abstraction, since the section
//! selected is "whichever SHT_SYMTAB came first," not the conventionally
//! named `.symtab`.

use tracing::trace;

use crate::{
    error::{ObjldError, ObjldErrorKind},
    registry::Registry,
    section::LoadedSections,
};

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STT_SECTION: u8 = 3;
pub const STT_FILE: u8 = 4;

const SYM_ENTSIZE: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct Elf32Sym {
    pub st_name: u32,
    pub st_value: u32,
    pub st_size: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
}

impl Elf32Sym {
    fn parse(bytes: &[u8]) -> Self {
        Self {
            st_name: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            st_value: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            st_size: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            st_info: bytes[12],
            st_other: bytes[13],
            st_shndx: u16::from_le_bytes(bytes[14..16].try_into().unwrap()),
        }
    }

    pub fn bind(&self) -> u8 {
        self.st_info >> 4
    }

    pub fn kind(&self) -> u8 {
        self.st_info & 0xf
    }
}

/// One exported symbol published on a loaded handle.
#[derive(Debug, Clone)]
pub struct ExportedSymbol {
    pub name: String,
    pub address: u32,
}

/// Parse every `Elf32_Sym` in the symtab bytes (skipping the reserved index 0).
pub fn parse_symtab(sections: &LoadedSections) -> Vec<Elf32Sym> {
    let Some(shndx) = sections.symtab_shndx else {
        return Vec::new();
    };
    let info = sections.addrs[shndx];
    if info.size == 0 {
        return Vec::new();
    }
    // The symtab bytes live inside `image`, at the offset recorded for this
    // section (addr is an absolute pointer value; recover the offset).
    let base = sections.image.as_ptr() as u32;
    let offset = (info.addr - base) as usize;
    let bytes = &sections.image[offset..offset + info.size as usize];
    let count = bytes.len() / SYM_ENTSIZE;
    (1..count)
        .map(|i| Elf32Sym::parse(&bytes[i * SYM_ENTSIZE..(i + 1) * SYM_ENTSIZE]))
        .collect()
}

fn sym_name<'a>(sections: &'a LoadedSections, sym: &Elf32Sym) -> &'a str {
    let Some(strtab) = &sections.strtab else {
        return "";
    };
    let start = sym.st_name as usize;
    if start >= strtab.len() {
        return "";
    }
    let end = strtab[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .unwrap_or(strtab.len());
    std::str::from_utf8(&strtab[start..end]).unwrap_or("")
}

/// Resolve every symbol in `syms` in place, against `registry` for external
/// references, publishing `GLOBAL` definitions into the returned list.
///
/// Implements the §4.D dispatch table exactly.
pub fn resolve_symbols(
    sections: &LoadedSections,
    syms: &mut [Elf32Sym],
    registry: &Registry,
) -> Result<Vec<ExportedSymbol>, ObjldError> {
    let mut exported = Vec::new();
    for (i, sym) in syms.iter_mut().enumerate() {
        match sym.kind() {
            STT_SECTION | STT_FILE => {}
            STT_NOTYPE if sym.st_name != 0 && sym.st_shndx == 0 => {
                let name = sym_name(sections, sym).to_string();
                let addr = registry
                    .lookup(&name)
                    .ok_or_else(|| ObjldErrorKind::SymbolNotFound { name: name.clone() })?;
                trace!(name, addr, "resolved external reference");
                sym.st_value = addr;
            }
            STT_OBJECT | STT_FUNC => {
                let defining_addr = sections
                    .addrs
                    .get(sym.st_shndx as usize)
                    .map(|a| a.addr)
                    .unwrap_or(0);
                sym.st_value = sym.st_value.wrapping_add(defining_addr);
                if sym.bind() == STB_GLOBAL {
                    let name = sym_name(sections, sym).to_string();
                    exported.push(ExportedSymbol {
                        name,
                        address: sym.st_value,
                    });
                }
            }
            _ => {
                return Err(ObjldErrorKind::UnknownSymbolType {
                    index: i + 1,
                    code: sym.kind(),
                }
                .into())
            }
        }
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_kind_split_st_info() {
        let sym = Elf32Sym {
            st_name: 0,
            st_value: 0,
            st_size: 0,
            st_info: (STB_GLOBAL << 4) | STT_FUNC,
            st_other: 0,
            st_shndx: 0,
        };
        assert_eq!(sym.bind(), STB_GLOBAL);
        assert_eq!(sym.kind(), STT_FUNC);
    }
}
