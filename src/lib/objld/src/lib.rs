//! `objld` — a runtime loader for 32-bit ELF relocatable objects.
//!
//! Reads an `ET_REL` object, allocates a single contiguous image for its
//! loadable sections, resolves its symbols against a process-wide registry,
//! applies `R_386_32`/`R_386_PC32` relocations, and hands back an opaque
//! [`Handle`] whose exported symbols can be looked up by name.
//!
//! Every public entry point on [`Loader`] takes the same process-wide,
//! re-entrant lock, matching the single-threaded, strictly-serialized
//! concurrency model this crate targets.

pub mod elfview;
mod error;
mod handle;
pub mod reloc;
mod registry;
pub mod section;
pub mod symbol;

pub use error::{ObjldError, ObjldErrorKind};
pub use handle::{Handle, HandleFlags, MAX_HANDLES, NAME_LEN};
pub use registry::{Loader, OpenFlags, SymbolTarget};

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal ET_REL x86 object with one `.text` section
    /// containing `00 00 00 00 c3` and a single `GLOBAL FUNC` symbol `f` at
    /// offset 0 — end-to-end scenario 1 of the spec.
    fn minimal_load_fixture() -> Vec<u8> {
        crate::testutil::build_object(crate::testutil::Fixture {
            text: vec![0x00, 0x00, 0x00, 0x00, 0xc3],
            data: vec![],
            symbols: vec![crate::testutil::FixtureSym {
                name: "f".into(),
                value: 0,
                size: 0,
                bind: symbol::STB_GLOBAL,
                kind: symbol::STT_FUNC,
                shndx: crate::testutil::TEXT_SHNDX,
            }],
            rels: vec![],
        })
    }

    #[test]
    fn scenario_1_minimal_load() {
        let bytes = minimal_load_fixture();
        std::fs::write("/tmp/objld_test_foo.o", &bytes).unwrap();

        let loader = Loader::new();
        loader.set_search_paths(vec!["/tmp".into()]);
        let handle = loader
            .open("objld_test_foo.o", OpenFlags::NOW)
            .expect("scenario 1 open must succeed");

        let addr = loader
            .symbol(SymbolTarget::Handle(handle), "f")
            .expect("exported symbol f must resolve");
        assert!(addr != 0, "exported address should be the image base, non-null");

        loader.close(handle);
    }

    #[test]
    fn scenario_2_external_resolution() {
        let bytes = crate::testutil::build_object(crate::testutil::Fixture {
            text: vec![0x00, 0x00, 0x00, 0x00, 0xc3],
            data: vec![],
            symbols: vec![crate::testutil::FixtureSym {
                name: "puts".into(),
                value: 0,
                size: 0,
                bind: symbol::STB_GLOBAL,
                kind: symbol::STT_NOTYPE,
                shndx: 0,
            }],
            rels: vec![crate::testutil::FixtureRel {
                offset: 1,
                sym_index: 1,
                r_type: reloc::R_386_PC32,
            }],
        });
        std::fs::write("/tmp/objld_test_ext.o", &bytes).unwrap();

        let loader = Loader::new();
        loader.set_search_paths(vec!["/tmp".into()]);
        loader.insert_runtime_symbol("puts", 0x08049000);

        let handle = loader
            .open("objld_test_ext.o", OpenFlags::NOW)
            .expect("scenario 2 open must succeed");
        loader.close(handle);
    }

    #[test]
    fn scenario_3_missing_external_fails() {
        let bytes = crate::testutil::build_object(crate::testutil::Fixture {
            text: vec![0x00, 0x00, 0x00, 0x00, 0xc3],
            data: vec![],
            symbols: vec![crate::testutil::FixtureSym {
                name: "puts".into(),
                value: 0,
                size: 0,
                bind: symbol::STB_GLOBAL,
                kind: symbol::STT_NOTYPE,
                shndx: 0,
            }],
            rels: vec![crate::testutil::FixtureRel {
                offset: 1,
                sym_index: 1,
                r_type: reloc::R_386_PC32,
            }],
        });
        std::fs::write("/tmp/objld_test_missing.o", &bytes).unwrap();

        let loader = Loader::new();
        loader.set_search_paths(vec!["/tmp".into()]);
        assert!(loader.open("objld_test_missing.o", OpenFlags::NOW).is_none());
        assert!(loader.last_error().unwrap().contains("not found"));
    }

    #[test]
    fn scenario_4_handle_exhaustion() {
        let loader = Loader::new();
        loader.set_search_paths(vec!["/tmp".into()]);
        for i in 0..MAX_HANDLES {
            let bytes = crate::testutil::build_object(crate::testutil::Fixture {
                text: vec![0xc3],
                data: vec![],
                symbols: vec![],
                rels: vec![],
            });
            let path = format!("/tmp/objld_test_many_{i}.o");
            std::fs::write(&path, &bytes).unwrap();
            let file_name = path.rsplit('/').next().unwrap();
            assert!(loader.open(file_name, OpenFlags::NOW).is_some());
        }
        let bytes = crate::testutil::build_object(crate::testutil::Fixture {
            text: vec![0xc3],
            data: vec![],
            symbols: vec![],
            rels: vec![],
        });
        std::fs::write("/tmp/objld_test_many_overflow.o", &bytes).unwrap();
        assert!(loader
            .open("objld_test_many_overflow.o", OpenFlags::NOW)
            .is_none());
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Hand-rolled ET_REL fixture builder used only by unit tests, so
    //! scenarios don't need shipped binary fixture files.

    pub const TEXT_SHNDX: u16 = 1;
    const DATA_SHNDX: u16 = 2;
    const SYMTAB_SHNDX: u16 = 3;
    const STRTAB_SHNDX: u16 = 4;
    const SHSTRTAB_SHNDX: u16 = 5;
    const REL_TEXT_SHNDX: u16 = 6;

    pub struct FixtureSym {
        pub name: String,
        pub value: u32,
        pub size: u32,
        pub bind: u8,
        pub kind: u8,
        pub shndx: u16,
    }

    pub struct FixtureRel {
        pub offset: u32,
        pub sym_index: u32,
        pub r_type: u32,
    }

    pub struct Fixture {
        pub text: Vec<u8>,
        pub data: Vec<u8>,
        pub symbols: Vec<FixtureSym>,
        pub rels: Vec<FixtureRel>,
    }

    /// Serializes `f` into a minimal, valid 32-bit little-endian ET_REL
    /// image: ELF header, `.text`, `.data`, `.symtab`, `.strtab`,
    /// `.shstrtab`, optionally `.rel.text`, and a section header table.
    pub fn build_object(f: Fixture) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; 16]; // reserved index 0
        for sym in &f.symbols {
            let name_off = strtab.len() as u32;
            strtab.extend_from_slice(sym.name.as_bytes());
            strtab.push(0);
            symtab.extend_from_slice(&name_off.to_le_bytes());
            symtab.extend_from_slice(&sym.value.to_le_bytes());
            symtab.extend_from_slice(&sym.size.to_le_bytes());
            symtab.push((sym.bind << 4) | sym.kind);
            symtab.push(0);
            symtab.extend_from_slice(&sym.shndx.to_le_bytes());
        }

        let mut rel_text = Vec::new();
        for rel in &f.rels {
            rel_text.extend_from_slice(&rel.offset.to_le_bytes());
            let info = (rel.sym_index << 8) | rel.r_type;
            rel_text.extend_from_slice(&info.to_le_bytes());
        }

        let shstrtab_names = [
            "\0",
            ".text\0",
            ".data\0",
            ".symtab\0",
            ".strtab\0",
            ".shstrtab\0",
            ".rel.text\0",
        ];
        let mut shstrtab = Vec::new();
        let mut name_off = |n: usize| -> u32 {
            let mut off = 0u32;
            for s in &shstrtab_names[..n] {
                off += s.len() as u32;
            }
            off
        };
        for s in &shstrtab_names {
            shstrtab.extend_from_slice(s.as_bytes());
        }

        const EHDR_SIZE: usize = 52;
        const SHDR_SIZE: usize = 40;
        let num_shdrs = if f.rels.is_empty() { 6 } else { 7 };

        let mut layout = Vec::new(); // (offset, size) per section body, index 0 is null
        let mut cursor = EHDR_SIZE;
        layout.push((0, 0));
        layout.push((cursor, f.text.len()));
        cursor += f.text.len();
        layout.push((cursor, f.data.len()));
        cursor += f.data.len();
        layout.push((cursor, symtab.len()));
        cursor += symtab.len();
        layout.push((cursor, strtab.len()));
        cursor += strtab.len();
        layout.push((cursor, shstrtab.len()));
        cursor += shstrtab.len();
        if !f.rels.is_empty() {
            layout.push((cursor, rel_text.len()));
            cursor += rel_text.len();
        }
        let shoff = cursor;

        let mut out = Vec::new();
        // e_ident
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&1u16.to_le_bytes()); // e_type = ET_REL
        out.extend_from_slice(&3u16.to_le_bytes()); // e_machine = EM_386
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&0u32.to_le_bytes()); // e_entry
        out.extend_from_slice(&0u32.to_le_bytes()); // e_phoff
        out.extend_from_slice(&(shoff as u32).to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes()); // e_shentsize
        out.extend_from_slice(&(num_shdrs as u16).to_le_bytes()); // e_shnum
        out.extend_from_slice(&(SHSTRTAB_SHNDX).to_le_bytes()); // e_shstrndx
        assert_eq!(out.len(), EHDR_SIZE);

        out.extend_from_slice(&f.text);
        out.extend_from_slice(&f.data);
        out.extend_from_slice(&symtab);
        out.extend_from_slice(&strtab);
        out.extend_from_slice(&shstrtab);
        if !f.rels.is_empty() {
            out.extend_from_slice(&rel_text);
        }

        let shdr = |out: &mut Vec<u8>,
                    name: u32,
                    sh_type: u32,
                    offset: usize,
                    size: usize,
                    link: u32,
                    info: u32| {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&sh_type.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // sh_flags
            out.extend_from_slice(&0u32.to_le_bytes()); // sh_addr
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(size as u32).to_le_bytes());
            out.extend_from_slice(&link.to_le_bytes());
            out.extend_from_slice(&info.to_le_bytes());
            out.extend_from_slice(&4u32.to_le_bytes()); // sh_addralign
            out.extend_from_slice(&0u32.to_le_bytes()); // sh_entsize
        };

        shdr(&mut out, name_off(0), 0, 0, 0, 0, 0); // null
        shdr(
            &mut out,
            name_off(1),
            elf::abi::SHT_PROGBITS,
            layout[1].0,
            layout[1].1,
            0,
            0,
        );
        shdr(
            &mut out,
            name_off(2),
            elf::abi::SHT_PROGBITS,
            layout[2].0,
            layout[2].1,
            0,
            0,
        );
        shdr(
            &mut out,
            name_off(3),
            elf::abi::SHT_SYMTAB,
            layout[3].0,
            layout[3].1,
            STRTAB_SHNDX as u32,
            0,
        );
        shdr(
            &mut out,
            name_off(4),
            elf::abi::SHT_STRTAB,
            layout[4].0,
            layout[4].1,
            0,
            0,
        );
        shdr(
            &mut out,
            name_off(5),
            elf::abi::SHT_STRTAB,
            layout[5].0,
            layout[5].1,
            0,
            0,
        );
        if !f.rels.is_empty() {
            shdr(
                &mut out,
                name_off(6),
                elf::abi::SHT_REL,
                layout[6].0,
                layout[6].1,
                SYMTAB_SHNDX as u32,
                TEXT_SHNDX as u32,
            );
        }
        let _ = DATA_SHNDX;
        let _ = SHSTRTAB_SHNDX;
        let _ = REL_TEXT_SHNDX;

        out
    }
}
