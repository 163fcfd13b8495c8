//! Component K — output emitter: linker-directive script or embeddable
//! symbol-table source.

use std::io::{self, Write};

use crate::graph::{Context, LinkSetId};

const ALIAS_PREFIX: &str = "__dummy_alias_";

fn strip_version_suffix(name: &str) -> &str {
    match name.find('@') {
        Some(at) => &name[..at],
        None => name,
    }
}

fn set_title(set: LinkSetId) -> &'static str {
    set.title()
}

/// Writes `EXTERN( symbol ) /* size N */` lines for every export of every
/// object in `set`, grouped under a per-object `/* name: */` banner,
/// matching `writeLinkSet`.
fn write_link_set(out: &mut impl Write, ctx: &Context, set: LinkSetId, title: &str) -> io::Result<()> {
    let members = ctx.link_sets.get(&set).cloned().unwrap_or_default();
    if members.is_empty() {
        return Ok(());
    }

    writeln!(out, "/* ----- {title} Link Set ----- */\n")?;
    for obj in members {
        writeln!(out, "/* {}: */", ctx.object_name(obj))?;
        for &(sym_id, _weak) in &ctx.graph[obj].exports {
            let sym = &ctx.symbols[sym_id];
            writeln!(out, "EXTERN( {} ) /* size {} */", sym.name, sym.size)?;
        }
    }
    Ok(())
}

/// Emits a linker script with `EXTERN()` references enforcing linkage of
/// the Application and Optional sets. If `optional_only`, the Application
/// set is omitted (`-O`).
pub fn write_script(out: &mut impl Write, ctx: &Context, optional_only: bool) -> io::Result<()> {
    if !optional_only {
        write_link_set(out, ctx, LinkSetId::Application, "Application")?;
        writeln!(out)?;
    }
    write_link_set(out, ctx, LinkSetId::Optional, "Optional")?;
    Ok(())
}

/// Writes one pass of symbol definitions for `set`: pass 0 emits the alias
/// declarations (`extern int __dummy_alias_<title><i>;` plus the `.set`
/// binding to the version-stripped real name), pass 1 emits the table
/// entries referencing those aliases by address.
fn write_symdefs(
    out: &mut impl Write,
    ctx: &Context,
    set: LinkSetId,
    title: &str,
    pass: u8,
    next_idx: &mut u32,
) -> io::Result<()> {
    let members = ctx.link_sets.get(&set).cloned().unwrap_or_default();
    if members.is_empty() {
        return Ok(());
    }

    writeln!(out, "/* ----- {title} Link Set ----- */\n")?;
    for obj in members {
        writeln!(out, "/* {}: */", ctx.object_name(obj))?;
        for &(sym_id, _weak) in &ctx.graph[obj].exports {
            let sym = &ctx.symbols[sym_id];
            let i = *next_idx;
            *next_idx += 1;
            if pass == 0 {
                let stripped = strip_version_suffix(&sym.name);
                writeln!(out, "extern int {ALIAS_PREFIX}{title}{i};")?;
                writeln!(out, "asm(\".set {ALIAS_PREFIX}{title}{i},{stripped}\\n\");")?;
            } else {
                writeln!(out, "\t{{")?;
                writeln!(out, "\t\t.name  = \"{}\",", strip_version_suffix(&sym.name))?;
                writeln!(out, "\t\t.value = (unsigned long)&{ALIAS_PREFIX}{title}{i},")?;
                writeln!(out, "\t}},")?;
            }
        }
    }
    Ok(())
}

/// Emits a C source file declaring `systemSymbols[]`, suitable for
/// embedding into the host program and consuming via the runtime loader's
/// process symbol registry ingestion.
pub fn write_source(out: &mut impl Write, ctx: &Context, optional_only: bool) -> io::Result<()> {
    for pass in 0..2u8 {
        if pass == 0 {
            writeln!(out, "#include \"sym.h\"")?;
        } else {
            writeln!(out, "\nstatic struct dl_symbol systemSymbols[] = {{")?;
        }

        let mut idx = 0u32;
        if !optional_only {
            write_symdefs(out, ctx, LinkSetId::Application, "Application", pass, &mut idx)?;
            writeln!(out)?;
        }
        write_symdefs(out, ctx, LinkSetId::Optional, "Optional", pass, &mut idx)?;

        if pass == 1 {
            writeln!(out, "\t{{")?;
            writeln!(out, "\t0, /* terminating record */")?;
            writeln!(out, "\t}},")?;
            writeln!(out, "}};")?;
            writeln!(out, "struct dl_symbol *cexpSystemSymbols = systemSymbols;")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_file;
    use crate::walk::link;

    fn fixture() -> Context {
        let mut ctx = Context::new();
        let a = scan_file(&mut ctx, "a.o", "a.o:\nmain T 0 4\n", false).unwrap()[0];
        ctx.fixup();
        ctx.gather_dangling_undefs();
        ctx.graph[a].anchor = Some(LinkSetId::Application);
        link(&mut ctx, a, Some("main"));
        ctx
    }

    #[test]
    fn script_emits_extern_lines() {
        let ctx = fixture();
        let mut buf = Vec::new();
        write_script(&mut buf, &ctx, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("EXTERN( main ) /* size 4 */"));
        assert!(text.contains("Application Link Set"));
    }

    #[test]
    fn source_strips_version_suffix() {
        let mut ctx = Context::new();
        let a = scan_file(&mut ctx, "a.o", "a.o:\nfoo@VERS_1 T 0 4\n", false).unwrap()[0];
        ctx.fixup();
        ctx.gather_dangling_undefs();
        ctx.graph[a].anchor = Some(LinkSetId::Application);
        link(&mut ctx, a, None);

        let mut buf = Vec::new();
        write_source(&mut buf, &ctx, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(".set __dummy_alias_Application0,foo\\n"));
        assert!(text.contains("\"foo\""));
        assert!(!text.contains("foo@VERS_1\""));
    }
}
