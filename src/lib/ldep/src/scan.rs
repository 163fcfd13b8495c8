//! Component H — `nm -g -fposix` listing parser.

use tracing::trace;

use crate::{
    error::LdepError,
    graph::{Context, ObjIdx},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymClass {
    Import,
    Export { weak: bool },
}

/// `lenient` mirrors the analyzer's `-f` flag: fold local (lowercase) type
/// letters up to their global equivalent, and treat an unrecognized `?`
/// type as undefined rather than failing the scan. `w` (lowercase weak) is
/// treated as imported specifically under lenient mode, per the spec text;
/// it is not folded to `W` like the other local letters.
fn classify(code: char, lenient: bool) -> Option<SymClass> {
    match code {
        'U' => Some(SymClass::Import),
        '?' | 'w' if lenient => Some(SymClass::Import),
        'W' | 'V' => Some(SymClass::Export { weak: true }),
        'D' | 'T' | 'B' | 'R' | 'G' | 'S' | 'A' | 'C' => Some(SymClass::Export { weak: false }),
        _ if lenient => {
            let upper = code.to_ascii_uppercase();
            match upper {
                'W' | 'V' => Some(SymClass::Export { weak: true }),
                'D' | 'T' | 'B' | 'R' | 'G' | 'S' | 'A' | 'C' => {
                    Some(SymClass::Export { weak: false })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn split_object_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    let name = trimmed.strip_suffix(':')?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(name)
}

fn split_member(qualified: &str) -> (Option<String>, String) {
    match crate::graph::split_archive_name(qualified) {
        Some((lib, member)) => (Some(lib.to_string()), member.to_string()),
        None => (None, qualified.to_string()),
    }
}

/// Scans one `nm -g -fposix`-formatted listing into `ctx`, returning the
/// node index of the last object created (used to implement "the first
/// file's objects are the mandatory set" in the absence of `-A`).
pub fn scan_file(ctx: &mut Context, file_label: &str, text: &str, lenient: bool) -> Result<Vec<ObjIdx>, LdepError> {
    let mut created = Vec::new();
    let mut current: Option<ObjIdx> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let stripped = strip_comment(raw_line);
        let line = stripped.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = split_object_marker(line) {
            let (archive, member) = split_member(name);
            let idx = ctx.add_object(member, archive);
            trace!(object = %ctx.object_name(idx), "scanning object");
            current = Some(idx);
            created.push(idx);
            continue;
        }

        let Some(obj_idx) = current else {
            return Err(LdepError::MalformedSymbolLine {
                file: file_label.to_string(),
                line: lineno + 1,
                text: line.to_string(),
            });
        };

        let mut fields = line.split_whitespace();
        let name = fields.next().ok_or_else(|| LdepError::MalformedSymbolLine {
            file: file_label.to_string(),
            line: lineno + 1,
            text: line.to_string(),
        })?;
        let type_char = fields
            .next()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| LdepError::MalformedSymbolLine {
                file: file_label.to_string(),
                line: lineno + 1,
                text: line.to_string(),
            })?;
        let value: u32 = fields
            .next()
            .and_then(|s| u32::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0);
        let size: u32 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        match classify(type_char, lenient) {
            Some(SymClass::Import) => {
                let sym = ctx.intern_import(name);
                ctx.graph[obj_idx].imports.push(sym);
            }
            Some(SymClass::Export { weak }) => {
                let sym = ctx.intern_export(name, type_char, weak, if size != 0 { size } else { value });
                ctx.graph[obj_idx].exports.push((sym, weak));
            }
            None => {
                return Err(LdepError::UnrecognizedSymbolType {
                    file: file_label.to_string(),
                    line: lineno + 1,
                    code: type_char,
                })
            }
        }
    }

    Ok(created)
}

/// Strips a `/* ... */` C-style comment fully contained on this line; plain
/// nm output is not expected to carry comments, so spanning ones are left
/// alone here (list files use a dedicated, multi-line-aware stripper in
/// `listfile.rs`).
fn strip_comment(line: &str) -> String {
    if let Some(start) = line.find("/*") {
        if let Some(end) = line[start..].find("*/") {
            let mut out = String::with_capacity(line.len());
            out.push_str(&line[..start]);
            out.push_str(&line[start + end + 2..]);
            return out;
        }
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_closure_fixture_scans() {
        let mut ctx = Context::new();
        scan_file(&mut ctx, "a.o", "a.o:\nx U\n", false).unwrap();
        scan_file(&mut ctx, "b.o", "b.o:\nx T 0 4\ny U\n", false).unwrap();
        scan_file(&mut ctx, "c.o", "c.o:\ny T 0 4\n", false).unwrap();
        ctx.fixup();
        ctx.gather_dangling_undefs();

        let x = ctx.symbol_id("x").unwrap();
        assert_eq!(ctx.symbols[x].exported_by.len(), 1);
    }

    #[test]
    fn lenient_mode_accepts_question_mark() {
        let mut ctx = Context::new();
        scan_file(&mut ctx, "a.o", "a.o:\nx ?\n", true).unwrap();
        assert!(scan_file(&mut ctx, "b.o", "b.o:\nx ?\n", false).is_err());
    }
}
