//! `-o`/`-x` list-file processing: add or remove objects from the
//! Optional link set by name, grounded in `ldep.c`'s `processFile`.

use tracing::warn;

use crate::{
    error::LdepError,
    graph::{Context, LinkSetId},
    walk::{link, unlink},
};

/// Strips every `/* ... */` comment from `text`, including ones spanning
/// multiple lines (unlike the nm-listing stripper in `scan.rs`, which only
/// ever sees single-line comments in practice).
fn strip_c_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("/*") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("*/") {
                    Some(end) => rest = &rest[start + end + 2..],
                    None => break,
                }
            }
        }
    }
    out
}

/// Tokenizes comment-stripped list-file text into `<name>:` entries,
/// preserving the file's order.
fn tokenize(text: &str) -> Vec<String> {
    strip_c_comments(text)
        .split_whitespace()
        .filter_map(|tok| tok.strip_suffix(':').map(str::to_string))
        .collect()
}

/// Processes one `-o`/`-x` list file's contents against `ctx`. `add`
/// selects `-o` (link into Optional) vs `-x` (unlink). `sloppy_unlink`
/// mirrors `-F`: an unlink rejected by the mandatory set is logged and
/// skipped rather than propagated.
pub fn process_list(
    ctx: &mut Context,
    path: &str,
    text: &str,
    add: bool,
    sloppy_unlink: bool,
) -> Result<(), LdepError> {
    for name in tokenize(text) {
        let matches = ctx.find_objects(&name);
        match matches.len() {
            0 => {
                return Err(LdepError::UnknownObjectInListFile {
                    path: path.to_string(),
                    object: name,
                })
            }
            1 => {
                let obj = matches[0];
                if add {
                    if ctx.graph[obj].anchor.is_none() {
                        ctx.graph[obj].anchor = Some(LinkSetId::Optional);
                        link(ctx, obj, Some(&format!("<SCRIPT>'{path}'")));
                    }
                } else {
                    match unlink(ctx, obj, false) {
                        Ok(_) => {}
                        Err(e) if sloppy_unlink => {
                            warn!(object = %ctx.object_name(obj), error = %e, "ignoring rejected unlink (-F)");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            count => {
                return Err(LdepError::AmbiguousObject { name, count });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_file;

    #[test]
    fn strips_multiline_comments() {
        let text = "a.o: /* first\nsecond */\nb.o:";
        assert_eq!(tokenize(text), vec!["a.o".to_string(), "b.o".to_string()]);
    }

    #[test]
    fn adds_object_to_optional_set() {
        let mut ctx = Context::new();
        scan_file(&mut ctx, "a.o", "a.o:\nk T 0 4\n", false).unwrap();
        ctx.fixup();
        ctx.gather_dangling_undefs();

        process_list(&mut ctx, "opt.list", "a.o:\n", true, false).unwrap();
        let obj = ctx.find_objects("a.o")[0];
        assert_eq!(ctx.graph[obj].anchor, Some(LinkSetId::Optional));
    }

    #[test]
    fn unknown_object_is_an_error() {
        let mut ctx = Context::new();
        let err = process_list(&mut ctx, "opt.list", "missing.o:\n", true, false).unwrap_err();
        assert!(matches!(err, LdepError::UnknownObjectInListFile { .. }));
    }
}
