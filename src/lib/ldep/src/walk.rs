//! Component J — depth-first walk, linking and unlinking.
//!
//! Dependency edges (`importer -> definer`) are not known up front; `link`
//! adds them lazily as objects are resolved, the same way the teacher's
//! `Context::add_dep` grows the library graph while libraries get loaded.
//! The walk's "scratch pointer" cycle guard becomes a transient `HashSet`
//! per call (Design Note: "explicit visited-set container indexed by node
//! id"), rather than a field threaded through the node itself.

use std::collections::HashSet;

use itertools::Itertools;
use petgraph::Direction;
use tracing::{debug, trace, warn};

use crate::{
    error::LdepError,
    graph::{Context, LinkSetId, ObjIdx},
};

/// Collects `root` plus every object transitively depending on it (i.e.
/// following the reverse of the dependency edge — "who imports from me,
/// and who imports from them"). Used by `unlink` to build its work list,
/// and by `-d` to dump a flat per-object dependency report.
pub fn collect_dependents(ctx: &Context, root: ObjIdx) -> Vec<ObjIdx> {
    walk(ctx, root, Direction::Incoming)
}

fn walk(ctx: &Context, root: ObjIdx, dir: Direction) -> Vec<ObjIdx> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if !visited.insert(n) {
            continue;
        }
        order.push(n);
        for next in ctx.graph.neighbors_directed(n, dir) {
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }
    order
}

/// Links `obj` into the link set preassigned on its `anchor` field. For
/// every symbol `obj` imports, the first object in the defining symbol's
/// `exported_by` list is taken as the definer (first hit wins, matching
/// `lookup_global_symbol`'s resolved semantics); `obj` registers itself as
/// an importer, a dependency edge is added, and if the definer has no
/// anchor yet it inherits `obj`'s and is linked recursively.
pub fn link(ctx: &mut Context, obj: ObjIdx, reason: Option<&str>) {
    let anchor = ctx.graph[obj].anchor.expect("link() requires a preassigned link-set anchor");
    if let Some(reason) = reason {
        debug!(object = %ctx.object_name(obj), reason, "linking");
    } else {
        trace!(object = %ctx.object_name(obj), "linking");
    }
    add_to_link_set(ctx, anchor, obj);

    let imports = ctx.graph[obj].imports.clone();
    for sym_id in imports {
        let Some(&definer) = ctx.symbols[sym_id].exported_by.first() else {
            // Unreachable once `gather_dangling_undefs` has run: every
            // symbol has at least the synthetic UNDEFINED object.
            warn!(symbol = %ctx.symbols[sym_id].name, "symbol has no exporter");
            continue;
        };

        ctx.symbols[sym_id].imported_from.insert(0, obj);
        ctx.graph.add_edge(obj, definer, ());

        if ctx.graph[definer].anchor.is_none() {
            ctx.graph[definer].anchor = Some(anchor);
            link(ctx, definer, None);
        }
    }
}

/// Registers `obj` as a member of `set`, unless it is already recorded
/// (`link` is only ever meant to run once per object, but membership is
/// kept idempotent since both the CLI and list-file paths assign anchors
/// right before calling `link`).
fn add_to_link_set(ctx: &mut Context, set: LinkSetId, obj: ObjIdx) {
    let members = ctx.link_sets.entry(set).or_default();
    if !members.contains(&obj) {
        members.push(obj);
    }
}

/// Unlinks `root` together with every object transitively depending on it.
/// If `check_only`, no mutation happens; the work list that *would* be
/// removed is still returned so callers can report on it.
///
/// Returns `Err` with the offending object's name if any member of the
/// closure belongs to the `Application` link set (P7).
pub fn unlink(ctx: &mut Context, root: ObjIdx, check_only: bool) -> Result<Vec<ObjIdx>, LdepError> {
    let worklist = collect_dependents(ctx, root);

    for &idx in &worklist {
        if ctx.graph[idx].anchor == Some(LinkSetId::Application) {
            return Err(LdepError::RejectedByMandatorySet {
                object: ctx.object_name(idx),
            });
        }
    }

    if check_only {
        return Ok(worklist);
    }

    for &idx in &worklist {
        let imports = ctx.graph[idx].imports.clone();
        for sym_id in imports {
            ctx.symbols[sym_id].imported_from.retain(|&o| o != idx);
        }
        if let Some(set) = ctx.graph[idx].anchor.take() {
            if let Some(members) = ctx.link_sets.get_mut(&set) {
                members.retain(|&o| o != idx);
            }
        }
    }

    check_sanity(ctx, &worklist);
    Ok(worklist)
}

/// Asserts that no exported symbol of a just-removed object is still
/// claimed as imported-from by a live importer.
fn check_sanity(ctx: &Context, removed: &[ObjIdx]) {
    for &idx in removed {
        for &(sym_id, _) in &ctx.graph[idx].exports {
            debug_assert!(
                !ctx.symbols[sym_id].imported_from.contains(&idx),
                "symbol '{}' still claims removed object '{}' as an importer",
                ctx.symbols[sym_id].name,
                ctx.object_name(idx)
            );
        }
    }
}

/// For each export of the synthetic UNDEFINED object, attempt to unlink
/// every importer; rejections (mandatory objects) are skipped silently,
/// under the assumption that they are provided by link scripts or startup
/// files.
pub fn unlink_undefs(ctx: &mut Context) {
    let undef = ctx.undefined_obj;
    let exports: Vec<_> = ctx.graph[undef].exports.iter().map(|&(s, _)| s).collect();
    for sym_id in exports {
        let importers = ctx.symbols[sym_id].imported_from.clone();
        for importer in importers {
            match unlink(ctx, importer, false) {
                Ok(_) => {}
                Err(_) => {
                    trace!(
                        object = %ctx.object_name(importer),
                        "skipping undefined-symbol unlink: mandatory"
                    );
                }
            }
        }
    }
}

/// Component J's multiple-definition check: every exported symbol whose
/// `exported_by` list has length > 1 is a clash, unless its type is
/// common (`C`), which coalesces.
pub fn check_multiple_defs(ctx: &Context, set: LinkSetId) -> Vec<String> {
    let members = ctx.link_sets.get(&set).cloned().unwrap_or_default();
    members
        .iter()
        .flat_map(|&obj| ctx.graph[obj].exports.iter().map(|&(sym_id, _)| sym_id))
        .unique()
        .filter_map(|sym_id| {
            let sym = &ctx.symbols[sym_id];
            (sym.exported_by.len() > 1 && !sym.is_common()).then(|| sym.name.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_file;

    fn build_closure_fixture() -> (Context, ObjIdx, ObjIdx, ObjIdx) {
        let mut ctx = Context::new();
        let a = scan_file(&mut ctx, "a.o", "a.o:\nx U\n", false).unwrap()[0];
        let b = scan_file(&mut ctx, "b.o", "b.o:\nx T 0 4\ny U\n", false).unwrap()[0];
        let c = scan_file(&mut ctx, "c.o", "c.o:\ny T 0 4\n", false).unwrap()[0];
        ctx.fixup();
        ctx.gather_dangling_undefs();
        (ctx, a, b, c)
    }

    #[test]
    fn scenario_5_link_set_closure() {
        let (mut ctx, a, b, c) = build_closure_fixture();
        ctx.graph[a].anchor = Some(LinkSetId::Application);
        link(&mut ctx, a, None);

        assert_eq!(ctx.graph[a].anchor, Some(LinkSetId::Application));
        assert_eq!(ctx.graph[b].anchor, Some(LinkSetId::Application));
        assert_eq!(ctx.graph[c].anchor, Some(LinkSetId::Application));

        assert!(unlink(&mut ctx, c, true).is_err());
    }

    #[test]
    fn scenario_6_multi_def_detection() {
        let mut ctx = Context::new();
        let a = scan_file(&mut ctx, "a.o", "a.o:\nk T 0 4\n", false).unwrap()[0];
        let b = scan_file(&mut ctx, "b.o", "b.o:\nk T 0 4\n", false).unwrap()[0];
        ctx.fixup();
        ctx.gather_dangling_undefs();
        ctx.graph[a].anchor = Some(LinkSetId::Application);
        ctx.graph[b].anchor = Some(LinkSetId::Application);
        add_to_link_set(&mut ctx, LinkSetId::Application, a);
        add_to_link_set(&mut ctx, LinkSetId::Application, b);

        let clashes = check_multiple_defs(&ctx, LinkSetId::Application);
        assert_eq!(clashes, vec!["k".to_string()]);
    }

    #[test]
    fn common_type_does_not_clash() {
        let mut ctx = Context::new();
        let a = scan_file(&mut ctx, "a.o", "a.o:\nk C 0 4\n", false).unwrap()[0];
        let b = scan_file(&mut ctx, "b.o", "b.o:\nk C 0 4\n", false).unwrap()[0];
        ctx.fixup();
        ctx.gather_dangling_undefs();
        ctx.graph[a].anchor = Some(LinkSetId::Application);
        ctx.graph[b].anchor = Some(LinkSetId::Application);
        add_to_link_set(&mut ctx, LinkSetId::Application, a);
        add_to_link_set(&mut ctx, LinkSetId::Application, b);

        assert!(check_multiple_defs(&ctx, LinkSetId::Application).is_empty());
    }
}
