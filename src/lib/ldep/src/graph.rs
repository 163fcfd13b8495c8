//! Component I — the bipartite object/symbol dependency graph.
//!
//! Objects live as nodes of a `petgraph::StableDiGraph`; an edge `a -> b`
//! means "`a` imports a symbol that `b` defines," added lazily during
//! linking (see [`crate::walk::link`]), mirroring how the teacher's
//! `Context::add_dep` wires dependency edges as libraries get resolved
//! rather than up front.
//!
//! Symbols are kept in a flat arena, not as graph nodes: a symbol's
//! exported-by/imported-from lists are plain `Vec<ObjIdx>`, since nothing
//! ever needs to traverse *through* a symbol — only object-to-object
//! reachability matters for the walk/link/unlink algorithms.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

pub type ObjIdx = NodeIndex;
pub type SymId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSetId {
    Application,
    Optional,
    Undefined,
}

impl LinkSetId {
    pub fn title(self) -> &'static str {
        match self {
            LinkSetId::Application => "Application",
            LinkSetId::Optional => "Optional",
            LinkSetId::Undefined => "UNDEFINED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    /// Member name, e.g. `foo.o`.
    pub name: String,
    /// Owning archive, e.g. `libc.a`, if this is an archive member.
    pub archive: Option<String>,
    /// Symbols this object exports, scan-time (§4.H), each tagged weak/not.
    pub exports: Vec<(SymId, bool)>,
    /// Symbols this object imports, scan-time.
    pub imports: Vec<SymId>,
    /// Link-set membership, assigned by `link`.
    pub anchor: Option<LinkSetId>,
}

impl Object {
    pub fn display_name(&self) -> String {
        match &self.archive {
            Some(lib) => format!("{lib}[{}]", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub type_code: char,
    pub weak: bool,
    pub size: u32,
    /// Built by `fixup()`, after scanning completes (component I's "fixup").
    pub exported_by: Vec<ObjIdx>,
    /// Built incrementally while linking (component J).
    pub imported_from: Vec<ObjIdx>,
}

impl Symbol {
    fn placeholder(name: String) -> Self {
        Self {
            name,
            type_code: 'U',
            weak: false,
            size: 0,
            exported_by: Vec::new(),
            imported_from: Vec::new(),
        }
    }

    pub fn is_common(&self) -> bool {
        self.type_code.to_ascii_uppercase() == 'C'
    }

    pub fn is_defined(&self) -> bool {
        self.type_code != 'U'
    }
}

pub struct Context {
    pub graph: StableDiGraph<Object, ()>,
    pub symbols: Vec<Symbol>,
    sym_index: HashMap<String, SymId>,
    /// Indexed by basename so `lib[member]` disambiguation can enumerate
    /// every same-named object.
    obj_index: HashMap<String, Vec<ObjIdx>>,
    pub link_sets: HashMap<LinkSetId, Vec<ObjIdx>>,
    pub undefined_obj: ObjIdx,
}

impl Context {
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let undefined_obj = graph.add_node(Object {
            name: "<UNDEFINED>".to_string(),
            archive: None,
            exports: Vec::new(),
            imports: Vec::new(),
            anchor: Some(LinkSetId::Undefined),
        });
        let mut link_sets = HashMap::new();
        link_sets.insert(LinkSetId::Application, Vec::new());
        link_sets.insert(LinkSetId::Optional, Vec::new());
        link_sets.insert(LinkSetId::Undefined, vec![undefined_obj]);
        Self {
            graph,
            symbols: Vec::new(),
            sym_index: HashMap::new(),
            obj_index: HashMap::new(),
            link_sets,
            undefined_obj,
        }
    }

    pub fn add_object(&mut self, name: String, archive: Option<String>) -> ObjIdx {
        let idx = self.graph.add_node(Object {
            name: name.clone(),
            archive,
            exports: Vec::new(),
            imports: Vec::new(),
            anchor: None,
        });
        self.obj_index.entry(name).or_default().push(idx);
        idx
    }

    /// Find every live object matching `name`, which may be a bare member
    /// name (matches any archive) or a `lib[member]` qualified name.
    pub fn find_objects(&self, name: &str) -> Vec<ObjIdx> {
        if let Some((lib, member)) = split_archive_name(name) {
            self.obj_index
                .get(member)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&idx| {
                    self.graph
                        .node_weight(idx)
                        .and_then(|o| o.archive.as_deref())
                        == Some(lib)
                })
                .collect()
        } else {
            self.obj_index.get(name).cloned().unwrap_or_default()
        }
    }

    /// Intern a symbol name, creating a `U` placeholder record if new.
    pub fn intern_import(&mut self, name: &str) -> SymId {
        if let Some(&id) = self.sym_index.get(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol::placeholder(name.to_string()));
        self.sym_index.insert(name.to_string(), id);
        id
    }

    /// Record an export sighting, applying the weak-override resolution:
    /// a non-weak definition always wins; a weak definition never overrides
    /// an existing non-weak one, regardless of arrival order.
    pub fn intern_export(&mut self, name: &str, type_code: char, weak: bool, size: u32) -> SymId {
        if let Some(&id) = self.sym_index.get(name) {
            let sym = &mut self.symbols[id];
            if !sym.is_defined() || (sym.weak && !weak) {
                sym.type_code = type_code;
                sym.weak = weak;
                sym.size = size;
            }
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            type_code,
            weak,
            size,
            exported_by: Vec::new(),
            imported_from: Vec::new(),
        });
        self.sym_index.insert(name.to_string(), id);
        id
    }

    pub fn symbol_id(&self, name: &str) -> Option<SymId> {
        self.sym_index.get(name).copied()
    }

    /// Component I's fixup pass: wire each object's export list onto its
    /// symbols' `exported_by` lists. Must run once, after scanning, so
    /// growth of `self.symbols`/`self.graph` has quiesced.
    pub fn fixup(&mut self) {
        let objs: Vec<ObjIdx> = self.graph.node_indices().collect();
        for idx in objs {
            let exports = self.graph[idx].exports.clone();
            for (sym_id, _weak) in exports {
                self.symbols[sym_id].exported_by.push(idx);
            }
        }
    }

    /// After scanning, every symbol with no exporter is attached as an
    /// export of the synthetic UNDEFINED object (P9).
    pub fn gather_dangling_undefs(&mut self) {
        let undef = self.undefined_obj;
        for (id, sym) in self.symbols.iter_mut().enumerate() {
            if sym.exported_by.is_empty() {
                sym.exported_by.push(undef);
                self.graph[undef].exports.push((id, false));
            }
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjIdx> + '_ {
        self.graph.node_indices()
    }

    pub fn object_name(&self, idx: ObjIdx) -> String {
        self.graph[idx].display_name()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `lib[member]` into `(lib, member)`; returns `None` for a bare name.
pub fn split_archive_name(name: &str) -> Option<(&str, &str)> {
    let open = name.find('[')?;
    let close = name.rfind(']')?;
    if close < open {
        return None;
    }
    Some((&name[..open], &name[open + 1..close]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_archive_member_names() {
        assert_eq!(split_archive_name("libc.a[printf.o]"), Some(("libc.a", "printf.o")));
        assert_eq!(split_archive_name("printf.o"), None);
    }

    #[test]
    fn weak_export_does_not_override_nonweak() {
        let mut ctx = Context::new();
        ctx.intern_export("k", 'T', false, 4);
        ctx.intern_export("k", 'W', true, 8);
        let id = ctx.symbol_id("k").unwrap();
        assert_eq!(ctx.symbols[id].type_code, 'T');
        assert!(!ctx.symbols[id].weak);
    }

    #[test]
    fn nonweak_export_overrides_earlier_weak() {
        let mut ctx = Context::new();
        ctx.intern_export("k", 'W', true, 8);
        ctx.intern_export("k", 'T', false, 4);
        let id = ctx.symbol_id("k").unwrap();
        assert_eq!(ctx.symbols[id].type_code, 'T');
        assert!(!ctx.symbols[id].weak);
    }

    #[test]
    fn definition_overrides_undefined_placeholder() {
        let mut ctx = Context::new();
        ctx.intern_import("k");
        ctx.intern_export("k", 'T', false, 4);
        let id = ctx.symbol_id("k").unwrap();
        assert!(ctx.symbols[id].is_defined());
    }
}
