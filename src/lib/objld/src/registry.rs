//! Component G — process symbol registry, plus the `Loader` façade that ties
//! every component (A–G) together behind the §5 nestable mutex.

use std::{cell::RefCell, path::PathBuf};

use parking_lot::ReentrantMutex;
use tracing::{debug, error, info};

use crate::{
    elfview, handle,
    error::{ObjldError, ObjldErrorKind},
    reloc, section, symbol,
};

pub use handle::Handle;

bitflags::bitflags! {
    /// Mode bits accepted by `Loader::open`; named after the historical
    /// `RTLD_*` constants this API stands in for.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct OpenFlags: u32 {
        const NOW    = 0;
        const LAZY   = 1;
        const LOCAL  = 0;
        const GLOBAL = 2;
    }
}

/// Sentinel handle values accepted by `Loader::symbol`, per §6.
#[derive(Clone, Copy, Debug)]
pub enum SymbolTarget {
    Handle(Handle),
    /// `RTLD_DEFAULT` — search the process registry only.
    Default,
    /// `RTLD_NEXT` — also searches the process registry only, per spec §6.
    Next,
}

struct ProcSym {
    name: String,
    address: u32,
}

/// Process-wide symbol registry. Newest-registered wins ties, matching an
/// intrusive linked list that is always prepended to and scanned from the
/// head.
#[derive(Default)]
pub(crate) struct Registry {
    syms: Vec<ProcSym>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self { syms: Vec::new() }
    }

    /// Ingest a `sym.map`-format buffer: columns 0-7 hex address, column 8
    /// separator, columns 11.. name.
    pub(crate) fn ingest_map(&mut self, text: &str) {
        for line in text.lines() {
            if line.len() < 12 {
                continue;
            }
            let Ok(addr) = u32::from_str_radix(&line[0..8], 16) else {
                continue;
            };
            let name = line[11..].trim_end().to_string();
            if name.is_empty() {
                continue;
            }
            self.syms.insert(0, ProcSym { name, address: addr });
        }
    }

    pub(crate) fn insert_runtime(&mut self, name: impl Into<String>, address: u32) {
        self.syms.insert(
            0,
            ProcSym {
                name: name.into(),
                address,
            },
        );
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<u32> {
        self.syms.iter().find(|s| s.name == name).map(|s| s.address)
    }
}

struct LoaderState {
    pool: handle::HandlePool,
    registry: Registry,
    last_error: Option<ObjldError>,
    search_paths: Vec<PathBuf>,
}

/// The loader. Every public method takes the single process-wide,
/// nestable lock for its entire body, per §5.
pub struct Loader {
    state: ReentrantMutex<RefCell<LoaderState>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(LoaderState {
                pool: handle::HandlePool::new(),
                registry: Registry::new(),
                last_error: None,
                search_paths: vec![PathBuf::from(".")],
            })),
        }
    }

    pub fn set_search_paths(&self, paths: Vec<PathBuf>) {
        let guard = self.state.lock();
        guard.borrow_mut().search_paths = paths;
    }

    /// Ingest a process symbol map file, per the §4.G format.
    pub fn ingest_symbol_map(&self, text: &str) {
        let guard = self.state.lock();
        guard.borrow_mut().registry.ingest_map(text);
    }

    /// Register a single process symbol directly, bypassing the textual
    /// format (see SPEC_FULL §4.G).
    pub fn insert_runtime_symbol(&self, name: impl Into<String>, address: u32) {
        let guard = self.state.lock();
        guard.borrow_mut().registry.insert_runtime(name, address);
    }

    fn set_error(&self, state: &mut LoaderState, err: ObjldError) {
        error!(error = %err.kind, "loader operation failed");
        state.last_error = Some(err);
    }

    /// §6 `open`. Resolves an existing resident handle by name first; only
    /// runs the load pipeline (A→F) for a name not already present.
    pub fn open(&self, name: &str, _flags: OpenFlags) -> Option<Handle> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        if let Some(h) = state.pool.find_by_name(name) {
            let slot = state.pool.get_mut(h).expect("handle just found");
            if slot.flags.contains(handle::HandleFlags::ERROR) {
                return None;
            }
            slot.refcount += 1;
            return Some(h);
        }

        match self.load_pipeline(&mut state, name) {
            Ok(h) => {
                state.last_error = None;
                Some(h)
            }
            Err(e) => {
                self.set_error(&mut state, e);
                None
            }
        }
    }

    fn load_pipeline(&self, state: &mut LoaderState, name: &str) -> Result<Handle, ObjldError> {
        let path = elfview::resolve(name, &state.search_paths)?;
        let obj = elfview::ObjectFile::open(&path)?;
        let elf = obj.parse()?;
        let sections = section::load_sections(&obj.bytes, &elf)?;

        let mut syms = symbol::parse_symtab(&sections);
        let exports = match symbol::resolve_symbols(&sections, &mut syms, &state.registry) {
            Ok(exports) => exports,
            Err(e) => return Err(e),
        };
        reloc::apply_relocations(&sections, &syms)?;

        let handle = state.pool.alloc(name.to_string())?;
        let slot = state.pool.get_mut(handle).expect("just allocated");
        slot.exports = exports;
        slot.flags |= handle::HandleFlags::LINKED;
        slot._image = Some(sections.image);
        slot._strtab = sections.strtab;
        info!(name, exports = slot.exports.len(), "module loaded");
        Ok(handle)
    }

    /// §6 `symbol`.
    pub fn symbol(&self, target: SymbolTarget, name: &str) -> Option<u32> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if name.is_empty() {
            let err: ObjldError = ObjldErrorKind::BadSymbolName.into();
            self.set_error(&mut state, err);
            return None;
        }
        let result = match target {
            SymbolTarget::Default | SymbolTarget::Next => state.registry.lookup(name),
            SymbolTarget::Handle(h) => {
                let Some(slot) = state.pool.get(h) else {
                    let err: ObjldError = ObjldErrorKind::InvalidHandle.into();
                    self.set_error(&mut state, err);
                    return None;
                };
                slot.exports.iter().find(|e| e.name == name).map(|e| e.address)
            }
        };
        if result.is_none() {
            let err: ObjldError = ObjldErrorKind::SymbolNotFound {
                name: name.to_string(),
            }
            .into();
            self.set_error(&mut state, err);
        }
        result
    }

    /// The corrected global lookup described in SPEC_FULL's Open Question
    /// resolution: process registry first, then every live handle's
    /// exported list in load order, first hit wins.
    pub fn lookup_global(&self, name: &str) -> Option<u32> {
        let guard = self.state.lock();
        let state = guard.borrow();
        if let Some(addr) = state.registry.lookup(name) {
            return Some(addr);
        }
        for h in state.pool.live_handles() {
            if let Some(slot) = state.pool.get(h) {
                if let Some(export) = slot.exports.iter().find(|e| e.name == name) {
                    return Some(export.address);
                }
            }
        }
        None
    }

    /// §6 `close`. Always succeeds; only the 1→0 refcount transition
    /// actually frees the slot.
    pub fn close(&self, handle: Handle) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let Some(slot) = state.pool.get_mut(handle) else {
            return;
        };
        if slot.refcount > 0 {
            slot.refcount -= 1;
        }
        if slot.refcount == 0 {
            debug!(handle = handle.slot, "unloading module");
            state.pool.free(handle);
        }
    }

    /// §6 `last-error`; resets the stored error to `Success` (`None`).
    pub fn last_error(&self) -> Option<String> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.last_error.take().map(|e| e.kind.to_string())
    }
}
