//! Component F — handle registry.
//!
//! A fixed-capacity pool of module handles, threaded into a load-order list
//! with a separate freelist, matching the original's `sopool[MAX_HANDLES]` +
//! freelist + `solist` design. Slots are addressed by index rather than raw
//! pointer (Design Note: "callers hold ids, not raw pointers").

use crate::symbol::ExportedSymbol;

pub const MAX_HANDLES: usize = 64;
pub const NAME_LEN: usize = 128;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct HandleFlags: u32 {
        const LINKED    = 0x1;
        const ERROR     = 0x2;
        const EXE       = 0x4;
        const PRELINKED = 0x8;
    }
}

/// Opaque identity returned to callers; never reused while the underlying
/// slot is live (the generation counter rules out ABA confusion across
/// unload/reload cycles of the same slot index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

pub(crate) struct ModuleSlot {
    pub name: String,
    pub flags: HandleFlags,
    pub refcount: u32,
    pub generation: u32,
    pub exports: Vec<ExportedSymbol>,
    // kept alive for the handle's lifetime so symbol addresses stay valid.
    pub(crate) _image: Option<Box<[u8]>>,
    pub(crate) _strtab: Option<Box<[u8]>>,
}

impl ModuleSlot {
    fn reset(name: String) -> Self {
        Self {
            name,
            flags: HandleFlags::empty(),
            refcount: 0,
            generation: 0,
            exports: Vec::new(),
            _image: None,
            _strtab: None,
        }
    }
}

/// Fixed pool + freelist + load-order list, per §4.F.
#[derive(Default)]
pub(crate) struct HandlePool {
    slots: Vec<Option<ModuleSlot>>,
    freelist: Vec<usize>,
    load_order: Vec<usize>,
    next_generation: u32,
}

impl HandlePool {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            freelist: Vec::new(),
            load_order: Vec::new(),
            next_generation: 1,
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<Handle> {
        self.load_order.iter().find_map(|&idx| {
            let slot = self.slots[idx].as_ref()?;
            (slot.name == name).then_some(Handle {
                slot: idx,
                generation: slot.generation,
            })
        })
    }

    pub fn get(&self, handle: Handle) -> Option<&ModuleSlot> {
        let slot = self.slots.get(handle.slot)?.as_ref()?;
        (slot.generation == handle.generation).then_some(slot)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ModuleSlot> {
        let generation = handle.generation;
        let slot = self.slots.get_mut(handle.slot)?.as_mut()?;
        (slot.generation == generation).then_some(slot)
    }

    /// Allocate a slot: freelist first, else bump-allocate into the pool.
    pub fn alloc(&mut self, name: String) -> Result<Handle, crate::error::ObjldError> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let idx = if let Some(idx) = self.freelist.pop() {
            self.slots[idx] = Some(ModuleSlot::reset(name));
            idx
        } else {
            if self.slots.len() >= MAX_HANDLES {
                return Err(crate::error::ObjldErrorKind::TooManyLibraries { max: MAX_HANDLES }.into());
            }
            let idx = self.slots.len();
            self.slots.push(Some(ModuleSlot::reset(name)));
            idx
        };
        self.slots[idx].as_mut().unwrap().generation = generation;
        self.load_order.push(idx);
        Ok(Handle {
            slot: idx,
            generation,
        })
    }

    /// Return a slot to the freelist and drop its out-of-line allocations.
    pub fn free(&mut self, handle: Handle) {
        if self.get(handle).is_some() {
            self.slots[handle.slot] = None;
            self.load_order.retain(|&i| i != handle.slot);
            self.freelist.push(handle.slot);
        }
    }

    pub fn live_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.load_order.iter().map(move |&idx| Handle {
            slot: idx,
            generation: self.slots[idx].as_ref().unwrap().generation,
        })
    }
}
