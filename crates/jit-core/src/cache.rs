//! Translation cache: code arena, bump buffer, address maps and link queue
//! for one guest CPU.

use std::collections::HashMap;

use crate::arena::{CodeArena, CodeBuffer, PAGE_SLOTS};
use crate::code::{CodePtr, HostOp};
use crate::deferred::DeferredLinks;
use crate::isa::Isa;
use crate::memmap::{BankView, CodeLocation, MapKey, MemMap};
use crate::native_map::{NativeAddressMap, NativeEntry};

/// Translation counters, for the runner and for tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub blocks: u64,
    pub instructions: u64,
    /// Instruction starts patched because their guest bytes were written.
    pub invalidations: u64,
    pub retranslations: u64,
    /// Retranslations that did not fit in place.
    pub relocations: u64,
}

/// Native address maps, created on first use per map key.
#[derive(Debug, Default)]
pub struct NativeMaps {
    maps: HashMap<MapKey, NativeAddressMap>,
    unit_shift: u32,
}

impl NativeMaps {
    #[must_use]
    pub fn new(unit_shift: u32) -> Self {
        Self {
            maps: HashMap::new(),
            unit_shift,
        }
    }

    #[must_use]
    pub fn get(&self, key: MapKey) -> Option<&NativeAddressMap> {
        self.maps.get(&key)
    }

    pub fn get_or_create(&mut self, key: MapKey, memmap: &MemMap) -> &mut NativeAddressMap {
        let unit_shift = self.unit_shift;
        self.maps.entry(key).or_insert_with(|| {
            let span = memmap
                .chunks()
                .get(key.chunk as usize)
                .map_or(0, |c| c.code_span());
            NativeAddressMap::new(span, unit_shift)
        })
    }

    #[must_use]
    pub fn entry(&self, loc: &CodeLocation) -> NativeEntry {
        self.get(loc.key)
            .map_or(NativeEntry::Untranslated, |m| m.entry(loc.offset))
    }

    #[must_use]
    pub fn lookup(&self, memmap: &MemMap, views: &[Option<BankView>], address: u32) -> Option<CodePtr> {
        let loc = memmap.code_location(address, views)?;
        self.get(loc.key)?.lookup(loc.offset)
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }

    /// Translated instruction starts across all maps.
    #[must_use]
    pub fn translated_count(&self) -> usize {
        self.maps.values().map(NativeAddressMap::translated_count).sum()
    }
}

/// All translation state of one guest CPU.
pub struct CodeCache<I: Isa> {
    pub(crate) arena: CodeArena<I::Op>,
    pub(crate) buffer: CodeBuffer,
    pub(crate) maps: NativeMaps,
    pub(crate) deferred: DeferredLinks,
    pub(crate) stats: CacheStats,
}

impl<I: Isa> CodeCache<I> {
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            arena: CodeArena::new(budget),
            buffer: CodeBuffer::new(PAGE_SLOTS),
            maps: NativeMaps::new(I::UNIT_SHIFT),
            deferred: DeferredLinks::new(),
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub const fn arena(&self) -> &CodeArena<I::Op> {
        &self.arena
    }

    #[must_use]
    pub const fn maps(&self) -> &NativeMaps {
        &self.maps
    }

    #[must_use]
    pub fn slot(&self, ptr: CodePtr) -> Option<&HostOp<I::Op>> {
        self.arena.get(ptr)
    }

    #[must_use]
    pub fn lookup(&self, memmap: &MemMap, views: &[Option<BankView>], address: u32) -> Option<CodePtr> {
        self.maps.lookup(memmap, views, address)
    }

    /// Follow a relocation jump from a map entry to the instruction's
    /// current prologue slot.
    #[must_use]
    pub fn instruction_head(&self, site: CodePtr) -> CodePtr {
        match self.arena.get(site) {
            Some(HostOp::Jump(dest)) if !dest.is_unlinked() => *dest,
            _ => site,
        }
    }

    /// React to a guest write of one byte at `address` in executable chunk
    /// `chunk`.
    ///
    /// The translated instruction covering the byte, if any, gets its entry
    /// slot replaced with a retranslate request. Returns whether a new
    /// invalidation happened; an instruction already awaiting
    /// retranslation is not counted twice.
    pub fn invalidate_write(&mut self, memmap: &MemMap, chunk: u16, address: u32) -> bool {
        let Some(mask) = memmap.chunks().get(chunk as usize).map(|c| c.mask) else {
            return false;
        };
        let key = MapKey { chunk, bank: None };
        let offset = address & mask;
        let Some(map) = self.maps.get(key) else {
            return false;
        };
        let Some(start) = map.instruction_start(offset) else {
            return false;
        };
        let Some(site) = map.lookup(start) else {
            return false;
        };
        let pc = address.wrapping_sub(offset - start);
        self.invalidate_site(site, pc)
    }

    /// Patch the entry slot at `site` so the next execution retranslates `pc`.
    pub(crate) fn invalidate_site(&mut self, site: CodePtr, pc: u32) -> bool {
        let pc = match self.arena.get(site) {
            Some(HostOp::Retranslate { .. }) => return false,
            Some(HostOp::Prologue { pc, .. } | HostOp::Breakpoint { pc, .. }) => *pc,
            _ => pc,
        };
        log::trace!("{}: invalidating translation of {pc:#06X}", I::NAME);
        self.arena.patch(site, HostOp::Retranslate { pc });
        self.stats.invalidations += 1;
        true
    }

    /// Force retranslation of every instruction starting in the given
    /// range of `chunk` (map offsets, end exclusive).
    pub fn invalidate_range(&mut self, chunk: u16, start: u32, end: u32) -> usize {
        let key = MapKey { chunk, bank: None };
        let Some(map) = self.maps.get(key) else {
            return 0;
        };
        let starts = map.instruction_starts(start, end);
        starts
            .into_iter()
            .filter(|&(offset, site)| self.invalidate_site(site, offset))
            .count()
    }

    /// Drop every translation and recycle the code regions.
    pub fn clear(&mut self) {
        self.maps.clear();
        self.deferred.clear();
        self.arena.mark_all_free();
        self.buffer.reset();
    }

    /// Resolve a patch site created by the emitter.
    pub(crate) fn link(&mut self, site: CodePtr, dest: CodePtr) {
        let op = match self.arena.get(site) {
            Some(HostOp::Jump(p)) if p.is_unlinked() => HostOp::Jump(dest),
            Some(HostOp::JumpIf(p)) if p.is_unlinked() => HostOp::JumpIf(dest),
            _ => return,
        };
        self.arena.patch(site, op);
    }

    /// Turn a patch site into a live lookup of `target`.
    pub(crate) fn link_live(&mut self, site: CodePtr, target: u32) {
        let op = match self.arena.get(site) {
            Some(HostOp::Jump(p)) if p.is_unlinked() => HostOp::Goto(target),
            Some(HostOp::JumpIf(p)) if p.is_unlinked() => HostOp::GotoIf(target),
            _ => return,
        };
        self.arena.patch(site, op);
    }

    pub(crate) fn patch(&mut self, site: CodePtr, op: HostOp<I::Op>) {
        self.arena.patch(site, op);
    }

    /// Rewrite a whole reserved instruction footprint in place.
    pub(crate) fn overwrite(&mut self, site: CodePtr, ops: &[HostOp<I::Op>]) {
        for (i, op) in ops.iter().enumerate() {
            self.arena.patch(site.add(i as u32), op.clone());
        }
    }
}
