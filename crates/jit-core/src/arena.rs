//! Code buffer allocator.
//!
//! Code regions are page-granular and never move once handed out. The
//! arena keeps a used list and a free list so a whole session's worth of
//! regions can be recycled in one step on teardown or ROM swap.

use crate::code::{CodePtr, HostOp};
use crate::error::JitError;

/// Allocation granularity, in slots.
pub const PAGE_SLOTS: usize = 4096;

/// Slots kept back at the end of every region for the chaining jump.
const TRAMPOLINE_SLOTS: usize = 1;

/// Owner of every code region of one guest CPU.
pub struct CodeArena<X> {
    regions: Vec<Vec<HostOp<X>>>,
    used: Vec<u32>,
    free: Vec<u32>,
    budget: usize,
    allocated: usize,
}

impl<X: Clone> CodeArena<X> {
    /// Create an arena that may hold at most `budget` slots in total.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            regions: Vec::new(),
            used: Vec::new(),
            free: Vec::new(),
            budget,
            allocated: 0,
        }
    }

    /// Hand out a region of at least `size` slots, rounded up to whole pages.
    ///
    /// Returns the region start and its actual size. A previously freed
    /// region that is large enough is reused before new memory is counted
    /// against the budget.
    pub fn alloc_code(&mut self, size: usize) -> Result<(CodePtr, usize), JitError> {
        let actual = size.max(1).div_ceil(PAGE_SLOTS) * PAGE_SLOTS;
        if let Some(pos) = self
            .free
            .iter()
            .position(|&id| self.regions[id as usize].len() >= actual)
        {
            let id = self.free.swap_remove(pos);
            let region = &mut self.regions[id as usize];
            region.fill(HostOp::Nop);
            self.used.push(id);
            return Ok((CodePtr::new(id, 0), region.len()));
        }
        if self.allocated + actual > self.budget {
            log::error!(
                "code budget exhausted: {} slots requested, {} of {} in use",
                actual,
                self.allocated,
                self.budget
            );
            return Err(JitError::CodeAllocation {
                requested: actual,
                allocated: self.allocated,
                budget: self.budget,
            });
        }
        let id = self.regions.len() as u32;
        self.regions.push(vec![HostOp::Nop; actual]);
        self.used.push(id);
        self.allocated += actual;
        Ok((CodePtr::new(id, 0), actual))
    }

    /// Move every in-use region to the free list.
    ///
    /// Memory is kept; the next allocations reuse it. Every pointer handed
    /// out before this call is dead afterwards.
    pub fn mark_all_free(&mut self) {
        self.free.append(&mut self.used);
    }

    /// Read the slot at `ptr`.
    #[must_use]
    pub fn get(&self, ptr: CodePtr) -> Option<&HostOp<X>> {
        self.regions
            .get(ptr.region() as usize)?
            .get(ptr.offset() as usize)
    }

    /// Size of the region containing `ptr`.
    #[must_use]
    pub fn region_len(&self, ptr: CodePtr) -> usize {
        self.regions.get(ptr.region() as usize).map_or(0, Vec::len)
    }

    /// Slots currently counted against the budget.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    #[must_use]
    pub fn regions_in_use(&self) -> usize {
        self.used.len()
    }

    /// Overwrite one slot of already-emitted code.
    ///
    /// Only instruction-start slots and unlinked jump placeholders are ever
    /// rewritten; [`CodeCache`](crate::CodeCache) is the only caller.
    pub(crate) fn patch(&mut self, ptr: CodePtr, op: HostOp<X>) {
        if let Some(slot) = self
            .regions
            .get_mut(ptr.region() as usize)
            .and_then(|r| r.get_mut(ptr.offset() as usize))
        {
            *slot = op;
        }
    }

    fn write(&mut self, ptr: CodePtr, ops: &[HostOp<X>]) {
        let region = &mut self.regions[ptr.region() as usize];
        let start = ptr.offset() as usize;
        region[start..start + ops.len()].clone_from_slice(ops);
    }
}

/// Bump cursor into the current code region.
///
/// When the space left cannot hold the requested code plus the chaining
/// jump, a new region is allocated and the old one ends with a jump into
/// it. Already-emitted code is never copied.
#[derive(Debug, Clone, Copy)]
pub struct CodeBuffer {
    cursor: CodePtr,
    limit: u32,
    default_size: usize,
}

impl CodeBuffer {
    #[must_use]
    pub const fn new(default_size: usize) -> Self {
        Self {
            cursor: CodePtr::UNLINKED,
            limit: 0,
            default_size,
        }
    }

    /// Next slot that will be written.
    #[must_use]
    pub const fn cursor(&self) -> CodePtr {
        self.cursor
    }

    /// Slots left before the trampoline reserve.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        if self.cursor.is_unlinked() {
            0
        } else {
            ((self.limit - self.cursor.offset()) as usize).saturating_sub(TRAMPOLINE_SLOTS)
        }
    }

    /// Make sure `slots` contiguous slots are available at the cursor.
    pub fn reserve<X: Clone>(
        &mut self,
        arena: &mut CodeArena<X>,
        slots: usize,
    ) -> Result<(), JitError> {
        if self.remaining() >= slots {
            return Ok(());
        }
        let (start, size) = arena.alloc_code(self.default_size.max(slots + TRAMPOLINE_SLOTS))?;
        if !self.cursor.is_unlinked() {
            arena.write(self.cursor, &[HostOp::Jump(start)]);
        }
        log::trace!("new code region {start:?} ({size} slots)");
        self.cursor = start;
        self.limit = size as u32;
        Ok(())
    }

    /// Append `ops` at the cursor and return where they start.
    pub fn emit<X: Clone>(
        &mut self,
        arena: &mut CodeArena<X>,
        ops: &[HostOp<X>],
    ) -> Result<CodePtr, JitError> {
        self.reserve(arena, ops.len())?;
        let at = self.cursor;
        arena.write(at, ops);
        self.cursor = at.add(ops.len() as u32);
        Ok(at)
    }

    /// Forget the current region; the next emit starts a fresh one.
    pub fn reset(&mut self) {
        self.cursor = CodePtr::UNLINKED;
        self.limit = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_round_up_to_pages() {
        let mut arena: CodeArena<()> = CodeArena::new(PAGE_SLOTS * 4);
        let (ptr, size) = arena.alloc_code(10).expect("alloc");
        assert_eq!(ptr, CodePtr::new(0, 0));
        assert_eq!(size, PAGE_SLOTS);
        let (_, size) = arena.alloc_code(PAGE_SLOTS + 1).expect("alloc");
        assert_eq!(size, PAGE_SLOTS * 2);
        assert_eq!(arena.allocated(), PAGE_SLOTS * 3);
    }

    #[test]
    fn exhausted_budget_is_an_error() {
        let mut arena: CodeArena<()> = CodeArena::new(PAGE_SLOTS);
        arena.alloc_code(1).expect("first page fits");
        let err = arena.alloc_code(1).expect_err("second page exceeds budget");
        assert!(matches!(err, JitError::CodeAllocation { .. }));
    }

    #[test]
    fn freed_regions_are_reused_without_growing() {
        let mut arena: CodeArena<()> = CodeArena::new(PAGE_SLOTS);
        let (first, _) = arena.alloc_code(1).expect("alloc");
        arena.mark_all_free();
        assert_eq!(arena.regions_in_use(), 0);
        let (again, _) = arena.alloc_code(1).expect("reuse");
        assert_eq!(first, again);
        assert_eq!(arena.allocated(), PAGE_SLOTS);
    }

    #[test]
    fn full_region_chains_with_a_jump() {
        let mut arena: CodeArena<u8> = CodeArena::new(PAGE_SLOTS * 2);
        let mut buf = CodeBuffer::new(PAGE_SLOTS);
        let fill = vec![HostOp::Guest(1u8); PAGE_SLOTS - 2];
        let first = buf.emit(&mut arena, &fill).expect("fits");
        assert_eq!(buf.remaining(), 1);

        let next = buf
            .emit(&mut arena, &[HostOp::Guest(2), HostOp::Guest(3)])
            .expect("chains");
        assert_eq!(next.region(), first.region() + 1);
        let tail = first.add((PAGE_SLOTS - 2) as u32);
        assert_eq!(arena.get(tail), Some(&HostOp::Jump(next)));
        // The first region's earlier code is untouched.
        assert_eq!(arena.get(first), Some(&HostOp::Guest(1)));
    }
}
