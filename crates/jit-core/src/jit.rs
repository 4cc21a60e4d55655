//! Translation driver and run entry for one guest CPU.

use crate::bus::{Env, GuestBus};
use crate::cache::{CacheStats, CodeCache};
use crate::code::{CodePtr, HostOp, PATCH_FOOTPRINT};
use crate::context::GuestContext;
use crate::error::JitError;
use crate::exec::{NativeExit, run_native};
use crate::isa::{BlockEnd, Emitter, Isa};
use crate::memmap::{CodeLocation, MemMap};
use crate::native_map::NativeEntry;

/// Debugger entry: called with the context and the guest address it stopped at.
pub type DebugHook<R> = dyn FnMut(&mut GuestContext<R>, u32);

/// Sizing of the translation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitOptions {
    /// Maximum slots of translated code.
    pub code_budget: usize,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            code_budget: 1 << 22,
        }
    }
}

/// Why a run returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// `target_cycle` reached; `pc` is the next instruction to execute.
    CycleLimit { pc: u32 },
    /// The guest stopped itself; it continues at `pc` once woken.
    Halted { pc: u32 },
}

/// One translated instruction, before placement.
struct Translated<X> {
    ops: Vec<HostOp<X>>,
    links: Vec<(usize, u32)>,
    guest_len: u32,
    end: BlockEnd,
}

/// Translation cache plus the memory map it was built against.
pub struct Jit<I: Isa> {
    cache: CodeCache<I>,
    memmap: MemMap,
    debugger: Option<Box<DebugHook<I::Regs>>>,
}

impl<I: Isa> Jit<I> {
    #[must_use]
    pub fn new(memmap: MemMap, options: JitOptions) -> Self {
        Self {
            cache: CodeCache::new(options.code_budget),
            memmap,
            debugger: None,
        }
    }

    #[must_use]
    pub const fn memmap(&self) -> &MemMap {
        &self.memmap
    }

    #[must_use]
    pub const fn cache(&self) -> &CodeCache<I> {
        &self.cache
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.cache.stats
    }

    /// Register the callback breakpoints and debugger requests call into.
    pub fn set_debugger(&mut self, hook: Box<DebugHook<I::Regs>>) {
        self.debugger = Some(hook);
    }

    fn enter_debugger(&mut self, ctx: &mut GuestContext<I::Regs>, pc: u32) {
        match self.debugger.as_mut() {
            Some(hook) => hook(ctx, pc),
            None => log::debug!("{}: no debugger attached at {pc:#08X}", I::NAME),
        }
    }

    /// Translated code for `address`, if there is any.
    #[must_use]
    pub fn lookup(&self, ctx: &GuestContext<I::Regs>, address: u32) -> Option<CodePtr> {
        self.cache.lookup(&self.memmap, &ctx.mem_pointers, address)
    }

    /// Native code for `address`, translating it first if needed.
    pub fn native_address<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
        address: u32,
    ) -> Result<CodePtr, JitError> {
        if let Some(ptr) = self.lookup(ctx, address) {
            return Ok(ptr);
        }
        self.translate(ctx, bus, address)
    }

    /// Translate the block at `address` and everything its direct branches
    /// reach, then return the code for `address`.
    pub fn translate<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
        address: u32,
    ) -> Result<CodePtr, JitError> {
        let address = address & self.memmap.address_mask();
        self.translate_block(ctx, bus, address)?;
        self.drain_deferred(ctx, bus)?;
        self.lookup(ctx, address).ok_or_else(|| self.unmapped(address))
    }

    fn unmapped(&self, address: u32) -> JitError {
        log::error!("{}: no native code possible for {address:#08X}", I::NAME);
        JitError::UnmappedAddress {
            cpu: I::NAME,
            address,
        }
    }

    fn location(&self, ctx: &GuestContext<I::Regs>, address: u32) -> Result<CodeLocation, JitError> {
        self.memmap
            .code_location(address, &ctx.mem_pointers)
            .ok_or_else(|| self.unmapped(address))
    }

    /// Instruction bytes at `address`. Bytes past the end of executable
    /// memory read as zero.
    fn fetch<B: GuestBus<I::Regs>>(&self, ctx: &GuestContext<I::Regs>, bus: &B, address: u32) -> Vec<u8> {
        (0..I::MAX_INST_BYTES as u32)
            .map(|i| {
                self.memmap
                    .code_location(address.wrapping_add(i), &ctx.mem_pointers)
                    .and_then(|loc| bus.buffer(loc.buffer).get(loc.index as usize).copied())
                    .unwrap_or(0)
            })
            .collect()
    }

    fn emit_instruction<B: GuestBus<I::Regs>>(
        &self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
        pc: u32,
    ) -> Translated<I::Op> {
        let bytes = self.fetch(ctx, bus, pc);
        let inst = I::decode(&bytes);
        let guest_len = I::length(&inst);
        let cycles = I::base_cycles(&inst) * ctx.clock_divider;
        let mut em = Emitter::new(&self.cache, &self.memmap, &ctx.mem_pointers, ctx.clock_divider);
        em.ops.push(if ctx.breakpoints.contains(&pc) {
            HostOp::Breakpoint { pc, cycles }
        } else {
            HostOp::Prologue { pc, cycles }
        });
        if let Some(handler) = self.memmap.fetch_handler(pc) {
            em.ops.push(HostOp::BankedFetch {
                handler,
                pc,
                bytes: guest_len,
            });
        }
        let mut end = if I::is_illegal(&inst) {
            let raw = &bytes[..(guest_len as usize).clamp(1, bytes.len())];
            log::error!("{}: illegal instruction at {pc:#08X}: {raw:02X?}", I::NAME);
            em.ops.push(HostOp::Illegal { pc });
            BlockEnd::Terminal
        } else {
            I::translate(&inst, pc, &mut em)
        };
        // Banked code may switch its own bank; the next instruction is looked
        // up against the view current when it runs.
        if end == BlockEnd::Continue && self.memmap.is_banked(pc) {
            em.jump(pc.wrapping_add(guest_len) & self.memmap.address_mask());
            end = BlockEnd::Terminal;
        }
        log::trace!("{}: {pc:#08X} {inst:?} -> {} slots", I::NAME, em.ops.len());
        Translated {
            ops: em.ops,
            links: em.links,
            guest_len,
            end,
        }
    }

    fn check_footprint(pc: u32, reserved: usize) -> Result<(), JitError> {
        if reserved < PATCH_FOOTPRINT {
            return Err(JitError::FootprintTooSmall {
                cpu: I::NAME,
                address: pc,
                reserved,
                needed: PATCH_FOOTPRINT,
            });
        }
        Ok(())
    }

    /// Place a translated instruction, record it, and queue its links.
    fn commit(&mut self, loc: &CodeLocation, pc: u32, t: &Translated<I::Op>) -> Result<CodePtr, JitError> {
        Self::check_footprint(pc, t.ops.len())?;
        let cache = &mut self.cache;
        cache
            .buffer
            .reserve(&mut cache.arena, t.ops.len().max(I::MAX_INST_SLOTS))?;
        let ptr = cache.buffer.emit(&mut cache.arena, &t.ops)?;
        cache
            .maps
            .get_or_create(loc.key, &self.memmap)
            .record(loc.offset, ptr, t.guest_len as u8, t.ops.len() as u16);
        for &(slot, target) in &t.links {
            cache.deferred.defer(target, ptr.add(slot as u32));
        }
        cache.stats.instructions += 1;
        Ok(ptr)
    }

    /// Translate straight-line code from `start` up to the first block
    /// terminator or the first already-translated instruction.
    fn translate_block<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
        start: u32,
    ) -> Result<(), JitError> {
        let mask = self.memmap.address_mask();
        let mut pc = start;
        log::debug!("{}: translating block at {start:#08X}", I::NAME);
        self.cache.stats.blocks += 1;
        loop {
            let loc = self.location(ctx, pc)?;
            if let Some(existing) = self.cache.maps.get(loc.key).and_then(|m| m.lookup(loc.offset)) {
                if pc != start {
                    let cache = &mut self.cache;
                    cache.buffer.emit(&mut cache.arena, &[HostOp::Jump(existing)])?;
                }
                return Ok(());
            }
            let t = self.emit_instruction(ctx, bus, pc);
            self.commit(&loc, pc, &t)?;
            if t.end == BlockEnd::Terminal {
                return Ok(());
            }
            pc = pc.wrapping_add(t.guest_len) & mask;
        }
    }

    /// Patch every queued link whose target has code, translating targets
    /// until the queue is empty.
    fn drain_deferred<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
    ) -> Result<(), JitError> {
        loop {
            let memmap = &self.memmap;
            let maps = &self.cache.maps;
            let patches = self
                .cache
                .deferred
                .resolve(|target| maps.lookup(memmap, &ctx.mem_pointers, target));
            for (site, dest) in patches {
                self.cache.link(site, dest);
            }
            let Some(target) = self.cache.deferred.next_target() else {
                return Ok(());
            };
            if self.memmap.code_location(target, &ctx.mem_pointers).is_none() {
                log::warn!("{}: branch target {target:#08X} is not executable, linking live", I::NAME);
                for site in self.cache.deferred.take_target(target) {
                    self.cache.link_live(site, target);
                }
                continue;
            }
            self.translate_block(ctx, bus, target)?;
        }
    }

    /// Re-emit the instruction at `pc` whose entry slot `site` was
    /// invalidated. Returns where execution continues.
    pub fn retranslate<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &GuestContext<I::Regs>,
        bus: &B,
        pc: u32,
        site: CodePtr,
    ) -> Result<CodePtr, JitError> {
        let loc = self.location(ctx, pc)?;
        let NativeEntry::At { ptr, native_len, .. } = self.cache.maps.entry(&loc) else {
            return self.translate(ctx, bus, pc);
        };
        if ptr != site {
            return self.translate(ctx, bus, pc);
        }
        self.cache.stats.retranslations += 1;
        let mut t = self.emit_instruction(ctx, bus, pc);
        let native_len = usize::from(native_len);
        let next_pc = pc.wrapping_add(t.guest_len) & self.memmap.address_mask();
        let successor_inline = self.lookup(ctx, next_pc) == Some(site.add(native_len as u32));

        let falls_through = t.end == BlockEnd::Continue;
        let in_place = t.ops.len() + usize::from(falls_through && !successor_inline) <= native_len;
        if falls_through && (!in_place || !successor_inline) {
            let mut em = Emitter::new(&self.cache, &self.memmap, &ctx.mem_pointers, ctx.clock_divider);
            em.jump(next_pc);
            let base = t.ops.len();
            t.links.extend(em.links.iter().map(|&(slot, target)| (slot + base, target)));
            t.ops.extend(em.ops);
        }

        let placed = if in_place {
            Self::check_footprint(pc, native_len)?;
            let mut ops = t.ops.clone();
            ops.resize(native_len, HostOp::Nop);
            self.cache.overwrite(site, &ops);
            for &(slot, target) in &t.links {
                self.cache.deferred.defer(target, site.add(slot as u32));
            }
            log::debug!("{}: retranslated {pc:#08X} in place", I::NAME);
            site
        } else {
            let cache = &mut self.cache;
            let dest = cache.buffer.emit(&mut cache.arena, &t.ops)?;
            for &(slot, target) in &t.links {
                cache.deferred.defer(target, dest.add(slot as u32));
            }
            cache.patch(site, HostOp::Jump(dest));
            cache.stats.relocations += 1;
            log::debug!("{}: retranslated {pc:#08X} into new block {dest:?}", I::NAME);
            dest
        };
        self.cache
            .maps
            .get_or_create(loc.key, &self.memmap)
            .record(loc.offset, site, t.guest_len as u8, native_len as u16);
        self.drain_deferred(ctx, bus)?;
        Ok(placed)
    }

    /// Execute translated code from `pc` (or from where the previous run
    /// stopped) until the cycle limit or a guest halt.
    ///
    /// A pending debugger request stops the run at the first instruction
    /// boundary and calls the debugger there.
    pub fn run<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &mut GuestContext<I::Regs>,
        bus: &mut B,
        pc: u32,
    ) -> Result<Stop, JitError> {
        if ctx.debug_requested {
            ctx.request_return();
        }
        let mut ip = match ctx.resume.take() {
            Some(ptr) => ptr,
            None => self.native_address(ctx, bus, pc)?,
        };
        loop {
            let exit = {
                let mut env = Env {
                    ctx: &mut *ctx,
                    bus: &mut *bus,
                    memmap: &self.memmap,
                    cache: &mut self.cache,
                };
                run_native(&mut env, ip)
            };
            match exit {
                NativeExit::CycleLimit { pc, site } => {
                    ctx.resume = Some(site);
                    if ctx.debug_requested {
                        ctx.debug_requested = false;
                        self.enter_debugger(ctx, pc);
                    }
                    return Ok(Stop::CycleLimit { pc });
                }
                NativeExit::Halt { resume } => return Ok(Stop::Halted { pc: resume }),
                NativeExit::Untranslated { pc } => ip = self.translate(ctx, bus, pc)?,
                NativeExit::Retranslate { pc, site } => ip = self.retranslate(ctx, bus, pc, site)?,
                NativeExit::Breakpoint { pc, resume } => {
                    self.enter_debugger(ctx, pc);
                    ip = resume;
                }
                NativeExit::Illegal { pc } => {
                    let bytes = self.fetch(ctx, bus, pc);
                    let len = I::length(&I::decode(&bytes)) as usize;
                    return Err(JitError::IllegalInstruction {
                        cpu: I::NAME,
                        address: pc,
                        bytes: bytes[..len.clamp(1, bytes.len())].to_vec(),
                    });
                }
            }
        }
    }

    /// Set a breakpoint at `address`, patching existing code if the
    /// instruction is already translated.
    pub fn insert_breakpoint(&mut self, ctx: &mut GuestContext<I::Regs>, address: u32) {
        ctx.breakpoints.insert(address);
        if let Some(site) = self.lookup(ctx, address) {
            let head = self.cache.instruction_head(site);
            if let Some(&HostOp::Prologue { pc, cycles }) = self.cache.slot(head) {
                self.cache.patch(head, HostOp::Breakpoint { pc, cycles });
            }
        }
    }

    /// Remove a breakpoint. The restored prologue is derived again from the
    /// guest instruction rather than remembered.
    pub fn remove_breakpoint<B: GuestBus<I::Regs>>(
        &mut self,
        ctx: &mut GuestContext<I::Regs>,
        bus: &B,
        address: u32,
    ) {
        ctx.breakpoints.remove(&address);
        if let Some(site) = self.lookup(ctx, address) {
            let head = self.cache.instruction_head(site);
            if let Some(&HostOp::Breakpoint { pc, .. }) = self.cache.slot(head) {
                let inst = I::decode(&self.fetch(ctx, bus, pc));
                let cycles = I::base_cycles(&inst) * ctx.clock_divider;
                self.cache.patch(head, HostOp::Prologue { pc, cycles });
            }
        }
    }

    /// Invalidate translations covering a byte written from outside this
    /// CPU's own translated code (another CPU, DMA, the debugger).
    pub fn invalidate_write(&mut self, address: u32) -> bool {
        let address = address & self.memmap.address_mask();
        match self.memmap.find(address) {
            Some((chunk, _)) => self.cache.invalidate_write(&self.memmap, chunk as u16, address),
            None => false,
        }
    }

    /// Force retranslation of everything translated from `chunk` offsets
    /// `start..end`, as after restoring memory contents.
    pub fn invalidate_range(&mut self, chunk: u16, start: u32, end: u32) -> usize {
        self.cache.invalidate_range(chunk, start, end)
    }

    /// Run `f` against guest memory from outside translated code, as
    /// interrupt entry does when it stacks the return address. Writes
    /// invalidate translations exactly as stores from guest code do.
    pub fn with_env<B: GuestBus<I::Regs>, T>(
        &mut self,
        ctx: &mut GuestContext<I::Regs>,
        bus: &mut B,
        f: impl FnOnce(&mut Env<'_, I, B>) -> T,
    ) -> T {
        let mut env = Env {
            ctx,
            bus,
            memmap: &self.memmap,
            cache: &mut self.cache,
        };
        f(&mut env)
    }

    /// Discard all translated code, keeping the memory for reuse.
    pub fn reset(&mut self, ctx: &mut GuestContext<I::Regs>) {
        self.cache.clear();
        ctx.resume = None;
    }
}
