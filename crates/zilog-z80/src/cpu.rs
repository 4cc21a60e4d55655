//! Z80 run entry: interrupts, HALT and the translated-code loop.

use emu_core::{CYCLE_NEVER, Cycle, Observable, Value};
use jit_core::{
    BlockEnd, CacheStats, DebugHook, Emitter, Env, Flow, GuestBus, GuestContext, Isa, Jit,
    JitError, JitOptions, MemMap, Stop,
};
use serde::{Deserialize, Serialize};

use crate::decode::decode;
use crate::inst::Instruction;
use crate::ops::{self, Op};
use crate::registers::Registers;
use crate::translate::translate;

/// The Z80 instruction set, as seen by the translation backend.
#[derive(Debug)]
pub struct Z80Isa;

impl Isa for Z80Isa {
    type Regs = Registers;
    type Op = Op;
    type Inst = Instruction;

    const NAME: &'static str = "z80";
    const UNIT_SHIFT: u32 = 0;
    const MAX_INST_BYTES: usize = 4;
    const MAX_INST_SLOTS: usize = 4;

    fn decode(bytes: &[u8]) -> Instruction {
        decode(bytes)
    }

    fn length(inst: &Instruction) -> u32 {
        u32::from(inst.len)
    }

    fn is_illegal(_inst: &Instruction) -> bool {
        false
    }

    fn base_cycles(inst: &Instruction) -> u32 {
        u32::from(inst.cycles)
    }

    fn translate(inst: &Instruction, pc: u32, em: &mut Emitter<'_, Self>) -> BlockEnd {
        translate(inst, pc, em)
    }

    fn execute<B: GuestBus<Registers>>(op: &Op, env: &mut Env<'_, Self, B>) -> Flow {
        ops::execute(op, env)
    }
}

/// T-states to accept a maskable interrupt in modes 0 and 1 (RST 38h).
const INT_IM1_CLOCKS: u32 = 13;
const INT_IM2_CLOCKS: u32 = 19;
const NMI_CLOCKS: u32 = 11;

/// Raw Z80 state for savestates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Z80Snapshot {
    pub regs: Registers,
    pub current_cycle: Cycle,
    pub int_cycle: Cycle,
    pub int_end: Cycle,
    pub nmi_cycle: Cycle,
}

/// A Z80 executed through the translation cache.
pub struct Z80 {
    pub ctx: GuestContext<Registers>,
    jit: Jit<Z80Isa>,
    /// End of the /INT pulse that started at `ctx.int_cycle`.
    pub int_end: Cycle,
    /// Pending NMI edge.
    pub nmi_cycle: Cycle,
}

impl Z80 {
    /// `clock_divider` is master clocks per T-state; `bank_slots` the number
    /// of banked windows in `memmap`.
    #[must_use]
    pub fn new(memmap: MemMap, options: JitOptions, clock_divider: u32, bank_slots: usize) -> Self {
        let mut ctx = GuestContext::<Registers>::new(clock_divider, bank_slots);
        ctx.regs.int_enable_cycle = 0;
        Self {
            ctx,
            jit: Jit::new(memmap, options),
            int_end: CYCLE_NEVER,
            nmi_cycle: CYCLE_NEVER,
        }
    }

    #[must_use]
    pub const fn regs(&self) -> &Registers {
        &self.ctx.regs
    }

    #[must_use]
    pub const fn current_cycle(&self) -> Cycle {
        self.ctx.current_cycle
    }

    #[must_use]
    pub const fn jit(&self) -> &Jit<Z80Isa> {
        &self.jit
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.jit.stats()
    }

    /// Reset line: registers to power-on state. Translations stay valid.
    pub fn reset(&mut self) {
        self.ctx.regs = Registers {
            int_enable_cycle: 0,
            ..Registers::default()
        };
        self.ctx.resume = None;
        self.ctx.int_cycle = CYCLE_NEVER;
        self.nmi_cycle = CYCLE_NEVER;
    }

    /// Assert /INT from `start` for `pulse` master clocks.
    pub fn assert_int(&mut self, start: Cycle, pulse: Cycle) {
        self.ctx.int_cycle = start;
        self.int_end = start.saturating_add(pulse);
    }

    pub fn trigger_nmi(&mut self, cycle: Cycle) {
        self.nmi_cycle = cycle;
    }

    /// Cycle at which a maskable interrupt will be accepted, if the current
    /// pulse can still be seen.
    #[must_use]
    pub fn interrupt_cycle(&self) -> Cycle {
        let regs = &self.ctx.regs;
        if !regs.iff1 || self.ctx.int_cycle == CYCLE_NEVER || self.ctx.current_cycle >= self.int_end {
            return CYCLE_NEVER;
        }
        let at = self.ctx.int_cycle.max(regs.int_enable_cycle);
        if at >= self.int_end { CYCLE_NEVER } else { at }
    }

    /// Let time pass without executing, as while the bus is granted away
    /// or reset is held.
    pub fn idle_to(&mut self, cycle: Cycle) {
        self.ctx.idle_until(cycle);
    }

    /// Execute until `target`, taking interrupts at instruction boundaries.
    /// A stop request ends the run early.
    pub fn run_to<B: GuestBus<Registers>>(&mut self, bus: &mut B, target: Cycle) -> Result<(), JitError> {
        while self.ctx.current_cycle < target {
            if self.ctx.stop_requested {
                return Ok(());
            }
            if self.ctx.current_cycle >= self.nmi_cycle {
                self.take_nmi(bus);
                continue;
            }
            let int_at = self.interrupt_cycle();
            if self.ctx.current_cycle >= int_at {
                self.take_interrupt(bus);
                continue;
            }
            let limit = target.min(int_at).min(self.nmi_cycle);
            if self.ctx.regs.halted {
                let step = 4 * self.ctx.clock_divider;
                self.ctx.current_cycle += (limit - self.ctx.current_cycle).div_ceil(step) * step;
                continue;
            }
            self.ctx.target_cycle = limit;
            let pc = u32::from(self.ctx.regs.pc);
            match self.jit.run(&mut self.ctx, bus, pc)? {
                Stop::CycleLimit { pc } => self.ctx.regs.pc = pc as u16,
                Stop::Halted { pc } => {
                    log::trace!("z80: halted, resume at {pc:#06X}");
                    self.ctx.regs.pc = pc as u16;
                    self.ctx.regs.halted = true;
                }
            }
        }
        Ok(())
    }

    fn enter<B: GuestBus<Registers>>(&mut self, bus: &mut B, vector: Option<u16>, clocks: u32) {
        self.ctx.regs.halted = false;
        self.ctx.resume = None;
        let ret = self.ctx.regs.pc;
        let im2_table = u16::from_be_bytes([self.ctx.regs.i, 0xFF]);
        let pc = self.jit.with_env(&mut self.ctx, bus, |env| {
            ops::push(env, ret);
            match vector {
                Some(vector) => vector,
                None => ops::read_word(env, im2_table),
            }
        });
        self.ctx.regs.pc = pc;
        self.ctx.add_clocks(clocks);
    }

    fn take_interrupt<B: GuestBus<Registers>>(&mut self, bus: &mut B) {
        self.ctx.regs.iff1 = false;
        self.ctx.regs.iff2 = false;
        self.ctx.int_cycle = CYCLE_NEVER;
        let im = self.ctx.regs.im;
        log::trace!("z80: interrupt (im {im}) at cycle {}", self.ctx.current_cycle);
        match im {
            2 => self.enter(bus, None, INT_IM2_CLOCKS),
            // Mode 0 executes the byte on the data bus, which reads as RST 38h.
            _ => self.enter(bus, Some(0x38), INT_IM1_CLOCKS),
        }
        bus.interrupt_state_changed(&mut self.ctx);
    }

    fn take_nmi<B: GuestBus<Registers>>(&mut self, bus: &mut B) {
        self.ctx.regs.iff1 = false;
        self.nmi_cycle = CYCLE_NEVER;
        log::trace!("z80: NMI at cycle {}", self.ctx.current_cycle);
        self.enter(bus, Some(0x66), NMI_CLOCKS);
        bus.interrupt_state_changed(&mut self.ctx);
    }

    /// Subtract `deduction` from every cycle value this CPU holds.
    pub fn adjust_cycles(&mut self, deduction: Cycle) {
        self.ctx.adjust_cycles(deduction);
        let adjust = |c: Cycle| if c == CYCLE_NEVER { c } else { c.saturating_sub(deduction) };
        self.int_end = adjust(self.int_end);
        self.nmi_cycle = adjust(self.nmi_cycle);
        self.ctx.regs.int_enable_cycle = adjust(self.ctx.regs.int_enable_cycle);
    }

    pub fn set_debugger(&mut self, hook: Box<DebugHook<Registers>>) {
        self.jit.set_debugger(hook);
    }

    pub fn insert_breakpoint(&mut self, address: u16) {
        self.jit.insert_breakpoint(&mut self.ctx, u32::from(address));
    }

    pub fn remove_breakpoint<B: GuestBus<Registers>>(&mut self, bus: &B, address: u16) {
        self.jit.remove_breakpoint(&mut self.ctx, bus, u32::from(address));
    }

    /// A byte at `address` was written by someone other than this CPU.
    pub fn invalidate_write(&mut self, address: u16) -> bool {
        self.jit.invalidate_write(u32::from(address))
    }

    pub fn invalidate_range(&mut self, chunk: u16, start: u32, end: u32) -> usize {
        self.jit.invalidate_range(chunk, start, end)
    }

    /// Drop every translation, as when the cartridge changes.
    pub fn flush_translations(&mut self) {
        self.jit.reset(&mut self.ctx);
    }

    #[must_use]
    pub fn snapshot(&self) -> Z80Snapshot {
        Z80Snapshot {
            regs: self.ctx.regs.clone(),
            current_cycle: self.ctx.current_cycle,
            int_cycle: self.ctx.int_cycle,
            int_end: self.int_end,
            nmi_cycle: self.nmi_cycle,
        }
    }

    pub fn restore(&mut self, snapshot: &Z80Snapshot) {
        self.ctx.regs = snapshot.regs.clone();
        self.ctx.current_cycle = snapshot.current_cycle;
        self.ctx.target_cycle = snapshot.current_cycle;
        self.ctx.int_cycle = snapshot.int_cycle;
        self.ctx.resume = None;
        self.int_end = snapshot.int_end;
        self.nmi_cycle = snapshot.nmi_cycle;
    }
}

const QUERY_PATHS: &[&str] = &[
    "pc", "sp", "a", "f", "bc", "de", "hl", "ix", "iy", "i", "iff1", "im", "halted", "cycle",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.ctx.regs;
        Some(match path {
            "pc" => r.pc.into(),
            "sp" => r.sp.into(),
            "a" => r.a.into(),
            "f" => r.f.into(),
            "bc" => r.bc().into(),
            "de" => r.de().into(),
            "hl" => r.hl().into(),
            "ix" => r.ix.into(),
            "iy" => r.iy.into(),
            "i" => r.i.into(),
            "iff1" => r.iff1.into(),
            "im" => r.im.into(),
            "halted" => r.halted.into(),
            "cycle" => self.ctx.current_cycle.into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
