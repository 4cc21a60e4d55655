//! 68000 run entry: autovectored interrupts, STOP and the translated-code loop.

use emu_core::{CYCLE_NEVER, Cycle, Observable, Value};
use jit_core::{
    BlockEnd, CacheStats, DebugHook, Emitter, Env, Flow, GuestBus, GuestContext, Isa, Jit,
    JitError, JitOptions, MemMap, Stop,
};
use serde::{Deserialize, Serialize};

use crate::decode::decode;
use crate::inst::{Instruction, Mnemonic, Size};
use crate::ops::{self, Op, vector};
use crate::registers::Registers;
use crate::timing::{INTERRUPT_CLOCKS, base_cycles};
use crate::translate::translate;

/// The 68000 instruction set, as seen by the translation backend.
#[derive(Debug)]
pub struct M68kIsa;

impl Isa for M68kIsa {
    type Regs = Registers;
    type Op = Op;
    type Inst = Instruction;

    const NAME: &'static str = "m68k";
    const UNIT_SHIFT: u32 = 1;
    const MAX_INST_BYTES: usize = 10;
    const MAX_INST_SLOTS: usize = 4;

    fn decode(bytes: &[u8]) -> Instruction {
        decode(bytes)
    }

    fn length(inst: &Instruction) -> u32 {
        u32::from(inst.len)
    }

    fn is_illegal(inst: &Instruction) -> bool {
        inst.mnemonic == Mnemonic::Invalid
    }

    fn base_cycles(inst: &Instruction) -> u32 {
        base_cycles(inst)
    }

    fn translate(inst: &Instruction, pc: u32, em: &mut Emitter<'_, Self>) -> BlockEnd {
        translate(inst, pc, em)
    }

    fn execute<B: GuestBus<Registers>>(op: &Op, env: &mut Env<'_, Self, B>) -> Flow {
        ops::execute(op, env)
    }
}

/// Machine side of the 68000 bus, plus the interrupt lines.
pub trait M68kBus: GuestBus<Registers> {
    /// Level on IPL0-2 once `ctx.int_cycle` is reached; 0 when idle.
    fn interrupt_level(&self) -> u8;

    /// The CPU is accepting the interrupt at `level`.
    fn interrupt_acknowledge(&mut self, level: u8, ctx: &mut GuestContext<Registers>);
}

/// Raw 68000 state for savestates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct M68kSnapshot {
    pub regs: Registers,
    pub current_cycle: Cycle,
    pub int_cycle: Cycle,
}

/// A 68000 executed through the translation cache.
pub struct M68k {
    pub ctx: GuestContext<Registers>,
    jit: Jit<M68kIsa>,
}

impl M68k {
    #[must_use]
    pub fn new(memmap: MemMap, options: JitOptions, clock_divider: u32) -> Self {
        Self {
            ctx: GuestContext::new(clock_divider, 0),
            jit: Jit::new(memmap, options),
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
    pub const fn jit(&self) -> &Jit<M68kIsa> {
        &self.jit
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.jit.stats()
    }

    /// Reset exception: supervisor mode, mask 7, SSP and PC from vectors 0 and 1.
    pub fn reset<B: GuestBus<Registers>>(&mut self, bus: &mut B) {
        self.ctx.regs = Registers::new();
        self.ctx.resume = None;
        self.ctx.int_cycle = CYCLE_NEVER;
        let (ssp, pc) = self.jit.with_env(&mut self.ctx, bus, |env| {
            (
                ops::read_mem(env, Size::Long, 0, None),
                ops::read_mem(env, Size::Long, 4, None),
            )
        });
        self.ctx.regs.ssp = ssp;
        self.ctx.regs.pc = pc;
        log::debug!("m68k: reset, ssp={ssp:#010X} pc={pc:#08X}");
    }

    /// Whether interrupt `level` is due now and not masked.
    #[must_use]
    pub fn interrupt_pending(&self, level: u8) -> bool {
        level != 0
            && self.ctx.current_cycle >= self.ctx.int_cycle
            && (level == 7 || level > self.ctx.regs.interrupt_mask())
    }

    /// Execute until `target`, taking interrupts at instruction boundaries.
    ///
    /// Returns early when a bus handler pulls `ctx.target_cycle` in, so the
    /// caller can bring the rest of the machine up to date, and once a stop
    /// has been requested.
    pub fn run_to<B: M68kBus>(&mut self, bus: &mut B, target: Cycle) -> Result<(), JitError> {
        while self.ctx.current_cycle < target {
            if self.ctx.stop_requested {
                return Ok(());
            }
            let level = bus.interrupt_level();
            if self.interrupt_pending(level) {
                self.take_interrupt(bus, level);
                continue;
            }
            let limit = if self.ctx.int_cycle > self.ctx.current_cycle {
                target.min(self.ctx.int_cycle)
            } else {
                target
            };
            if self.ctx.regs.stopped {
                self.ctx.idle_until(limit);
                continue;
            }
            self.ctx.target_cycle = limit;
            let pc = self.ctx.regs.pc;
            match self.jit.run(&mut self.ctx, bus, pc)? {
                Stop::CycleLimit { pc } => {
                    self.ctx.regs.pc = pc;
                    if self.ctx.target_cycle < limit {
                        return Ok(());
                    }
                }
                Stop::Halted { pc } => {
                    log::trace!("m68k: stopped, resume at {pc:#08X}");
                    self.ctx.regs.pc = pc;
                    self.ctx.regs.stopped = true;
                }
            }
        }
        Ok(())
    }

    fn take_interrupt<B: M68kBus>(&mut self, bus: &mut B, level: u8) {
        log::trace!("m68k: level {level} interrupt at cycle {}", self.ctx.current_cycle);
        self.ctx.regs.stopped = false;
        self.ctx.resume = None;
        self.ctx.int_cycle = CYCLE_NEVER;
        bus.interrupt_acknowledge(level, &mut self.ctx);
        let pc = self.ctx.regs.pc;
        let handler = self.jit.with_env(&mut self.ctx, bus, |env| {
            let handler = ops::enter_exception(env, vector::AUTOVECTOR + u32::from(level), pc);
            env.ctx.regs.set_interrupt_mask(level);
            handler
        });
        self.ctx.regs.pc = handler;
        self.ctx.add_clocks(INTERRUPT_CLOCKS);
        bus.interrupt_state_changed(&mut self.ctx);
    }

    /// Subtract `deduction` from every cycle value this CPU holds.
    pub fn adjust_cycles(&mut self, deduction: Cycle) {
        self.ctx.adjust_cycles(deduction);
    }

    pub fn set_debugger(&mut self, hook: Box<DebugHook<Registers>>) {
        self.jit.set_debugger(hook);
    }

    pub fn insert_breakpoint(&mut self, address: u32) {
        self.jit.insert_breakpoint(&mut self.ctx, address);
    }

    pub fn remove_breakpoint<B: GuestBus<Registers>>(&mut self, bus: &B, address: u32) {
        self.jit.remove_breakpoint(&mut self.ctx, bus, address);
    }

    /// A byte at `address` was written by someone other than this CPU.
    pub fn invalidate_write(&mut self, address: u32) -> bool {
        self.jit.invalidate_write(address)
    }

    pub fn invalidate_range(&mut self, chunk: u16, start: u32, end: u32) -> usize {
        self.jit.invalidate_range(chunk, start, end)
    }

    /// Drop every translation, as when the cartridge changes.
    pub fn flush_translations(&mut self) {
        self.jit.reset(&mut self.ctx);
    }

    #[must_use]
    pub fn snapshot(&self) -> M68kSnapshot {
        M68kSnapshot {
            regs: self.ctx.regs.clone(),
            current_cycle: self.ctx.current_cycle,
            int_cycle: self.ctx.int_cycle,
        }
    }

    pub fn restore(&mut self, snapshot: &M68kSnapshot) {
        self.ctx.regs = snapshot.regs.clone();
        self.ctx.current_cycle = snapshot.current_cycle;
        self.ctx.target_cycle = snapshot.current_cycle;
        self.ctx.int_cycle = snapshot.int_cycle;
        self.ctx.resume = None;
    }
}

const QUERY_PATHS: &[&str] = &[
    "pc", "sr", "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "usp", "ssp", "stopped", "cycle",
];

impl Observable for M68k {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.ctx.regs;
        let indexed = |prefix: char| {
            path.strip_prefix(prefix)
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|&n| n < 8)
        };
        Some(match path {
            "pc" => r.pc.into(),
            "sr" => r.sr.into(),
            "usp" => r.usp.into(),
            "ssp" => r.ssp.into(),
            "stopped" => r.stopped.into(),
            "cycle" => self.ctx.current_cycle.into(),
            _ => {
                if let Some(n) = indexed('d') {
                    r.d[n].into()
                } else {
                    r.a(indexed('a')?).into()
                }
            }
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
