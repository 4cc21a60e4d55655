//! Cycle scheduler.
//!
//! The 68000 is the master. It runs until its `target_cycle`, then the
//! scheduler brings every other component up to the same master-clock
//! cycle and picks the next target: the earliest of the next unmasked
//! interrupt, the next event any peripheral has scheduled, the end of the
//! frame, one sync quantum, or an external stop.
//! A stop requested through either CPU's context ends the run at the next
//! sync, which the request itself brings forward to the current cycle.
//! Handlers that touch shared state sync on demand, so no component ever
//! observes another's state from the future.

use emu_core::{CYCLE_NEVER, Cycle, Peripheral, earliest};

use crate::Genesis;
use crate::bus::{Hardware, M68kContext, MainBus};
use crate::config::{MCLKS_PER_68K, Z80_INT_PULSE};
use crate::error::MachineError;
use crate::z80_bus::Z80Bus;

/// 68K clocks between DRAM refresh cycles.
const REFRESH_INTERVAL: Cycle = 128;
/// 68K clocks each refresh steals.
const REFRESH_DELAY: Cycle = 2;
const REFRESH_PERIOD: Cycle = REFRESH_INTERVAL * MCLKS_PER_68K;

/// Cycle counters are rebased once they pass this point, keeping this much
/// history below the current cycle.
const ADJUST_BUFFER: Cycle = 8 * sega_vdp::MCLKS_LINE * sega_vdp::LINES_PAL as Cycle;
const MAX_NO_ADJUST: Cycle = Cycle::MAX - ADJUST_BUFFER;

/// Refresh stall owed after `elapsed` more master clocks, and the counter
/// left over.
const fn refresh(counter: Cycle, elapsed: Cycle) -> (Cycle, Cycle) {
    let total = counter + elapsed;
    let stall = total / REFRESH_PERIOD * REFRESH_DELAY * MCLKS_PER_68K;
    (stall, total % REFRESH_PERIOD)
}

/// Amount to subtract from every counter when a frame ends at `now`.
fn cycle_deduction(now: Cycle) -> Option<Cycle> {
    (now > MAX_NO_ADJUST).then(|| now - ADJUST_BUFFER)
}

impl Hardware {
    /// Earliest event a peripheral has scheduled after `now`. Events that
    /// are already due belong to the interrupt logic.
    pub(crate) fn next_event(&self, now: Cycle) -> Cycle {
        let peripherals: [&dyn Peripheral; 4] = [&self.vdp, &self.ym, &self.psg, &self.io];
        peripherals
            .into_iter()
            .map(|p| p.next_event_cycle())
            .filter(|&at| at > now)
            .fold(CYCLE_NEVER, earliest)
    }
}

impl MainBus {
    /// Charge the refresh stalls accumulated since the last sync.
    pub(crate) fn charge_refresh(&mut self, ctx: &mut M68kContext) {
        let elapsed = ctx.current_cycle.saturating_sub(self.last_sync);
        let (stall, counter) = refresh(self.refresh_counter, elapsed);
        ctx.current_cycle += stall;
        self.refresh_counter = counter;
        self.last_sync = ctx.current_cycle;
    }

    /// Account for elapsed time without stalling, as while the 68K holds
    /// the bus for an external access.
    pub(crate) fn skip_refresh(&mut self, ctx: &M68kContext) {
        let elapsed = ctx.current_cycle.saturating_sub(self.last_sync);
        self.refresh_counter = refresh(self.refresh_counter, elapsed).1;
        self.last_sync = ctx.current_cycle;
    }

    /// Run the Z80 up to `target`. While `locked_until` is ahead, its
    /// accesses to 68K space wait for it.
    pub(crate) fn sync_z80(&mut self, ctx: &mut M68kContext, target: Cycle, locked_until: Cycle) {
        if self.z80.current_cycle() >= target {
            return;
        }
        if !self.z80_enabled || self.busreq || self.z80_reset {
            self.z80.idle_to(target);
            return;
        }
        let mut bus = Z80Bus::new(&mut self.hw, &mut self.dirty, locked_until);
        let result = self.z80.run_to(&mut bus, target);
        let stall = bus.m68k_stall;
        if let Err(err) = result {
            log::error!("z80: {err}");
            self.fault.get_or_insert(err);
            self.return_requested = true;
            ctx.request_return();
        }
        if stall > 0 {
            log::trace!("m68k: {stall} clocks lost to Z80 bank accesses");
            ctx.current_cycle += stall;
        }
        // The machine stops as a whole.
        if self.z80.ctx.stop_requested {
            self.z80.ctx.stop_requested = false;
            ctx.request_stop();
        }
        // Z80 writes to work RAM may have hit translated 68K code.
        if !self.dirty.is_empty() {
            self.return_requested = true;
            ctx.request_return();
        }
    }

    /// Assert the Z80's /INT once per frame, at the vertical interrupt.
    fn arm_z80_interrupt(&mut self) {
        let frame = self.hw.vdp.frame();
        if self.z80_int_frame == Some(frame) {
            return;
        }
        let at = self.hw.vdp.next_vint_z80();
        if at != CYCLE_NEVER {
            self.z80.assert_int(at, Z80_INT_PULSE);
            self.z80_int_frame = Some(frame);
        }
    }

    /// Bring every component up to the 68K's cycle and pick the next sync point.
    pub(crate) fn sync_components(&mut self, ctx: &mut M68kContext) {
        self.charge_refresh(ctx);
        let now = ctx.current_cycle;
        self.sync_z80(ctx, now, 0);
        self.hw.ym.run_to(now);
        self.hw.psg.run_to(now);
        self.hw.vdp.run_to(now);
        self.hw.io.run_to(now);

        let frame = self.hw.vdp.frame();
        if frame != self.frame {
            self.frame = frame;
            if let Some(deduction) = cycle_deduction(ctx.current_cycle) {
                self.adjust_cycles(ctx, deduction);
            }
        }
        self.arm_z80_interrupt();

        let now = ctx.current_cycle;
        let quantum = now.saturating_add(self.sync_interval);
        ctx.sync_cycle = [self.hw.vdp.frame_end(), quantum, self.hw.next_event(now), self.stop_cycle]
            .into_iter()
            .fold(CYCLE_NEVER, earliest);
        self.adjust_int_cycle(ctx);
    }

    /// Subtract `deduction` from every cycle counter in the machine.
    pub(crate) fn adjust_cycles(&mut self, ctx: &mut M68kContext, deduction: Cycle) {
        log::debug!("rebasing cycle counters by {deduction}");
        ctx.adjust_cycles(deduction);
        self.z80.adjust_cycles(deduction);
        self.hw.vdp.adjust_cycles(deduction);
        self.hw.psg.adjust_cycles(deduction);
        self.hw.ym.adjust_cycles(deduction);
        self.hw.io.adjust_cycles(deduction);
        self.last_sync = self.last_sync.saturating_sub(deduction);
        if self.stop_cycle != CYCLE_NEVER {
            self.stop_cycle = self.stop_cycle.saturating_sub(deduction);
        }
    }

    /// Recompute the next 68K interrupt and the cycle the 68K may run to.
    pub(crate) fn adjust_int_cycle(&mut self, ctx: &mut M68kContext) {
        let mask = ctx.regs.interrupt_mask();
        let mut int_cycle = CYCLE_NEVER;
        let mut level = 0;
        if mask < 6 {
            let vint = self.hw.vdp.next_vint();
            if vint != CYCLE_NEVER {
                int_cycle = vint;
                level = 6;
            }
        }
        if mask < 4 {
            let hint = self.hw.vdp.next_hint();
            if hint < int_cycle {
                int_cycle = hint;
                level = 4;
            }
        }
        if mask < 2 && self.hw.vdp.ext_int_enabled() {
            let ext = self.hw.io.next_interrupt();
            if ext < int_cycle {
                int_cycle = ext;
                level = 2;
            }
        }
        ctx.int_cycle = int_cycle;
        self.int_level = level;

        let now = ctx.current_cycle;
        let mut target = earliest(int_cycle, ctx.sync_cycle).max(now);
        if target == int_cycle && int_cycle > now {
            let lead = int_cycle - now;
            let latency = self.int_latency;
            if lead > latency.prev1 {
                target = int_cycle - latency.prev1;
            } else if lead > latency.prev2 {
                target = int_cycle - latency.prev2;
            }
        }
        if self.return_requested {
            target = now;
        }
        ctx.target_cycle = target;
    }
}

impl Genesis {
    /// Run until `stop`, or until the VDP finishes a frame when `until_frame`.
    pub(crate) fn run_until(&mut self, stop: Cycle, until_frame: bool) -> Result<(), MachineError> {
        self.bus.stop_cycle = stop;
        let result = self.run_loop(until_frame);
        self.bus.stop_cycle = CYCLE_NEVER;
        result
    }

    fn run_loop(&mut self, until_frame: bool) -> Result<(), MachineError> {
        loop {
            self.bus.sync_components(&mut self.m68k.ctx);
            self.drain_z80_writes();
            if let Some(err) = self.bus.fault.take() {
                return Err(err.into());
            }
            let frame_done = self.bus.hw.vdp.take_frame_done();
            if self.m68k.ctx.stop_requested {
                self.m68k.ctx.stop_requested = false;
                log::debug!("stop requested at cycle {}", self.m68k.ctx.current_cycle);
                return Ok(());
            }
            if (until_frame && frame_done) || self.m68k.ctx.current_cycle >= self.bus.stop_cycle {
                return Ok(());
            }
            if self.bus.return_requested {
                self.bus.return_requested = false;
                self.bus.adjust_int_cycle(&mut self.m68k.ctx);
            }
            let now = self.m68k.ctx.current_cycle;
            let target = self.m68k.ctx.target_cycle.max(now + 1);
            self.m68k.run_to(&mut self.bus, target).inspect_err(|err| {
                log::error!("m68k: {err}");
            })?;
        }
    }

    /// Invalidate 68K translations over work RAM the Z80 wrote.
    fn drain_z80_writes(&mut self) {
        for address in self.bus.dirty.drain(..) {
            self.m68k.invalidate_write(address);
        }
    }
}
