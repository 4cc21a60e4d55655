//! Per-CPU execution context shared by translated code and the scheduler.

use std::collections::BTreeSet;

use emu_core::{CYCLE_NEVER, Cycle};

use crate::code::CodePtr;
use crate::memmap::BankView;

/// Everything translated code reads or writes besides guest memory.
///
/// `R` is the guest register file. Cycle fields are in master clocks.
#[derive(Debug, Clone)]
pub struct GuestContext<R> {
    pub regs: R,
    /// Master cycle reached by this CPU.
    pub current_cycle: Cycle,
    /// Translated code returns to the scheduler at the first instruction
    /// boundary at or after this cycle.
    pub target_cycle: Cycle,
    /// Next cycle at which peripherals must be brought up to date.
    pub sync_cycle: Cycle,
    /// Cycle of the next interrupt this CPU will accept, or [`CYCLE_NEVER`].
    pub int_cycle: Cycle,
    /// Master clocks per CPU clock.
    pub clock_divider: u32,
    /// Current backing of each banked window.
    pub mem_pointers: Vec<Option<BankView>>,
    /// Where translated code resumes on the next run, if it was cut short.
    pub resume: Option<CodePtr>,
    /// Result of the last guest condition test, consumed by conditional jumps.
    pub branch_taken: bool,
    /// Guest addresses with a debugger breakpoint.
    pub breakpoints: BTreeSet<u32>,
    /// The owner of this CPU leaves its run loop at the next instruction
    /// boundary and clears the flag.
    pub stop_requested: bool,
    /// The debugger is called at the next instruction boundary.
    pub debug_requested: bool,
}

impl<R: Default> GuestContext<R> {
    #[must_use]
    pub fn new(clock_divider: u32, bank_slots: usize) -> Self {
        Self {
            regs: R::default(),
            current_cycle: 0,
            target_cycle: 0,
            sync_cycle: CYCLE_NEVER,
            int_cycle: CYCLE_NEVER,
            clock_divider,
            mem_pointers: vec![None; bank_slots],
            resume: None,
            branch_taken: false,
            breakpoints: BTreeSet::new(),
            stop_requested: false,
            debug_requested: false,
        }
    }
}

impl<R> GuestContext<R> {
    /// Charge `clocks` CPU clocks.
    pub fn add_clocks(&mut self, clocks: u32) {
        self.current_cycle += clocks * self.clock_divider;
    }

    /// Subtract `deduction` from every cycle counter, leaving "never" alone.
    pub fn adjust_cycles(&mut self, deduction: Cycle) {
        let adjust = |c: Cycle| {
            if c == CYCLE_NEVER {
                c
            } else {
                c.saturating_sub(deduction)
            }
        };
        self.current_cycle = adjust(self.current_cycle);
        self.target_cycle = adjust(self.target_cycle);
        self.sync_cycle = adjust(self.sync_cycle);
        self.int_cycle = adjust(self.int_cycle);
    }

    /// Return to the scheduler at the next instruction boundary.
    pub fn request_return(&mut self) {
        self.target_cycle = self.current_cycle;
    }

    /// Stop running at the next instruction boundary, as a debugger or a
    /// savestate request does.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
        self.request_return();
    }

    /// Enter the debugger at the next instruction boundary.
    pub fn request_debugger(&mut self) {
        self.debug_requested = true;
        self.request_return();
    }

    /// Advance to `cycle` in whole CPU clocks, as an idle CPU would.
    pub fn idle_until(&mut self, cycle: Cycle) {
        if self.current_cycle < cycle {
            let clocks = (cycle - self.current_cycle).div_ceil(self.clock_divider);
            self.add_clocks(clocks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_keeps_never() {
        let mut ctx: GuestContext<()> = GuestContext::new(7, 0);
        ctx.current_cycle = 1000;
        ctx.target_cycle = 1400;
        ctx.adjust_cycles(700);
        assert_eq!(ctx.current_cycle, 300);
        assert_eq!(ctx.target_cycle, 700);
        assert_eq!(ctx.int_cycle, CYCLE_NEVER);
    }

    #[test]
    fn stop_request_pulls_target_in() {
        let mut ctx: GuestContext<()> = GuestContext::new(7, 0);
        ctx.current_cycle = 700;
        ctx.target_cycle = 7000;
        ctx.request_stop();
        assert!(ctx.stop_requested);
        assert_eq!(ctx.target_cycle, 700);
    }

    #[test]
    fn idle_rounds_to_cpu_clocks() {
        let mut ctx: GuestContext<()> = GuestContext::new(15, 0);
        ctx.idle_until(31);
        assert_eq!(ctx.current_cycle, 45);
        ctx.idle_until(10);
        assert_eq!(ctx.current_cycle, 45);
    }
}
