//! Trait for components advanced by the synchronization scheduler.

use crate::Cycle;

/// A peripheral clocked from the shared master clock.
///
/// The scheduler advances peripherals to wherever the active CPU has got
/// to. Peripherals never call back into the CPU cores; anything a CPU needs
/// to know ahead of time (the next interrupt, the next stall) is exposed
/// through [`next_event_cycle`](Peripheral::next_event_cycle).
pub trait Peripheral {
    /// Advance internal state up to (but not past) `cycle`.
    ///
    /// Calling with a cycle at or before [`current_cycle`](Peripheral::current_cycle)
    /// is a no-op.
    fn run_to(&mut self, cycle: Cycle);

    /// The master cycle this peripheral has been advanced to.
    fn current_cycle(&self) -> Cycle;

    /// Master cycle of the next externally visible event, or
    /// [`CYCLE_NEVER`](crate::CYCLE_NEVER) if none is scheduled. The
    /// scheduler places a sync point there.
    fn next_event_cycle(&self) -> Cycle;

    /// Subtract `deduction` from every internal cycle counter.
    ///
    /// Called at a frame boundary when counters approach overflow. Event
    /// cycles equal to `CYCLE_NEVER` must stay `CYCLE_NEVER`.
    fn adjust_cycles(&mut self, deduction: Cycle);
}
