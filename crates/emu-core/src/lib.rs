//! Shared timing primitives for master-clock synchronized emulation.
//!
//! Every component counts time in master clock cycles. CPUs and
//! peripherals run at divided rates but all of them compare against the
//! same logical clock, so a component never has to convert another
//! component's counter before comparing it with its own.

mod clock;
mod observable;
mod peripheral;

pub use clock::{CYCLE_NEVER, Cycle, align_up, earliest};
pub use observable::{Observable, Value};
pub use peripheral::Peripheral;
