//! I/O chip: version register and the three controller port registers.
//!
//! Each port has a data and a control register. Control bits 0-6 select
//! which pins the console drives (1 = output); bit 7 enables the TH
//! interrupt. Pins left as inputs read whatever an attached device drives,
//! pulled high when nothing is attached.

use emu_core::{CYCLE_NEVER, Cycle, Observable, Peripheral, Value};
use serde::{Deserialize, Serialize};

use crate::config::Region;

pub const PORT_COUNT: usize = 3;

/// TH pin.
pub const TH: u8 = 0x40;
/// Control register: a falling TH input raises a level-2 interrupt.
pub const CTRL_TH_INT: u8 = 0x80;
const PINS: u8 = 0x7F;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoPorts {
    version: u8,
    data: [u8; PORT_COUNT],
    ctrl: [u8; PORT_COUNT],
    /// Pin levels driven by attached devices.
    input: [u8; PORT_COUNT],
    /// Cycle of a pending external interrupt.
    int_cycle: Cycle,
    cycles: Cycle,
}

impl IoPorts {
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            version: region.version_bits(),
            data: [0; PORT_COUNT],
            ctrl: [0; PORT_COUNT],
            input: [PINS; PORT_COUNT],
            int_cycle: CYCLE_NEVER,
            cycles: 0,
        }
    }

    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Output pins come from the data register, inputs from the device.
    #[must_use]
    pub fn read_data(&self, port: usize) -> u8 {
        let out = self.ctrl[port] & PINS;
        (self.data[port] & (out | 0x80)) | (self.input[port] & !out & PINS)
    }

    pub fn write_data(&mut self, port: usize, value: u8) {
        self.data[port] = value;
    }

    #[must_use]
    pub fn control(&self, port: usize) -> u8 {
        self.ctrl[port]
    }

    pub fn write_control(&mut self, port: usize, value: u8) {
        self.ctrl[port] = value;
    }

    /// A device on `port` drives `lines` from `cycle` on.
    pub fn drive(&mut self, port: usize, lines: u8, cycle: Cycle) {
        let old = self.input[port];
        self.input[port] = lines & PINS;
        let ctrl = self.ctrl[port];
        let th_falls = old & TH != 0 && lines & TH == 0;
        if th_falls && ctrl & TH == 0 && ctrl & CTRL_TH_INT != 0 {
            let at = cycle.max(self.cycles);
            log::trace!("io: TH interrupt on port {port} at cycle {at}");
            self.int_cycle = self.int_cycle.min(at);
        }
    }

    /// Cycle of the pending external interrupt, or `CYCLE_NEVER`.
    #[must_use]
    pub const fn next_interrupt(&self) -> Cycle {
        self.int_cycle
    }

    pub fn acknowledge(&mut self) {
        self.int_cycle = CYCLE_NEVER;
    }
}

impl Peripheral for IoPorts {
    fn run_to(&mut self, cycle: Cycle) {
        self.cycles = self.cycles.max(cycle);
    }

    fn current_cycle(&self) -> Cycle {
        self.cycles
    }

    fn next_event_cycle(&self) -> Cycle {
        self.int_cycle
    }

    fn adjust_cycles(&mut self, deduction: Cycle) {
        self.cycles = self.cycles.saturating_sub(deduction);
        if self.int_cycle != CYCLE_NEVER {
            self.int_cycle = self.int_cycle.saturating_sub(deduction);
        }
    }
}

const QUERY_PATHS: &[&str] = &[
    "version", "data1", "data2", "data3", "ctrl1", "ctrl2", "ctrl3", "int_cycle",
];

impl Observable for IoPorts {
    fn query(&self, path: &str) -> Option<Value> {
        let port = |prefix: &str| {
            path.strip_prefix(prefix)
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| (1..=PORT_COUNT).contains(n))
                .map(|n| n - 1)
        };
        if path == "version" {
            return Some(self.version.into());
        }
        if path == "int_cycle" {
            return Some(self.int_cycle.into());
        }
        if let Some(n) = port("data") {
            return Some(self.read_data(n).into());
        }
        port("ctrl").map(|n| self.ctrl[n].into())
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Region::Ntsc, 0xA0)]
    #[case(Region::Pal, 0xE0)]
    fn version_register_reflects_region(#[case] region: Region, #[case] version: u8) {
        assert_eq!(IoPorts::new(region).version(), version);
    }

    #[test]
    fn unattached_inputs_read_high() {
        let mut io = IoPorts::new(Region::Ntsc);
        io.write_control(0, TH);
        io.write_data(0, 0x00);
        assert_eq!(io.read_data(0), 0x3F);
        io.write_data(0, TH);
        assert_eq!(io.read_data(0), 0x7F);
    }

    #[test]
    fn th_falling_edge_raises_interrupt_when_enabled() {
        let mut io = IoPorts::new(Region::Ntsc);
        io.drive(1, 0x00, 100);
        assert_eq!(io.next_interrupt(), CYCLE_NEVER, "interrupt disabled");
        io.drive(1, PINS, 150);
        io.write_control(1, CTRL_TH_INT);
        io.run_to(200);
        io.drive(1, PINS & !TH, 180);
        assert_eq!(io.next_interrupt(), 200, "never before the port's clock");
        io.acknowledge();
        assert_eq!(io.next_event_cycle(), CYCLE_NEVER);
    }

    #[test]
    fn th_as_output_never_interrupts() {
        let mut io = IoPorts::new(Region::Ntsc);
        io.write_control(0, CTRL_TH_INT | TH);
        io.drive(0, 0, 10);
        assert_eq!(io.next_interrupt(), CYCLE_NEVER);
    }

    #[test]
    fn adjust_keeps_never() {
        let mut io = IoPorts::new(Region::Ntsc);
        io.run_to(1000);
        io.adjust_cycles(400);
        assert_eq!(io.current_cycle(), 600);
        assert_eq!(io.next_interrupt(), CYCLE_NEVER);
    }
}
