//! Yamaha YM2612 (OPN2): register file, timers A and B, status and busy.
//!
//! FM synthesis is not modelled. What is here is what software can
//! observe through the status port: the two timers that sound drivers
//! poll for tempo, and the busy flag raised after each data write.
//!
//! # Ports
//!
//! | Port | Write              | Read   |
//! |------|--------------------|--------|
//! | 0    | Part 1 address     | Status |
//! | 1    | Part 1 data        | Status |
//! | 2    | Part 2 address     | Status |
//! | 3    | Part 2 data        | Status |
//!
//! # Timing
//!
//! The chip is clocked from the master clock divided by 7. Timer A counts
//! once per output sample (144 chip clocks) and overflows at 1024; timer B
//! counts once per 16 samples and overflows at 256. Both reload from their
//! period registers on overflow.

use emu_core::{CYCLE_NEVER, Cycle, Observable, Peripheral, Value};
use serde::{Deserialize, Serialize};

pub const REG_TIMER_A_HIGH: u8 = 0x24;
pub const REG_TIMER_A_LOW: u8 = 0x25;
pub const REG_TIMER_B: u8 = 0x26;
pub const REG_TIMER_CTRL: u8 = 0x27;

const TIMER_A_ENABLE: u8 = 0x01;
const TIMER_B_ENABLE: u8 = 0x02;
const TIMER_A_OVERFLOW_ENABLE: u8 = 0x04;
const TIMER_B_OVERFLOW_ENABLE: u8 = 0x08;
const TIMER_A_RESET: u8 = 0x10;
const TIMER_B_RESET: u8 = 0x20;

pub const STATUS_TIMER_A: u8 = 0x01;
pub const STATUS_TIMER_B: u8 = 0x02;
pub const STATUS_BUSY: u8 = 0x80;

/// Chip clocks per output sample.
const CLOCKS_PER_SAMPLE: u32 = 144;
/// Timer B prescaler, in samples.
const TIMER_B_DIVIDER: u32 = 16;
/// Chip clocks the busy flag stays up after a data write.
const BUSY_CLOCKS: u32 = 17;

const TIMER_A_LIMIT: u16 = 1024;
const TIMER_B_LIMIT: u16 = 256;

/// First register each part decodes.
const PART1_FIRST: u8 = 0x21;
const PART2_FIRST: u8 = 0x30;
const LAST_REG: u8 = 0xB6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Selected {
    part: usize,
    reg: u8,
}

/// YM2612 timers and register file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ym2612 {
    /// Register files for part 1 and part 2, indexed by register number.
    regs: [Vec<u8>; 2],
    selected: Option<Selected>,
    status: u8,
    busy_until: Cycle,
    timer_a: u16,
    timer_b: u16,
    /// Chip clocks into the current sample.
    prescaler: u32,
    /// Samples into the current timer B tick.
    timer_b_prescaler: u32,
    cycles: Cycle,
    /// Master clocks per chip clock.
    clock_divider: u32,
}

impl Ym2612 {
    #[must_use]
    pub fn new(clock_divider: u32) -> Self {
        Self {
            regs: [vec![0; 256], vec![0; 256]],
            selected: None,
            status: 0,
            busy_until: 0,
            timer_a: 0,
            timer_b: 0,
            prescaler: 0,
            timer_b_prescaler: 0,
            cycles: 0,
            clock_divider,
        }
    }

    /// /IC line: registers, timers and status cleared; the clock keeps running.
    pub fn reset(&mut self) {
        let cycles = self.cycles;
        *self = Self::new(self.clock_divider);
        self.cycles = cycles;
    }

    /// Register `reg` of `part` (0 or 1).
    #[must_use]
    pub fn register(&self, part: usize, reg: u8) -> u8 {
        self.regs[part][usize::from(reg)]
    }

    /// Write to port 0-3.
    pub fn write(&mut self, port: u8, value: u8) {
        let part = usize::from(port >> 1 & 1);
        if port & 1 == 0 {
            let first = if part == 0 { PART1_FIRST } else { PART2_FIRST };
            self.selected = (first..=LAST_REG).contains(&value).then_some(Selected { part, reg: value });
            return;
        }
        if self.status & STATUS_BUSY != 0 {
            log::trace!("ym2612: write {value:#04X} while busy dropped");
            return;
        }
        let Some(Selected { part, reg }) = self.selected.take() else {
            return;
        };
        self.write_register(part, reg, value);
        self.status |= STATUS_BUSY;
        self.busy_until = self.cycles + BUSY_CLOCKS * self.clock_divider;
    }

    fn write_register(&mut self, part: usize, reg: u8, value: u8) {
        if part == 0 && reg == REG_TIMER_CTRL {
            let old = self.regs[0][usize::from(REG_TIMER_CTRL)];
            if value & TIMER_A_ENABLE != 0 && old & TIMER_A_ENABLE == 0 {
                self.timer_a = self.timer_a_period();
            }
            if value & TIMER_B_ENABLE != 0 && old & TIMER_B_ENABLE == 0 {
                self.timer_b = self.timer_b_period();
                self.timer_b_prescaler = 0;
            }
            if value & TIMER_A_RESET != 0 {
                self.status &= !STATUS_TIMER_A;
            }
            if value & TIMER_B_RESET != 0 {
                self.status &= !STATUS_TIMER_B;
            }
        }
        self.regs[part][usize::from(reg)] = value;
    }

    fn timer_a_period(&self) -> u16 {
        u16::from(self.regs[0][usize::from(REG_TIMER_A_HIGH)]) << 2
            | u16::from(self.regs[0][usize::from(REG_TIMER_A_LOW)] & 0x3)
    }

    fn timer_b_period(&self) -> u16 {
        u16::from(self.regs[0][usize::from(REG_TIMER_B)])
    }

    fn control(&self) -> u8 {
        self.regs[0][usize::from(REG_TIMER_CTRL)]
    }

    /// Status read from any port.
    #[must_use]
    pub const fn read_status(&self) -> u8 {
        self.status
    }

    /// One output sample: step the timers.
    fn sample(&mut self) {
        let ctrl = self.control();
        if ctrl & TIMER_A_ENABLE != 0 {
            self.timer_a += 1;
            if self.timer_a >= TIMER_A_LIMIT {
                self.timer_a = self.timer_a_period();
                if ctrl & TIMER_A_OVERFLOW_ENABLE != 0 {
                    self.status |= STATUS_TIMER_A;
                }
            }
        }
        self.timer_b_prescaler += 1;
        if self.timer_b_prescaler == TIMER_B_DIVIDER {
            self.timer_b_prescaler = 0;
            if ctrl & TIMER_B_ENABLE != 0 {
                self.timer_b += 1;
                if self.timer_b >= TIMER_B_LIMIT {
                    self.timer_b = self.timer_b_period();
                    if ctrl & TIMER_B_OVERFLOW_ENABLE != 0 {
                        self.status |= STATUS_TIMER_B;
                    }
                }
            }
        }
    }

    /// Master cycle at which timer A next sets its status flag.
    fn timer_a_event(&self) -> Cycle {
        let ctrl = self.control();
        if ctrl & TIMER_A_ENABLE == 0 || ctrl & TIMER_A_OVERFLOW_ENABLE == 0 {
            return CYCLE_NEVER;
        }
        let samples = u32::from(TIMER_A_LIMIT - self.timer_a);
        let clocks = samples * CLOCKS_PER_SAMPLE - self.prescaler;
        self.cycles.saturating_add(clocks * self.clock_divider)
    }

    fn timer_b_event(&self) -> Cycle {
        let ctrl = self.control();
        if ctrl & TIMER_B_ENABLE == 0 || ctrl & TIMER_B_OVERFLOW_ENABLE == 0 {
            return CYCLE_NEVER;
        }
        let ticks = u32::from(TIMER_B_LIMIT - self.timer_b);
        let samples = ticks * TIMER_B_DIVIDER - self.timer_b_prescaler;
        let clocks = samples * CLOCKS_PER_SAMPLE - self.prescaler;
        self.cycles.saturating_add(clocks * self.clock_divider)
    }
}

impl Peripheral for Ym2612 {
    fn run_to(&mut self, cycle: Cycle) {
        while self.cycles < cycle {
            self.cycles += self.clock_divider;
            self.prescaler += 1;
            if self.prescaler == CLOCKS_PER_SAMPLE {
                self.prescaler = 0;
                self.sample();
            }
        }
        if self.status & STATUS_BUSY != 0 && self.cycles >= self.busy_until {
            self.status &= !STATUS_BUSY;
        }
    }

    fn current_cycle(&self) -> Cycle {
        self.cycles
    }

    fn next_event_cycle(&self) -> Cycle {
        emu_core::earliest(self.timer_a_event(), self.timer_b_event())
    }

    fn adjust_cycles(&mut self, deduction: Cycle) {
        self.cycles = self.cycles.saturating_sub(deduction);
        self.busy_until = self.busy_until.saturating_sub(deduction);
    }
}

const QUERY_PATHS: &[&str] = &["cycle", "status", "timer_a", "timer_b", "ctrl"];

impl Observable for Ym2612 {
    fn query(&self, path: &str) -> Option<Value> {
        Some(match path {
            "cycle" => self.cycles.into(),
            "status" => self.status.into(),
            "timer_a" => self.timer_a.into(),
            "timer_b" => self.timer_b.into(),
            "ctrl" => self.control().into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
