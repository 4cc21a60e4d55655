//! Motorola 68000 CPU registers.
//!
//! - D0-D7: 8 data registers (32-bit)
//! - A0-A7: 8 address registers (32-bit, A7 is the active stack pointer)
//! - USP: User stack pointer (A7 when in user mode)
//! - SSP: Supervisor stack pointer (A7 when in supervisor mode)
//! - PC: Program counter (32-bit, 24 bits reach the bus)
//! - SR: Status register (16-bit)

use serde::{Deserialize, Serialize};

use crate::flags::{S, SR_MASK, X};

/// 68000 CPU register set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// Data registers D0-D7.
    pub d: [u32; 8],
    /// Address registers A0-A6 (A7 is handled via USP/SSP).
    pub a: [u32; 7],
    /// User stack pointer (active A7 when in user mode).
    pub usp: u32,
    /// Supervisor stack pointer (active A7 when in supervisor mode).
    pub ssp: u32,
    /// Program counter. Only meaningful while translated code is not running.
    pub pc: u32,
    /// Status register.
    pub sr: u16,
    /// Set by STOP until an interrupt is accepted.
    pub stopped: bool,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Create registers in reset state.
    ///
    /// After reset: supervisor mode, interrupt mask level 7.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            d: [0; 8],
            a: [0; 7],
            usp: 0,
            ssp: 0,
            pc: 0,
            sr: 0x2700,
            stopped: false,
        }
    }

    /// Get address register by index (0-7).
    /// A7 returns the active stack pointer based on supervisor mode.
    #[must_use]
    pub fn a(&self, n: usize) -> u32 {
        debug_assert!(n < 8);
        if n < 7 { self.a[n] } else { self.active_sp() }
    }

    /// Set address register by index (0-7).
    pub fn set_a(&mut self, n: usize, value: u32) {
        debug_assert!(n < 8);
        if n < 7 {
            self.a[n] = value;
        } else {
            self.set_active_sp(value);
        }
    }

    /// Register 0-15 as encoded in index extension words: D0-D7 then A0-A7.
    #[must_use]
    pub fn da(&self, n: usize) -> u32 {
        if n < 8 { self.d[n] } else { self.a(n - 8) }
    }

    #[must_use]
    pub const fn active_sp(&self) -> u32 {
        if self.is_supervisor() {
            self.ssp
        } else {
            self.usp
        }
    }

    pub fn set_active_sp(&mut self, value: u32) {
        if self.is_supervisor() {
            self.ssp = value;
        } else {
            self.usp = value;
        }
    }

    #[must_use]
    pub const fn is_supervisor(&self) -> bool {
        self.sr & S != 0
    }

    /// Get the interrupt mask level (0-7).
    #[must_use]
    pub const fn interrupt_mask(&self) -> u8 {
        ((self.sr >> 8) & 0x07) as u8
    }

    pub fn set_interrupt_mask(&mut self, level: u8) {
        self.sr = (self.sr & !0x0700) | (u16::from(level & 0x07) << 8);
    }

    /// Write the whole status register. Switching S swaps the active
    /// stack pointer implicitly.
    pub fn set_sr(&mut self, value: u16) {
        self.sr = value & SR_MASK;
    }

    /// Get the condition code register (low byte of SR).
    #[must_use]
    pub const fn ccr(&self) -> u8 {
        (self.sr & 0xFF) as u8
    }

    pub fn set_ccr(&mut self, value: u8) {
        self.sr = (self.sr & 0xFF00) | (u16::from(value) & 0x1F);
    }

    /// X flag as 0 or 1.
    #[must_use]
    pub const fn x(&self) -> u32 {
        ((self.sr & X) >> 4) as u32
    }

    /// Reserve room on the active stack, returning the address to write.
    pub fn push(&mut self, bytes: u32) -> u32 {
        let sp = self.active_sp().wrapping_sub(bytes);
        self.set_active_sp(sp);
        sp
    }

    /// Release stack space, returning the address to read from.
    pub fn pop(&mut self, bytes: u32) -> u32 {
        let sp = self.active_sp();
        self.set_active_sp(sp.wrapping_add(bytes));
        sp
    }
}
