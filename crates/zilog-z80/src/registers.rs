//! Z80 register file.

use emu_core::{CYCLE_NEVER, Cycle};
use serde::{Deserialize, Serialize};

use crate::inst::{Reg8, Reg16};

/// Architectural registers plus the interrupt latches.
///
/// `pc` is only current while the CPU is outside translated code.
/// `r` holds the refresh register minus the instructions fetched since the
/// last `ld r, a`; see [`Registers::refresh`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
    /// Interrupts are not taken before this cycle (EI shadow).
    pub int_enable_cycle: Cycle,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0xFF,
            f: 0xFF,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_alt: 0,
            f_alt: 0,
            b_alt: 0,
            c_alt: 0,
            d_alt: 0,
            e_alt: 0,
            h_alt: 0,
            l_alt: 0,
            ix: 0xFFFF,
            iy: 0xFFFF,
            sp: 0xFFFF,
            pc: 0,
            i: 0,
            r: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            int_enable_cycle: CYCLE_NEVER,
        }
    }
}

impl Registers {
    #[must_use]
    pub const fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    pub fn set_bc(&mut self, value: u16) {
        [self.b, self.c] = value.to_be_bytes();
    }

    pub fn set_de(&mut self, value: u16) {
        [self.d, self.e] = value.to_be_bytes();
    }

    pub fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    /// Read an 8-bit register. `R` reads the stored base; use
    /// [`Registers::refresh`] for the live value.
    #[must_use]
    pub const fn reg8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::A => self.a,
            Reg8::Ixh => (self.ix >> 8) as u8,
            Reg8::Ixl => self.ix as u8,
            Reg8::Iyh => (self.iy >> 8) as u8,
            Reg8::Iyl => self.iy as u8,
            Reg8::I => self.i,
            Reg8::R => self.r,
        }
    }

    pub fn set_reg8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
            Reg8::A => self.a = value,
            Reg8::Ixh => self.ix = (self.ix & 0x00FF) | u16::from(value) << 8,
            Reg8::Ixl => self.ix = (self.ix & 0xFF00) | u16::from(value),
            Reg8::Iyh => self.iy = (self.iy & 0x00FF) | u16::from(value) << 8,
            Reg8::Iyl => self.iy = (self.iy & 0xFF00) | u16::from(value),
            Reg8::I => self.i = value,
            Reg8::R => self.r = value,
        }
    }

    #[must_use]
    pub const fn reg16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::Bc => self.bc(),
            Reg16::De => self.de(),
            Reg16::Hl => self.hl(),
            Reg16::Sp => self.sp,
            Reg16::Af => self.af(),
            Reg16::Ix => self.ix,
            Reg16::Iy => self.iy,
        }
    }

    pub fn set_reg16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::Bc => self.set_bc(value),
            Reg16::De => self.set_de(value),
            Reg16::Hl => self.set_hl(value),
            Reg16::Sp => self.sp = value,
            Reg16::Af => [self.a, self.f] = value.to_be_bytes(),
            Reg16::Ix => self.ix = value,
            Reg16::Iy => self.iy = value,
        }
    }

    /// Live value of R, counting one fetch per four T-states since the
    /// base was stored. Bit 7 is never touched by refresh.
    #[must_use]
    pub const fn refresh(&self, t_states: u32) -> u8 {
        let counted = (self.r as u32).wrapping_add(t_states / 4) as u8;
        (self.r & 0x80) | (counted & 0x7F)
    }

    /// Store `value` into R so that [`Registers::refresh`] at `t_states`
    /// reads it back.
    pub const fn set_refresh(&mut self, value: u8, t_states: u32) {
        let base = (value as u32).wrapping_sub(t_states / 4) as u8;
        self.r = (value & 0x80) | (base & 0x7F);
    }

    /// `ex af, af'`
    pub const fn swap_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }

    /// `exx`
    pub const fn swap_main(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_halves() {
        let mut regs = Registers::default();
        regs.set_reg16(Reg16::Ix, 0x1234);
        regs.set_reg8(Reg8::Ixl, 0xCD);
        assert_eq!(regs.ix, 0x12CD);
        assert_eq!(regs.reg8(Reg8::Ixh), 0x12);
    }

    #[test]
    fn refresh_counts_fetches_and_keeps_bit_7() {
        let mut regs = Registers::default();
        regs.set_refresh(0xFE, 400);
        assert_eq!(regs.refresh(400), 0xFE);
        assert_eq!(regs.refresh(408), 0x80);
    }
}
