//! Motorola 68000 status register flags and condition codes.
//!
//! The status register is 16 bits:
//! - Bits 0-4: Condition code register (CCR): C, V, Z, N, X
//! - Bits 8-10: Interrupt mask
//! - Bit 13: Supervisor mode (S)
//! - Bit 15: Trace mode (T)

use std::fmt;

/// Carry flag.
pub const C: u16 = 0x0001;
/// Overflow flag.
pub const V: u16 = 0x0002;
/// Zero flag.
pub const Z: u16 = 0x0004;
/// Negative flag.
pub const N: u16 = 0x0008;
/// Extend flag.
pub const X: u16 = 0x0010;

/// Supervisor mode flag.
pub const S: u16 = 0x2000;
/// Trace mode flag.
pub const T: u16 = 0x8000;

/// Mask for condition codes only (bits 0-4).
pub const CCR_MASK: u16 = 0x001F;
/// Mask for valid SR bits (excluding reserved bits).
pub const SR_MASK: u16 = 0xA71F;

/// Condition field of Bcc, DBcc and Scc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    T,
    F,
    Hi,
    Ls,
    Cc,
    Cs,
    Ne,
    Eq,
    Vc,
    Vs,
    Pl,
    Mi,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Cond {
    const ALL: [Self; 16] = [
        Self::T,
        Self::F,
        Self::Hi,
        Self::Ls,
        Self::Cc,
        Self::Cs,
        Self::Ne,
        Self::Eq,
        Self::Vc,
        Self::Vs,
        Self::Pl,
        Self::Mi,
        Self::Ge,
        Self::Lt,
        Self::Gt,
        Self::Le,
    ];

    /// Decode the 4-bit condition field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self::ALL[(bits & 0x0F) as usize]
    }

    /// Evaluate against a status register value.
    #[must_use]
    pub const fn test(self, sr: u16) -> bool {
        let c = sr & C != 0;
        let v = sr & V != 0;
        let z = sr & Z != 0;
        let n = sr & N != 0;
        match self {
            Self::T => true,
            Self::F => false,
            Self::Hi => !c && !z,
            Self::Ls => c || z,
            Self::Cc => !c,
            Self::Cs => c,
            Self::Ne => !z,
            Self::Eq => z,
            Self::Vc => !v,
            Self::Vs => v,
            Self::Pl => !n,
            Self::Mi => n,
            Self::Ge => n == v,
            Self::Lt => n != v,
            Self::Gt => !z && n == v,
            Self::Le => z || n != v,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::T => "t",
            Self::F => "f",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Cc => "cc",
            Self::Cs => "cs",
            Self::Ne => "ne",
            Self::Eq => "eq",
            Self::Vc => "vc",
            Self::Vs => "vs",
            Self::Pl => "pl",
            Self::Mi => "mi",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
        };
        f.write_str(s)
    }
}

/// Set a flag if condition is true, clear if false.
#[must_use]
pub const fn set_if(sr: u16, flag: u16, condition: bool) -> u16 {
    if condition { sr | flag } else { sr & !flag }
}
