//! Z80 flag register bits.

pub const SF: u8 = 0b1000_0000;
pub const ZF: u8 = 0b0100_0000;
/// Undocumented copy of result bit 5.
pub const YF: u8 = 0b0010_0000;
pub const HF: u8 = 0b0001_0000;
/// Undocumented copy of result bit 3.
pub const XF: u8 = 0b0000_1000;
/// Parity or overflow, depending on the instruction.
pub const PF: u8 = 0b0000_0100;
pub const NF: u8 = 0b0000_0010;
pub const CF: u8 = 0b0000_0001;

/// Sign, zero and the two undocumented bits for a result.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// [`sz53`] plus even parity in PF.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    if value.count_ones().is_multiple_of(2) {
        sz53(value) | PF
    } else {
        sz53(value)
    }
}
