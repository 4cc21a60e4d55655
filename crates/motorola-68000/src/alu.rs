//! Integer and BCD arithmetic with 68000 condition codes.
//!
//! Every function returns the sized result and the full XNZVC set it
//! produces; callers merge only the flags their instruction affects.

use crate::flags::{C, N, V, X, Z, set_if};
use crate::inst::Size;

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u32,
    /// XNZVC bits in status-register positions.
    pub ccr: u16,
}

/// N and Z for a sized value.
#[must_use]
pub const fn nz(size: Size, value: u32) -> u16 {
    let value = value & size.mask();
    let mut ccr = 0;
    if value == 0 {
        ccr |= Z;
    }
    if value & size.msb() != 0 {
        ccr |= N;
    }
    ccr
}

/// `dst + src + x`.
#[must_use]
pub fn add(size: Size, src: u32, dst: u32, x: u32) -> AluResult {
    let mask = size.mask();
    let (s, d) = (src & mask, dst & mask);
    let wide = u64::from(s) + u64::from(d) + u64::from(x);
    let value = wide as u32 & mask;
    let carry = wide > u64::from(mask);
    let overflow = (s ^ value) & (d ^ value) & size.msb() != 0;
    let mut ccr = nz(size, value);
    ccr = set_if(ccr, V, overflow);
    ccr = set_if(ccr, C | X, carry);
    AluResult { value, ccr }
}

/// `dst - src - x`.
#[must_use]
pub fn sub(size: Size, src: u32, dst: u32, x: u32) -> AluResult {
    let mask = size.mask();
    let (s, d) = (src & mask, dst & mask);
    let value = d.wrapping_sub(s).wrapping_sub(x) & mask;
    let borrow = u64::from(s) + u64::from(x) > u64::from(d);
    let overflow = (s ^ d) & (value ^ d) & size.msb() != 0;
    let mut ccr = nz(size, value);
    ccr = set_if(ccr, V, overflow);
    ccr = set_if(ccr, C | X, borrow);
    AluResult { value, ccr }
}

/// AND, OR, EOR, NOT, MOVE: N and Z from the result, V and C cleared.
#[must_use]
pub const fn logic(size: Size, value: u32) -> AluResult {
    AluResult {
        value: value & size.mask(),
        ccr: nz(size, value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Asl,
    Asr,
    Lsl,
    Lsr,
    Rol,
    Ror,
    Roxl,
    Roxr,
}

/// Shift or rotate `value` by `count` (0-63) positions.
///
/// A zero count clears C, except for ROXL/ROXR where C takes X. X only
/// changes when bits are actually shifted out of an X-affecting op.
#[must_use]
pub fn shift(op: ShiftOp, size: Size, value: u32, count: u32, x: bool) -> AluResult {
    let mask = size.mask();
    let msb = size.msb();
    let mut v = value & mask;
    let mut carry = false;
    let mut extend = x;
    let mut overflow = false;
    for _ in 0..count {
        match op {
            ShiftOp::Asl => {
                carry = v & msb != 0;
                let next = (v << 1) & mask;
                overflow |= (next ^ v) & msb != 0;
                v = next;
                extend = carry;
            }
            ShiftOp::Asr => {
                carry = v & 1 != 0;
                v = (v >> 1) | (v & msb);
                extend = carry;
            }
            ShiftOp::Lsl => {
                carry = v & msb != 0;
                v = (v << 1) & mask;
                extend = carry;
            }
            ShiftOp::Lsr => {
                carry = v & 1 != 0;
                v >>= 1;
                extend = carry;
            }
            ShiftOp::Rol => {
                carry = v & msb != 0;
                v = ((v << 1) & mask) | u32::from(carry);
            }
            ShiftOp::Ror => {
                carry = v & 1 != 0;
                v = (v >> 1) | if carry { msb } else { 0 };
            }
            ShiftOp::Roxl => {
                carry = v & msb != 0;
                v = ((v << 1) & mask) | u32::from(extend);
                extend = carry;
            }
            ShiftOp::Roxr => {
                carry = v & 1 != 0;
                v = (v >> 1) | if extend { msb } else { 0 };
                extend = carry;
            }
        }
    }
    if count == 0 && matches!(op, ShiftOp::Roxl | ShiftOp::Roxr) {
        carry = x;
    }
    let mut ccr = nz(size, v);
    ccr = set_if(ccr, V, overflow);
    ccr = set_if(ccr, C, carry);
    ccr = set_if(ccr, X, extend);
    AluResult { value: v, ccr }
}

/// Decimal `dst + src + x`. Returns (result, carry, overflow).
#[must_use]
pub fn bcd_add(src: u8, dst: u8, x: u8) -> (u8, bool, bool) {
    let low_sum = (dst & 0x0F) + (src & 0x0F) + x;
    let corf: u16 = if low_sum > 9 { 6 } else { 0 };
    let uncorrected = u16::from(dst) + u16::from(src) + u16::from(x);
    let low_carry = (low_sum + if low_sum > 9 { 6 } else { 0 }) >> 4;
    let carry = (dst >> 4) + (src >> 4) + low_carry > 9;
    let result = if carry {
        uncorrected + corf + 0x60
    } else {
        uncorrected + corf
    };
    // V: the correction moved bit 7 from clear to set.
    let overflow = (!uncorrected & result & 0x80) != 0;
    (result as u8, carry, overflow)
}

/// Decimal `dst - src - x`. Returns (result, borrow, overflow).
#[must_use]
pub fn bcd_sub(src: u8, dst: u8, x: u8) -> (u8, bool, bool) {
    let uncorrected = dst.wrapping_sub(src).wrapping_sub(x);
    let mut result = uncorrected;
    let low_borrowed = (dst & 0x0F) < (src & 0x0F).saturating_add(x);
    if low_borrowed {
        result = result.wrapping_sub(6);
    }
    let high_borrowed = (dst >> 4) < (src >> 4) + u8::from(low_borrowed);
    if high_borrowed {
        result = result.wrapping_sub(0x60);
    }
    let borrow = high_borrowed || (low_borrowed && uncorrected < 6);
    // V: the correction moved bit 7 from set to clear.
    let overflow = (uncorrected & !result & 0x80) != 0;
    (result, borrow, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_word_overflow_and_carry() {
        let r = add(Size::Word, 0x0001, 0x7FFF, 0);
        assert_eq!(r.value, 0x8000);
        assert_eq!(r.ccr, N | V);
        let r = add(Size::Word, 0x0001, 0xFFFF, 0);
        assert_eq!(r.value, 0);
        assert_eq!(r.ccr, Z | C | X);
    }

    #[test]
    fn sub_borrow_sets_x() {
        let r = sub(Size::Byte, 1, 0, 0);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.ccr, N | C | X);
        let r = sub(Size::Long, 1, 0x8000_0000, 0);
        assert_eq!(r.value, 0x7FFF_FFFF);
        assert_eq!(r.ccr, V);
    }

    #[test]
    fn asl_records_sign_change() {
        let r = shift(ShiftOp::Asl, Size::Byte, 0x40, 1, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.ccr & V, V);
        let r = shift(ShiftOp::Asr, Size::Byte, 0x81, 1, false);
        assert_eq!(r.value, 0xC0);
        assert_eq!(r.ccr & (C | X), C | X);
    }

    #[test]
    fn zero_count_leaves_x() {
        let r = shift(ShiftOp::Lsl, Size::Word, 0x8000, 0, true);
        assert_eq!(r.value, 0x8000);
        assert_eq!(r.ccr & (C | X), X);
        let r = shift(ShiftOp::Roxr, Size::Word, 0, 0, true);
        assert_eq!(r.ccr & C, C);
    }

    #[test]
    fn rotate_through_extend() {
        let r = shift(ShiftOp::Roxl, Size::Byte, 0x80, 1, true);
        assert_eq!(r.value, 0x01);
        assert_eq!(r.ccr & (C | X), C | X);
        let r = shift(ShiftOp::Ror, Size::Long, 1, 1, false);
        assert_eq!(r.value, 0x8000_0000);
        assert_eq!(r.ccr & (C | N), C | N);
    }

    #[test]
    fn bcd() {
        assert_eq!(bcd_add(0x19, 0x28, 0), (0x47, false, false));
        assert_eq!(bcd_add(0x50, 0x60, 0).0, 0x10);
        assert!(bcd_add(0x50, 0x60, 0).1);
        assert_eq!(bcd_sub(0x19, 0x47, 0), (0x28, false, false));
        assert_eq!(bcd_sub(0x01, 0x00, 0).0, 0x99);
        assert!(bcd_sub(0x01, 0x00, 0).1);
    }

    proptest! {
        #[test]
        fn byte_add_sub_match_native_overflow(a: u8, b: u8) {
            let r = add(Size::Byte, u32::from(b), u32::from(a), 0);
            let (sum, carry) = a.overflowing_add(b);
            prop_assert_eq!(r.value, u32::from(sum));
            prop_assert_eq!(r.ccr & C != 0, carry);
            prop_assert_eq!(r.ccr & V != 0, (a as i8).checked_add(b as i8).is_none());
            prop_assert_eq!(r.ccr & X != 0, carry);

            let r = sub(Size::Byte, u32::from(b), u32::from(a), 0);
            let (diff, borrow) = a.overflowing_sub(b);
            prop_assert_eq!(r.value, u32::from(diff));
            prop_assert_eq!(r.ccr & C != 0, borrow);
            prop_assert_eq!(r.ccr & V != 0, (a as i8).checked_sub(b as i8).is_none());
            prop_assert_eq!(r.ccr & Z != 0, a == b);
        }
    }
}
