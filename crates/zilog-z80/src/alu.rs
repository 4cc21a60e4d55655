//! Flag-exact arithmetic used by translated operations.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

/// Result byte and the full F register it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// Rotate and shift operations of the CB page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

#[must_use]
pub const fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = carry as u16;
    let wide = a as u16 + b as u16 + c;
    let value = wide as u8;
    let mut flags = sz53(value);
    if (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F {
        flags |= HF;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if wide > 0xFF {
        flags |= CF;
    }
    AluResult { value, flags }
}

#[must_use]
pub const fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = carry as u16;
    let value = a.wrapping_sub(b).wrapping_sub(c as u8);
    let mut flags = sz53(value) | NF;
    if ((a & 0x0F) as u16) < (b & 0x0F) as u16 + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if (a as u16) < b as u16 + c {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// CP takes X and Y from the operand rather than the difference.
#[must_use]
pub const fn cp8(a: u8, b: u8) -> AluResult {
    let diff = sub8(a, b, false);
    AluResult {
        value: a,
        flags: (diff.flags & !(YF | XF)) | (b & (YF | XF)),
    }
}

#[must_use]
pub const fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: sz53p(value) | HF,
    }
}

#[must_use]
pub const fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

#[must_use]
pub const fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

/// INC leaves carry alone; `old_flags` supplies it.
#[must_use]
pub const fn inc8(a: u8, old_flags: u8) -> AluResult {
    let value = a.wrapping_add(1);
    let mut flags = sz53(value) | (old_flags & CF);
    if a & 0x0F == 0x0F {
        flags |= HF;
    }
    if a == 0x7F {
        flags |= PF;
    }
    AluResult { value, flags }
}

#[must_use]
pub const fn dec8(a: u8, old_flags: u8) -> AluResult {
    let value = a.wrapping_sub(1);
    let mut flags = sz53(value) | NF | (old_flags & CF);
    if a & 0x0F == 0 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF;
    }
    AluResult { value, flags }
}

/// CB-page rotate or shift with full S/Z/P flags.
#[must_use]
pub const fn shift(op: ShiftOp, a: u8, carry: bool) -> AluResult {
    let (value, out) = match op {
        ShiftOp::Rlc => (a.rotate_left(1), a & 0x80 != 0),
        ShiftOp::Rrc => (a.rotate_right(1), a & 1 != 0),
        ShiftOp::Rl => ((a << 1) | carry as u8, a & 0x80 != 0),
        ShiftOp::Rr => ((a >> 1) | ((carry as u8) << 7), a & 1 != 0),
        ShiftOp::Sla => (a << 1, a & 0x80 != 0),
        ShiftOp::Sra => ((a >> 1) | (a & 0x80), a & 1 != 0),
        ShiftOp::Sll => ((a << 1) | 1, a & 0x80 != 0),
        ShiftOp::Srl => (a >> 1, a & 1 != 0),
    };
    AluResult {
        value,
        flags: sz53p(value) | out as u8,
    }
}

/// RLCA/RRCA/RLA/RRA: only C, H, N and the undocumented bits change.
#[must_use]
pub const fn shift_accumulator(op: ShiftOp, a: u8, old_flags: u8) -> AluResult {
    let full = shift(op, a, old_flags & CF != 0);
    AluResult {
        value: full.value,
        flags: (old_flags & (SF | ZF | PF)) | (full.value & (YF | XF)) | (full.flags & CF),
    }
}

/// `add hl, rr` and friends: S, Z and P/V are preserved.
#[must_use]
pub const fn add16(a: u16, b: u16, old_flags: u8) -> (u16, u8) {
    let wide = a as u32 + b as u32;
    let value = wide as u16;
    let mut flags = (old_flags & (SF | ZF | PF)) | ((value >> 8) as u8 & (YF | XF));
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

#[must_use]
pub const fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = carry as u32;
    let wide = a as u32 + b as u32 + c;
    let value = wide as u16;
    let mut flags = (value >> 8) as u8 & (SF | YF | XF);
    if value == 0 {
        flags |= ZF;
    }
    if (a & 0x0FFF) as u32 + (b & 0x0FFF) as u32 + c > 0x0FFF {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if wide > 0xFFFF {
        flags |= CF;
    }
    (value, flags)
}

#[must_use]
pub const fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = carry as u32;
    let value = (a as u32).wrapping_sub(b as u32).wrapping_sub(c) as u16;
    let mut flags = ((value >> 8) as u8 & (SF | YF | XF)) | NF;
    if value == 0 {
        flags |= ZF;
    }
    if ((a & 0x0FFF) as u32) < (b & 0x0FFF) as u32 + c {
        flags |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if (a as u32) < b as u32 + c {
        flags |= CF;
    }
    (value, flags)
}

/// Decimal adjust after a BCD add or subtract.
#[must_use]
pub const fn daa(a: u8, old_flags: u8) -> AluResult {
    let mut correction = 0;
    let mut carry = old_flags & CF != 0;
    if old_flags & HF != 0 || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }
    let subtract = old_flags & NF != 0;
    let value = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    let half = if subtract {
        old_flags & HF != 0 && a & 0x0F < 6
    } else {
        a & 0x0F > 9
    };
    let mut flags = sz53p(value) | (old_flags & NF) | carry as u8;
    if half {
        flags |= HF;
    }
    AluResult { value, flags }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overflow_and_half_carry() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags & (SF | PF | HF | CF), SF | PF | HF);
    }

    #[test]
    fn sub_borrow() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags & (CF | NF | HF), CF | NF | HF);
    }

    #[test]
    fn cp_takes_xy_from_operand() {
        let r = cp8(0x00, 0x28);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (YF | XF), 0x28);
    }

    #[test]
    fn inc_keeps_carry() {
        assert_eq!(inc8(0xFF, CF).flags & (ZF | CF | HF), ZF | CF | HF);
    }

    #[test]
    fn daa_after_bcd_add() {
        let sum = add8(0x19, 0x28, false);
        assert_eq!(daa(sum.value, sum.flags).value, 0x47);
        let sum = add8(0x99, 0x01, false);
        let adjusted = daa(sum.value, sum.flags);
        assert_eq!(adjusted.value, 0x00);
        assert_ne!(adjusted.flags & CF, 0);
    }

    #[test]
    fn sbc16_zero() {
        let (value, flags) = sbc16(0x1000, 0x0FFF, true);
        assert_eq!(value, 0);
        assert_eq!(flags & (ZF | NF | CF), ZF | NF);
    }
}
