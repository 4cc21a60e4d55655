//! 68000 instruction timing, in CPU clocks.
//!
//! [`base_cycles`] is the part of an instruction's time that depends only
//! on its encoding and is charged up front. Data-dependent extras
//! (shift counts, multiply bit patterns, division, taken branches) are
//! charged by the operations themselves using the helpers below.

use crate::inst::{Ea, Instruction, Mnemonic, Operand, Size};

/// Interrupt acknowledge and exception processing for an autovector.
pub const INTERRUPT_CLOCKS: u32 = 44;
/// Exception processing for TRAP, ILLEGAL, privilege violation, Line A/F.
pub const TRAP_CLOCKS: u32 = 34;
/// Division by zero, on top of the effective address time.
pub const ZERO_DIVIDE_CLOCKS: u32 = 38;
/// Extra time when CHK or TRAPV actually traps.
pub const CHECK_TRAP_CLOCKS: u32 = 30;

const JMP: [u32; 7] = [8, 10, 14, 10, 12, 10, 14];
const JSR: [u32; 7] = [16, 18, 22, 18, 20, 18, 22];
const LEA: [u32; 7] = [4, 8, 12, 8, 12, 8, 12];
const PEA: [u32; 7] = [12, 16, 20, 16, 20, 16, 20];
const MOVEM_TO_REGS: [u32; 7] = [12, 16, 18, 16, 20, 16, 18];
const MOVEM_TO_MEM: [u32; 7] = [8, 12, 14, 12, 16, 0, 0];

fn is_data_reg(op: Operand) -> bool {
    matches!(op, Operand::Ea(Ea::D(_)))
}

fn is_reg_or_imm(ea: Ea) -> bool {
    matches!(ea, Ea::D(_) | Ea::A(_) | Ea::Imm(_))
}

fn ea_time(op: Operand, size: Size) -> u32 {
    op.ea().map_or(0, |ea| ea.calc_cycles(size))
}

/// `(An)+` and `-(An)` cost the same as `(An)` for MOVEM.
fn movem_class(ea: Ea) -> usize {
    match ea {
        Ea::PostInc(_) | Ea::PreDec(_) => 0,
        other => other.control_class(),
    }
}

/// Encoding-determined cost of `inst`.
#[must_use]
pub fn base_cycles(inst: &Instruction) -> u32 {
    use Mnemonic as M;
    let size = inst.size_or_word();
    let long = size == Size::Long;
    let (src, dst) = (inst.src, inst.dst);
    let pick = |word: u32, long_time: u32| if long { long_time } else { word };
    let class = |op: Operand| op.ea().map_or(6, Ea::control_class);

    match inst.mnemonic {
        M::Move => match (src, dst) {
            (Operand::Usp, _) | (_, Operand::Usp) => 4,
            (Operand::Sr, d) if is_data_reg(d) => 6,
            (Operand::Sr, d) => 8 + ea_time(d, size),
            (s, Operand::Sr | Operand::Ccr) => 12 + ea_time(s, size),
            (s, d) => 4 + ea_time(s, size) + d.ea().map_or(0, |ea| ea.write_cycles(size)),
        },
        M::Movea => 4 + ea_time(src, size),
        M::Moveq => 4,

        M::Add | M::Sub | M::And | M::Or | M::Cmp => {
            if is_data_reg(dst) {
                let base = match src.ea() {
                    _ if !long => 4,
                    _ if inst.mnemonic == M::Cmp => 6,
                    Some(ea) if is_reg_or_imm(ea) => 8,
                    _ => 6,
                };
                base + ea_time(src, size)
            } else {
                pick(8, 12) + ea_time(dst, size)
            }
        }
        M::Eor => {
            if is_data_reg(dst) {
                pick(4, 8)
            } else {
                pick(8, 12) + ea_time(dst, size)
            }
        }
        M::Adda | M::Suba => {
            let base = match src.ea() {
                _ if !long => 8,
                Some(ea) if is_reg_or_imm(ea) => 8,
                _ => 6,
            };
            base + ea_time(src, size)
        }
        M::Cmpa => 6 + ea_time(src, size),
        M::Addi | M::Subi | M::Andi | M::Ori | M::Eori => match dst {
            Operand::Ccr | Operand::Sr => 20,
            d if is_data_reg(d) => pick(8, 16),
            d => pick(12, 20) + ea_time(d, size),
        },
        M::Cmpi => {
            if is_data_reg(dst) {
                pick(8, 14)
            } else {
                pick(8, 12) + ea_time(dst, size)
            }
        }
        M::Addq | M::Subq => match dst.ea() {
            Some(Ea::D(_)) => pick(4, 8),
            Some(Ea::A(_)) => 8,
            _ => pick(8, 12) + ea_time(dst, size),
        },
        M::Addx | M::Subx => {
            if is_data_reg(dst) {
                pick(4, 8)
            } else {
                pick(18, 30)
            }
        }
        M::Abcd | M::Sbcd => {
            if is_data_reg(dst) {
                6
            } else {
                18
            }
        }
        M::Cmpm => pick(12, 20),
        M::Clr | M::Neg | M::Negx | M::Not => {
            if is_data_reg(dst) {
                pick(4, 6)
            } else {
                pick(8, 12) + ea_time(dst, size)
            }
        }
        M::Tst => 4 + ea_time(dst, size),
        M::Nbcd => {
            if is_data_reg(dst) {
                6
            } else {
                8 + ea_time(dst, size)
            }
        }
        M::Tas => {
            if is_data_reg(dst) {
                4
            } else {
                14 + ea_time(dst, size)
            }
        }
        M::Scc => {
            if is_data_reg(dst) {
                4
            } else {
                8 + ea_time(dst, size)
            }
        }
        M::Ext | M::Swap | M::Nop | M::Stop | M::Trapv | M::Invalid => 4,
        M::Exg => 6,
        M::Reset => 132,
        M::Rte | M::Rtr => 20,
        M::Rts => 16,
        M::Link => 16,
        M::Unlk => 12,
        M::Trap | M::Illegal | M::LineA | M::LineF => TRAP_CLOCKS,
        M::Chk => 10 + ea_time(src, size),

        M::Bra => 10,
        M::Bsr => 18,
        // Short form: 8 not taken, 10 taken. Word form: 12 not taken, 10 taken.
        M::Bcc => {
            if size == Size::Byte {
                8
            } else {
                10
            }
        }
        M::Dbcc => 10,
        M::Jmp => JMP[class(src)],
        M::Jsr => JSR[class(src)],
        M::Lea => LEA[class(src)],
        M::Pea => PEA[class(src)],

        M::Movem => {
            let per_reg = pick(4, 8);
            match (src, dst) {
                (Operand::RegList(mask), Operand::Ea(ea)) => {
                    MOVEM_TO_MEM[movem_class(ea)] + per_reg * mask.count_ones()
                }
                (Operand::Ea(ea), Operand::RegList(mask)) => {
                    MOVEM_TO_REGS[movem_class(ea)] + per_reg * mask.count_ones()
                }
                _ => 4,
            }
        }
        M::Movep => pick(16, 24),
        M::Mulu | M::Muls => 38 + ea_time(src, size),
        M::Divu | M::Divs => ea_time(src, size),

        M::Asl | M::Asr | M::Lsl | M::Lsr | M::Roxl | M::Roxr | M::Rol | M::Ror => {
            if is_data_reg(dst) {
                pick(6, 8)
            } else {
                8 + ea_time(dst, size)
            }
        }

        M::Btst | M::Bchg | M::Bclr | M::Bset => {
            let dynamic = is_data_reg(src);
            let reg = is_data_reg(dst);
            let mem = ea_time(dst, Size::Byte);
            match (inst.mnemonic, dynamic, reg) {
                (M::Btst, true, true) => 6,
                (M::Btst, true, false) => 4 + mem,
                (M::Btst, false, true) => 10,
                (M::Btst, false, false) => 8 + mem,
                (M::Bclr, true, true) => 10,
                (M::Bclr, false, true) => 14,
                (_, true, true) => 8,
                (_, false, true) => 12,
                (_, true, false) => 8 + mem,
                (_, false, false) => 12 + mem,
            }
        }
    }
}

/// DIVU time by Jorge Cwik's restoring-division model, excluding the
/// effective address.
#[must_use]
pub fn divu_cycles(dividend: u32, divisor: u16) -> u32 {
    if (dividend >> 16) >= u32::from(divisor) {
        return 10;
    }
    let mut mcycles: u32 = 38;
    let hdivisor = u32::from(divisor) << 16;
    let mut dvd = dividend;
    for _ in 0..15 {
        let temp = dvd;
        dvd <<= 1;
        if temp & 0x8000_0000 != 0 {
            dvd = dvd.wrapping_sub(hdivisor);
        } else {
            mcycles += 2;
            if dvd >= hdivisor {
                dvd = dvd.wrapping_sub(hdivisor);
                mcycles -= 1;
            }
        }
    }
    mcycles * 2
}

/// DIVS time by the same model.
#[must_use]
pub fn divs_cycles(dividend: i32, divisor: i16) -> u32 {
    let mut mcycles: u32 = 6;
    if dividend < 0 {
        mcycles += 1;
    }
    let abs_dividend = dividend.unsigned_abs();
    let abs_divisor = divisor.unsigned_abs();
    if (abs_dividend >> 16) >= u32::from(abs_divisor) {
        return (mcycles + 2) * 2;
    }
    let mut aquot = abs_dividend / u32::from(abs_divisor);
    mcycles += 55;
    if divisor >= 0 {
        if dividend >= 0 {
            mcycles -= 1;
        } else {
            mcycles += 1;
        }
    }
    // Each clear bit among the 15 most significant quotient bits costs one.
    for _ in 0..15 {
        if (aquot as i16) >= 0 {
            mcycles += 1;
        }
        aquot <<= 1;
    }
    mcycles * 2
}

/// MULU: two clocks per set bit of the source.
#[must_use]
pub const fn mulu_cycles(src: u16) -> u32 {
    2 * src.count_ones()
}

/// MULS: two clocks per 01 or 10 pair in the source with a zero appended.
#[must_use]
pub const fn muls_cycles(src: u16) -> u32 {
    let pattern = (src as u32) << 1;
    2 * ((pattern ^ (pattern >> 1)) & 0xFFFF).count_ones()
}
