//! Opcode tables and the decoder.
//!
//! The main table carries base T-states per primary opcode. Prefixed forms
//! derive theirs from it: a DD/FD prefix adds 4 T-states when it only
//! renames HL, 12 when `(hl)` becomes `(ix+d)`, 9 for `ld (ix+d), n`.

use crate::inst::{Cond, Instruction, Mnemonic, Operand, Reg8, Reg16};

use Mnemonic as M;

/// Base T-states for unprefixed opcodes (branch not taken).
#[rustfmt::skip]
const MAIN_CYCLES: [u8; 256] = [
    4, 10,  7,  6,  4,  4,  7,  4,  4, 11,  7,  6,  4,  4,  7,  4,
    8, 10,  7,  6,  4,  4,  7,  4, 12, 11,  7,  6,  4,  4,  7,  4,
    7, 10, 16,  6,  4,  4,  7,  4,  7, 11, 16,  6,  4,  4,  7,  4,
    7, 10, 13,  6, 11, 11, 10,  4,  7, 11, 13,  6,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    7,  7,  7,  7,  7,  7,  4,  7,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4,
    5, 10, 10, 10, 10, 11,  7, 11,  5, 10, 10,  0, 10, 17,  7, 11,
    5, 10, 10, 11, 10, 11,  7, 11,  5,  4, 10, 11, 10,  0,  7, 11,
    5, 10, 10, 19, 10, 11,  7, 11,  5,  4, 10,  4, 10,  0,  7, 11,
    5, 10, 10,  4, 10, 11,  7, 11,  5,  6, 10,  4, 10,  0,  7, 11,
];

/// `r[z]` encoding order. Slot 6 is `(hl)` and never read from here.
const R: [Reg8; 8] = [Reg8::B, Reg8::C, Reg8::D, Reg8::E, Reg8::H, Reg8::L, Reg8::A, Reg8::A];
const RP: [Reg16; 4] = [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Sp];
const RP2: [Reg16; 4] = [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Af];
const CC: [Cond; 8] = [
    Cond::Nz,
    Cond::Z,
    Cond::Nc,
    Cond::C,
    Cond::Po,
    Cond::Pe,
    Cond::P,
    Cond::M,
];
const ALU: [Mnemonic; 8] = [M::Add, M::Adc, M::Sub, M::Sbc, M::And, M::Xor, M::Or, M::Cp];
const ROT: [Mnemonic; 8] = [M::Rlc, M::Rrc, M::Rl, M::Rr, M::Sla, M::Sra, M::Sll, M::Srl];
const ACC: [Mnemonic; 8] = [M::Rlca, M::Rrca, M::Rla, M::Rra, M::Daa, M::Cpl, M::Scf, M::Ccf];
const IM: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];
const BLOCK: [[Mnemonic; 4]; 4] = [
    [M::Ldi, M::Cpi, M::Ini, M::Outi],
    [M::Ldd, M::Cpd, M::Ind, M::Outd],
    [M::Ldir, M::Cpir, M::Inir, M::Otir],
    [M::Lddr, M::Cpdr, M::Indr, M::Otdr],
];

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Active DD/FD substitution for HL.
    index: Option<Reg16>,
    /// The instruction has a `(hl)` operand, so H and L are not renamed.
    mem: bool,
}

impl Decoder<'_> {
    fn byte(&mut self) -> u8 {
        let b = self.bytes.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn word(&mut self) -> u16 {
        let lo = self.byte();
        let hi = self.byte();
        u16::from_le_bytes([lo, hi])
    }

    fn disp(&mut self) -> i8 {
        self.byte() as i8
    }

    fn hl(&self) -> Reg16 {
        self.index.unwrap_or(Reg16::Hl)
    }

    fn r(&mut self, code: u8) -> Operand {
        match (code, self.index) {
            (6, None) => Operand::Ind(Reg16::Hl),
            (6, Some(index)) => Operand::Indexed(index, self.disp()),
            (4, Some(Reg16::Ix)) if !self.mem => Operand::Reg8(Reg8::Ixh),
            (5, Some(Reg16::Ix)) if !self.mem => Operand::Reg8(Reg8::Ixl),
            (4, Some(Reg16::Iy)) if !self.mem => Operand::Reg8(Reg8::Iyh),
            (5, Some(Reg16::Iy)) if !self.mem => Operand::Reg8(Reg8::Iyl),
            _ => Operand::Reg8(R[usize::from(code)]),
        }
    }

    fn rp(&self, table: &[Reg16; 4], p: u8) -> Operand {
        match table[usize::from(p)] {
            Reg16::Hl => Operand::Reg16(self.hl()),
            other => Operand::Reg16(other),
        }
    }

    fn finish(&self, mnemonic: Mnemonic, dst: Operand, src: Operand, cycles: u8) -> Instruction {
        Instruction {
            mnemonic,
            dst,
            src,
            copy: None,
            len: self.pos as u8,
            cycles,
        }
    }
}

/// Decode one instruction from the start of `bytes`.
///
/// Missing trailing bytes read as zero. Every byte sequence decodes to
/// something: undefined ED opcodes are 8 T-state NOPs and a DD/FD prefix
/// that is followed by another prefix is a 4 T-state NOP of its own.
#[must_use]
pub fn decode(bytes: &[u8]) -> Instruction {
    let mut d = Decoder {
        bytes,
        pos: 0,
        index: None,
        mem: false,
    };
    match d.byte() {
        0xCB => cb(&mut d),
        0xED => ed(&mut d),
        0xDD => prefixed(&mut d, Reg16::Ix),
        0xFD => prefixed(&mut d, Reg16::Iy),
        op => main(&mut d, op),
    }
}

fn prefixed(d: &mut Decoder<'_>, index: Reg16) -> Instruction {
    match d.bytes.get(1).copied().unwrap_or(0) {
        0xDD | 0xFD | 0xED => d.finish(M::Nop, Operand::None, Operand::None, 4),
        0xCB => {
            d.pos = 2;
            let disp = d.disp();
            let op = d.byte();
            index_cb(index, disp, op)
        }
        op => {
            d.pos = 2;
            d.index = Some(index);
            main(d, op)
        }
    }
}

fn main(d: &mut Decoder<'_>, op: u8) -> Instruction {
    use Operand::{AfAlt, Abs, Imm8, Imm16, Ind, None as N, Port, Rel};

    let (x, y, z) = (op >> 6, (op >> 3) & 7, op & 7);
    let (p, q) = (y >> 1, y & 1);
    d.mem = match x {
        0 => y == 6 && (4..=6).contains(&z),
        1 => (y == 6) != (z == 6),
        2 => z == 6,
        _ => false,
    };
    let a = Operand::Reg8(Reg8::A);

    let (m, dst, src) = match (x, z) {
        (0, 0) => match y {
            0 => (M::Nop, N, N),
            1 => (M::Ex, Operand::Reg16(Reg16::Af), AfAlt),
            2 => (M::Djnz, Rel(d.disp()), N),
            3 => (M::Jr, Rel(d.disp()), N),
            _ => (M::Jr, Operand::Cond(CC[usize::from(y - 4)]), Rel(d.disp())),
        },
        (0, 1) if q == 0 => (M::Ld, d.rp(&RP, p), Imm16(d.word())),
        (0, 1) => (M::Add, d.rp(&RP, 2), d.rp(&RP, p)),
        (0, 2) => match (q, p) {
            (0, 0) => (M::Ld, Ind(Reg16::Bc), a),
            (0, 1) => (M::Ld, Ind(Reg16::De), a),
            (0, 2) => (M::Ld, Abs(d.word()), d.rp(&RP, 2)),
            (0, _) => (M::Ld, Abs(d.word()), a),
            (_, 0) => (M::Ld, a, Ind(Reg16::Bc)),
            (_, 1) => (M::Ld, a, Ind(Reg16::De)),
            (_, 2) => (M::Ld, d.rp(&RP, 2), Abs(d.word())),
            _ => (M::Ld, a, Abs(d.word())),
        },
        (0, 3) => (if q == 0 { M::Inc } else { M::Dec }, d.rp(&RP, p), N),
        (0, 4) => (M::Inc, d.r(y), N),
        (0, 5) => (M::Dec, d.r(y), N),
        (0, 6) => {
            let dst = d.r(y);
            (M::Ld, dst, Imm8(d.byte()))
        }
        (0, _) => (ACC[usize::from(y)], N, N),
        (1, _) if y == 6 && z == 6 => (M::Halt, N, N),
        (1, _) => {
            let dst = d.r(y);
            (M::Ld, dst, d.r(z))
        }
        (2, _) => (ALU[usize::from(y)], a, d.r(z)),
        (_, 0) => (M::Ret, Operand::Cond(CC[usize::from(y)]), N),
        (_, 1) if q == 0 => (M::Pop, d.rp(&RP2, p), N),
        (_, 1) => match p {
            0 => (M::Ret, N, N),
            1 => (M::Exx, N, N),
            2 => (M::Jp, Ind(d.hl()), N),
            _ => (M::Ld, Operand::Reg16(Reg16::Sp), d.rp(&RP, 2)),
        },
        (_, 2) => (M::Jp, Operand::Cond(CC[usize::from(y)]), Imm16(d.word())),
        (_, 3) => match y {
            0 => (M::Jp, Imm16(d.word()), N),
            2 => (M::Out, Port(d.byte()), a),
            3 => (M::In, a, Port(d.byte())),
            4 => (M::Ex, Ind(Reg16::Sp), d.rp(&RP, 2)),
            5 => (M::Ex, Operand::Reg16(Reg16::De), Operand::Reg16(Reg16::Hl)),
            6 => (M::Di, N, N),
            7 => (M::Ei, N, N),
            _ => (M::Nop, N, N),
        },
        (_, 4) => (M::Call, Operand::Cond(CC[usize::from(y)]), Imm16(d.word())),
        (_, 5) if q == 0 => (M::Push, d.rp(&RP2, p), N),
        (_, 5) if p == 0 => (M::Call, Imm16(d.word()), N),
        (_, 5) => (M::Nop, N, N),
        (_, 6) => (ALU[usize::from(y)], a, Imm8(d.byte())),
        _ => (M::Rst, Imm8(y * 8), N),
    };

    let mut cycles = MAIN_CYCLES[usize::from(op)];
    if d.index.is_some() {
        cycles += match (d.mem, op) {
            (true, 0x36) => 9,
            (true, _) => 12,
            (false, _) => 4,
        };
    }
    d.finish(m, dst, src, cycles)
}

fn cb(d: &mut Decoder<'_>) -> Instruction {
    let op = d.byte();
    let (x, y, z) = (op >> 6, (op >> 3) & 7, op & 7);
    let target = d.r(z);
    let cycles = match (x, z) {
        (1, 6) => 12,
        (_, 6) => 15,
        _ => 8,
    };
    let (m, dst, src) = match x {
        0 => (ROT[usize::from(y)], target, Operand::None),
        1 => (M::Bit, Operand::Bit(y), target),
        2 => (M::Res, Operand::Bit(y), target),
        _ => (M::Set, Operand::Bit(y), target),
    };
    d.finish(m, dst, src, cycles)
}

/// DDCB/FDCB: displacement comes before the opcode. Apart from BIT, the
/// result is also copied into `r[z]` unless `z` names `(hl)`.
fn index_cb(index: Reg16, disp: i8, op: u8) -> Instruction {
    let (x, y, z) = (op >> 6, (op >> 3) & 7, op & 7);
    let target = Operand::Indexed(index, disp);
    let (mnemonic, dst, src) = match x {
        0 => (ROT[usize::from(y)], target, Operand::None),
        1 => (M::Bit, Operand::Bit(y), target),
        2 => (M::Res, Operand::Bit(y), target),
        _ => (M::Set, Operand::Bit(y), target),
    };
    Instruction {
        mnemonic,
        dst,
        src,
        copy: (x != 1 && z != 6).then_some(R[usize::from(z)]),
        len: 4,
        cycles: if x == 1 { 20 } else { 23 },
    }
}

fn ed(d: &mut Decoder<'_>) -> Instruction {
    use Operand::{Abs, Imm8, Mode, None as N, PortC, Reg8 as R8, Reg16 as R16};

    let op = d.byte();
    let (x, y, z) = (op >> 6, (op >> 3) & 7, op & 7);
    let (p, q) = (y >> 1, y & 1);
    let rp = R16(RP[usize::from(p)]);

    let (m, dst, src, cycles) = match (x, z) {
        (1, 0) if y == 6 => (M::In, N, PortC, 12),
        (1, 0) => (M::In, R8(R[usize::from(y)]), PortC, 12),
        (1, 1) if y == 6 => (M::Out, PortC, Imm8(0), 12),
        (1, 1) => (M::Out, PortC, R8(R[usize::from(y)]), 12),
        (1, 2) => (if q == 0 { M::Sbc } else { M::Adc }, R16(Reg16::Hl), rp, 15),
        (1, 3) if q == 0 => (M::Ld, Abs(d.word()), rp, 20),
        (1, 3) => (M::Ld, rp, Abs(d.word()), 20),
        (1, 4) => (M::Neg, N, N, 8),
        (1, 5) => (if y == 1 { M::Reti } else { M::Retn }, N, N, 14),
        (1, 6) => (M::Im, Mode(IM[usize::from(y)]), N, 8),
        (1, 7) => match y {
            0 => (M::Ld, R8(Reg8::I), R8(Reg8::A), 9),
            1 => (M::Ld, R8(Reg8::R), R8(Reg8::A), 9),
            2 => (M::Ld, R8(Reg8::A), R8(Reg8::I), 9),
            3 => (M::Ld, R8(Reg8::A), R8(Reg8::R), 9),
            4 => (M::Rrd, N, N, 18),
            5 => (M::Rld, N, N, 18),
            _ => (M::Nop, N, N, 8),
        },
        (2, 0..=3) if y >= 4 => (BLOCK[usize::from(y - 4)][usize::from(z)], N, N, 16),
        _ => (M::Nop, N, N, 8),
    };
    d.finish(m, dst, src, cycles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ld_b_immediate() {
        let inst = decode(&[0x06, 0x2A, 0, 0]);
        assert_eq!(inst.mnemonic, M::Ld);
        assert_eq!(inst.dst, Operand::Reg8(Reg8::B));
        assert_eq!(inst.src, Operand::Imm8(0x2A));
        assert_eq!((inst.len, inst.cycles), (2, 7));
    }

    #[test]
    fn index_prefix_keeps_h_with_memory_operand() {
        let inst = decode(&[0xDD, 0x66, 0xFE, 0]);
        assert_eq!(inst.dst, Operand::Reg8(Reg8::H));
        assert_eq!(inst.src, Operand::Indexed(Reg16::Ix, -2));
        assert_eq!((inst.len, inst.cycles), (3, 19));
    }

    #[test]
    fn index_prefix_renames_h_without_memory_operand() {
        let inst = decode(&[0xFD, 0x65, 0, 0]);
        assert_eq!(inst.dst, Operand::Reg8(Reg8::Iyh));
        assert_eq!(inst.src, Operand::Reg8(Reg8::Iyl));
        assert_eq!((inst.len, inst.cycles), (2, 8));
    }

    #[test]
    fn ld_indexed_immediate_reads_displacement_first() {
        let inst = decode(&[0xDD, 0x36, 0x05, 0x99]);
        assert_eq!(inst.dst, Operand::Indexed(Reg16::Ix, 5));
        assert_eq!(inst.src, Operand::Imm8(0x99));
        assert_eq!((inst.len, inst.cycles), (4, 19));
    }

    #[test]
    fn ddcb_copies_result() {
        let inst = decode(&[0xDD, 0xCB, 0x03, 0xC0]);
        assert_eq!(inst.mnemonic, M::Set);
        assert_eq!(inst.copy, Some(Reg8::B));
        assert_eq!((inst.len, inst.cycles), (4, 23));
        let bit = decode(&[0xFD, 0xCB, 0x03, 0x46]);
        assert_eq!(bit.copy, None);
        assert_eq!(bit.cycles, 20);
    }

    #[test]
    fn double_prefix_is_a_nop() {
        let inst = decode(&[0xDD, 0xFD, 0x21, 0x00]);
        assert_eq!(inst.mnemonic, M::Nop);
        assert_eq!((inst.len, inst.cycles), (1, 4));
    }

    #[test]
    fn undefined_ed_is_a_nop() {
        let inst = decode(&[0xED, 0x00, 0, 0]);
        assert_eq!(inst.mnemonic, M::Nop);
        assert_eq!((inst.len, inst.cycles), (2, 8));
    }

    #[test]
    fn every_opcode_decodes_within_four_bytes() {
        for prefix in [None, Some(0xCB), Some(0xED), Some(0xDD), Some(0xFD)] {
            for op in 0..=255u8 {
                let bytes = match prefix {
                    Some(p) => [p, op, 0x12, 0x34],
                    None => [op, 0x12, 0x34, 0x56],
                };
                let inst = decode(&bytes);
                assert!((1..=4).contains(&inst.len), "{bytes:02X?}");
                assert!(inst.cycles >= 4, "{bytes:02X?}");
            }
        }
    }
}
