//! Opcode decoder.
//!
//! Decodes one instruction, extension words included, into an
//! [`Instruction`]. Encodings the 68000 does not define decode to
//! [`Mnemonic::Invalid`]; ILLEGAL and the Line A/F spaces decode to their
//! own mnemonics because they have defined trap behaviour.

use crate::flags::Cond;
use crate::inst::{Ea, IndexReg, Instruction, Mnemonic, Operand, Size};

// Addressing mode classes, one bit per mode: 0-6 are modes 0-6, 7-11 are
// mode 7 with register 0-4.
const ALL: u16 = 0x0FFF;
const DATA: u16 = ALL & !(1 << 1);
const MEMORY: u16 = DATA & !1;
const CONTROL: u16 = (1 << 2) | (1 << 5) | (1 << 6) | (1 << 7) | (1 << 8) | (1 << 9) | (1 << 10);
const ALTERABLE: u16 = 0x01FF;
const DATA_ALT: u16 = DATA & ALTERABLE;
const MEM_ALT: u16 = MEMORY & ALTERABLE;
const CTRL_ALT: u16 = CONTROL & ALTERABLE;
const POSTINC: u16 = 1 << 3;
const PREDEC: u16 = 1 << 4;
const IMMEDIATE: u16 = 1 << 11;

fn mode_bit(mode: u16, reg: u16) -> u16 {
    match mode {
        0..=6 => 1 << mode,
        _ if reg <= 4 => 1 << (7 + reg),
        _ => 0,
    }
}

fn size_field(bits: u16) -> Option<Size> {
    match bits & 3 {
        0 => Some(Size::Byte),
        1 => Some(Size::Word),
        2 => Some(Size::Long),
        _ => None,
    }
}

fn bit_mnemonic(bits: u16) -> Mnemonic {
    match bits & 3 {
        0 => Mnemonic::Btst,
        1 => Mnemonic::Bchg,
        2 => Mnemonic::Bclr,
        _ => Mnemonic::Bset,
    }
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    opcode: u16,
}

impl Decoder<'_> {
    fn word(&mut self) -> u16 {
        let byte = |i: usize| self.bytes.get(i).copied().unwrap_or(0);
        let w = u16::from_be_bytes([byte(self.pos), byte(self.pos + 1)]);
        self.pos += 2;
        w
    }

    fn long(&mut self) -> u32 {
        let hi = u32::from(self.word());
        (hi << 16) | u32::from(self.word())
    }

    fn immediate(&mut self, size: Size) -> u32 {
        match size {
            Size::Byte => u32::from(self.word() & 0xFF),
            Size::Word => u32::from(self.word()),
            Size::Long => self.long(),
        }
    }

    fn index(ext: u16) -> (IndexReg, i8) {
        let index = IndexReg {
            reg: ((ext >> 12) & 0x0F) as u8,
            long: ext & 0x0800 != 0,
        };
        (index, ext as u8 as i8)
    }

    /// Decode the effective address in `mode`/`reg`, reading its
    /// extension words, if the mode is one of `allowed`.
    fn ea(&mut self, mode: u16, reg: u16, size: Size, allowed: u16) -> Option<Ea> {
        if mode_bit(mode, reg) & allowed == 0 {
            return None;
        }
        let r = reg as u8;
        Some(match mode {
            0 => Ea::D(r),
            1 => Ea::A(r),
            2 => Ea::Ind(r),
            3 => Ea::PostInc(r),
            4 => Ea::PreDec(r),
            5 => Ea::Disp(r, self.word() as i16),
            6 => {
                let (index, disp) = Self::index(self.word());
                Ea::Index(r, index, disp)
            }
            _ => match reg {
                0 => Ea::AbsW(self.word() as i16 as i32 as u32),
                1 => Ea::AbsL(self.long()),
                2 => {
                    let base = self.pos as u8;
                    Ea::PcDisp {
                        base,
                        disp: self.word() as i16,
                    }
                }
                3 => {
                    let base = self.pos as u8;
                    let (index, disp) = Self::index(self.word());
                    Ea::PcIndex { base, index, disp }
                }
                _ => Ea::Imm(self.immediate(size)),
            },
        })
    }

    /// Effective address from the low six bits of the opcode.
    fn ea_low(&mut self, size: Size, allowed: u16) -> Option<Ea> {
        let op = self.opcode;
        self.ea((op >> 3) & 7, op & 7, size, allowed)
    }

    const fn reg_high(&self) -> u8 {
        ((self.opcode >> 9) & 7) as u8
    }

    const fn reg_low(&self) -> u8 {
        (self.opcode & 7) as u8
    }

    fn inst(&self, mnemonic: Mnemonic, size: Option<Size>, src: Operand, dst: Operand) -> Instruction {
        Instruction {
            mnemonic,
            size,
            src,
            dst,
            cond: Cond::T,
            opcode: self.opcode,
            len: self.pos as u8,
        }
    }

    fn decode(&mut self) -> Option<Instruction> {
        match self.opcode >> 12 {
            0x0 => self.line0(),
            0x1..=0x3 => self.moves(),
            0x4 => self.line4(),
            0x5 => self.line5(),
            0x6 => self.branch(),
            0x7 => self.moveq(),
            0x8 => self.or_div(),
            0x9 => self.add_sub(Mnemonic::Sub, Mnemonic::Suba, Mnemonic::Subx),
            0xA => Some(self.inst(Mnemonic::LineA, None, Operand::None, Operand::None)),
            0xB => self.cmp_eor(),
            0xC => self.and_mul(),
            0xD => self.add_sub(Mnemonic::Add, Mnemonic::Adda, Mnemonic::Addx),
            0xE => self.shift(),
            _ => Some(self.inst(Mnemonic::LineF, None, Operand::None, Operand::None)),
        }
    }

    fn line0(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let mode = (op >> 3) & 7;
        if op & 0x0100 != 0 {
            if mode == 1 {
                let size = if op & 0x40 != 0 { Size::Long } else { Size::Word };
                let mem = Operand::Ea(Ea::Disp(self.reg_low(), self.word() as i16));
                let data = Operand::Ea(Ea::D(self.reg_high()));
                let (src, dst) = if op & 0x80 != 0 { (data, mem) } else { (mem, data) };
                return Some(self.inst(Mnemonic::Movep, Some(size), src, dst));
            }
            let mnemonic = bit_mnemonic(op >> 6);
            let allowed = if mnemonic == Mnemonic::Btst { DATA } else { DATA_ALT };
            let dst = self.ea_low(Size::Byte, allowed)?;
            let size = if mode == 0 { Size::Long } else { Size::Byte };
            let src = Operand::Ea(Ea::D(self.reg_high()));
            return Some(self.inst(mnemonic, Some(size), src, Operand::Ea(dst)));
        }

        let kind = (op >> 9) & 7;
        if kind == 4 {
            let bit = u32::from(self.word() & 0xFF);
            let mnemonic = bit_mnemonic(op >> 6);
            let allowed = if mnemonic == Mnemonic::Btst {
                DATA & !IMMEDIATE
            } else {
                DATA_ALT
            };
            let dst = self.ea_low(Size::Byte, allowed)?;
            let size = if mode == 0 { Size::Long } else { Size::Byte };
            return Some(self.inst(mnemonic, Some(size), Operand::Ea(Ea::Imm(bit)), Operand::Ea(dst)));
        }

        let mnemonic = match kind {
            0 => Mnemonic::Ori,
            1 => Mnemonic::Andi,
            2 => Mnemonic::Subi,
            3 => Mnemonic::Addi,
            5 => Mnemonic::Eori,
            6 => Mnemonic::Cmpi,
            _ => return None,
        };
        let size = size_field(op >> 6)?;
        let logical = matches!(mnemonic, Mnemonic::Ori | Mnemonic::Andi | Mnemonic::Eori);
        if logical && op & 0x3F == 0x3C {
            let imm = u32::from(self.word());
            return match size {
                Size::Byte => Some(self.inst(mnemonic, Some(size), Operand::Ea(Ea::Imm(imm & 0xFF)), Operand::Ccr)),
                Size::Word => Some(self.inst(mnemonic, Some(size), Operand::Ea(Ea::Imm(imm)), Operand::Sr)),
                Size::Long => None,
            };
        }
        let imm = self.immediate(size);
        let dst = self.ea_low(size, DATA_ALT)?;
        Some(self.inst(mnemonic, Some(size), Operand::Ea(Ea::Imm(imm)), Operand::Ea(dst)))
    }

    fn moves(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let size = match op >> 12 {
            1 => Size::Byte,
            3 => Size::Word,
            _ => Size::Long,
        };
        let src = self.ea_low(size, if size == Size::Byte { DATA } else { ALL })?;
        let dst_mode = (op >> 6) & 7;
        if dst_mode == 1 {
            if size == Size::Byte {
                return None;
            }
            let dst = Operand::Ea(Ea::A(self.reg_high()));
            return Some(self.inst(Mnemonic::Movea, Some(size), Operand::Ea(src), dst));
        }
        let dst = self.ea(dst_mode, u16::from(self.reg_high()), size, DATA_ALT)?;
        Some(self.inst(Mnemonic::Move, Some(size), Operand::Ea(src), Operand::Ea(dst)))
    }

    fn line4(&mut self) -> Option<Instruction> {
        use Mnemonic as M;
        let op = self.opcode;
        let none = Operand::None;
        let simple = match op {
            0x4AFC => Some(M::Illegal),
            0x4E70 => Some(M::Reset),
            0x4E71 => Some(M::Nop),
            0x4E73 => Some(M::Rte),
            0x4E75 => Some(M::Rts),
            0x4E76 => Some(M::Trapv),
            0x4E77 => Some(M::Rtr),
            _ => None,
        };
        if let Some(mnemonic) = simple {
            return Some(self.inst(mnemonic, None, none, none));
        }
        if op == 0x4E72 {
            let sr = Operand::Ea(Ea::Imm(u32::from(self.word())));
            return Some(self.inst(M::Stop, None, sr, none));
        }

        let an = Operand::Ea(Ea::A(self.reg_low()));
        match op & 0xFFF8 {
            0x4E40 | 0x4E48 => {
                return Some(self.inst(M::Trap, None, Operand::Ea(Ea::Imm(u32::from(op & 0x0F))), none));
            }
            0x4E50 => {
                let disp = self.word() as i16 as i32 as u32;
                return Some(self.inst(M::Link, None, an, Operand::Ea(Ea::Imm(disp))));
            }
            0x4E58 => return Some(self.inst(M::Unlk, None, an, none)),
            0x4E60 => return Some(self.inst(M::Move, Some(Size::Long), an, Operand::Usp)),
            0x4E68 => return Some(self.inst(M::Move, Some(Size::Long), Operand::Usp, an)),
            _ => {}
        }

        let mode = (op >> 3) & 7;
        let dn = Operand::Ea(Ea::D(self.reg_low()));
        match op & 0xFFC0 {
            0x4E80 | 0x4EC0 => {
                let target = self.ea_low(Size::Long, CONTROL)?;
                let mnemonic = if op & 0x40 == 0 { M::Jsr } else { M::Jmp };
                return Some(self.inst(mnemonic, None, Operand::Ea(target), none));
            }
            0x40C0 => {
                let dst = self.ea_low(Size::Word, DATA_ALT)?;
                return Some(self.inst(M::Move, Some(Size::Word), Operand::Sr, Operand::Ea(dst)));
            }
            0x44C0 => {
                let src = self.ea_low(Size::Word, DATA)?;
                return Some(self.inst(M::Move, Some(Size::Word), Operand::Ea(src), Operand::Ccr));
            }
            0x46C0 => {
                let src = self.ea_low(Size::Word, DATA)?;
                return Some(self.inst(M::Move, Some(Size::Word), Operand::Ea(src), Operand::Sr));
            }
            0x4800 => {
                let dst = self.ea_low(Size::Byte, DATA_ALT)?;
                return Some(self.inst(M::Nbcd, Some(Size::Byte), none, Operand::Ea(dst)));
            }
            0x4840 if mode == 0 => return Some(self.inst(M::Swap, None, none, dn)),
            0x4840 => {
                let src = self.ea_low(Size::Long, CONTROL)?;
                return Some(self.inst(M::Pea, None, Operand::Ea(src), none));
            }
            0x4880 | 0x48C0 if mode == 0 => {
                let size = if op & 0x40 != 0 { Size::Long } else { Size::Word };
                return Some(self.inst(M::Ext, Some(size), none, dn));
            }
            0x4880 | 0x48C0 | 0x4C80 | 0x4CC0 => {
                let size = if op & 0x40 != 0 { Size::Long } else { Size::Word };
                let mask = Operand::RegList(self.word());
                return if op & 0x0400 == 0 {
                    let dst = self.ea_low(size, CTRL_ALT | PREDEC)?;
                    Some(self.inst(M::Movem, Some(size), mask, Operand::Ea(dst)))
                } else {
                    let src = self.ea_low(size, CONTROL | POSTINC)?;
                    Some(self.inst(M::Movem, Some(size), Operand::Ea(src), mask))
                };
            }
            0x4AC0 => {
                let dst = self.ea_low(Size::Byte, DATA_ALT)?;
                return Some(self.inst(M::Tas, Some(Size::Byte), none, Operand::Ea(dst)));
            }
            _ => {}
        }

        match op & 0xF1C0 {
            0x41C0 => {
                let src = self.ea_low(Size::Long, CONTROL)?;
                let dst = Operand::Ea(Ea::A(self.reg_high()));
                return Some(self.inst(M::Lea, None, Operand::Ea(src), dst));
            }
            0x4180 => {
                let src = self.ea_low(Size::Word, DATA)?;
                let dst = Operand::Ea(Ea::D(self.reg_high()));
                return Some(self.inst(M::Chk, Some(Size::Word), Operand::Ea(src), dst));
            }
            _ => {}
        }

        let mnemonic = match op & 0xFF00 {
            0x4000 => M::Negx,
            0x4200 => M::Clr,
            0x4400 => M::Neg,
            0x4600 => M::Not,
            0x4A00 => M::Tst,
            _ => return None,
        };
        let size = size_field(op >> 6)?;
        let dst = self.ea_low(size, DATA_ALT)?;
        Some(self.inst(mnemonic, Some(size), none, Operand::Ea(dst)))
    }

    fn line5(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let Some(size) = size_field(op >> 6) else {
            let cond = Cond::from_bits(op >> 8);
            let mut inst = if (op >> 3) & 7 == 1 {
                let disp = self.word() as i16;
                let dn = Operand::Ea(Ea::D(self.reg_low()));
                self.inst(Mnemonic::Dbcc, None, dn, Operand::Branch(disp))
            } else {
                let dst = self.ea_low(Size::Byte, DATA_ALT)?;
                self.inst(Mnemonic::Scc, Some(Size::Byte), Operand::None, Operand::Ea(dst))
            };
            inst.cond = cond;
            return Some(inst);
        };
        let data = match u32::from(self.reg_high()) {
            0 => 8,
            n => n,
        };
        let allowed = if size == Size::Byte { DATA_ALT } else { ALTERABLE };
        let dst = self.ea_low(size, allowed)?;
        let mnemonic = if op & 0x0100 == 0 {
            Mnemonic::Addq
        } else {
            Mnemonic::Subq
        };
        Some(self.inst(mnemonic, Some(size), Operand::Ea(Ea::Imm(data)), Operand::Ea(dst)))
    }

    fn branch(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let short = op as u8 as i8;
        let (size, disp) = if short == 0 {
            (Size::Word, self.word() as i16)
        } else {
            (Size::Byte, i16::from(short))
        };
        let cond = Cond::from_bits(op >> 8);
        let mnemonic = match cond {
            Cond::T => Mnemonic::Bra,
            Cond::F => Mnemonic::Bsr,
            _ => Mnemonic::Bcc,
        };
        let mut inst = self.inst(mnemonic, Some(size), Operand::None, Operand::Branch(disp));
        inst.cond = cond;
        Some(inst)
    }

    fn moveq(&self) -> Option<Instruction> {
        let op = self.opcode;
        if op & 0x0100 != 0 {
            return None;
        }
        let value = op as u8 as i8 as i32 as u32;
        let dst = Operand::Ea(Ea::D(self.reg_high()));
        Some(self.inst(Mnemonic::Moveq, Some(Size::Long), Operand::Ea(Ea::Imm(value)), dst))
    }

    /// Shared shape of lines 8 and C: Dn/ea logic ops, a word multiply or
    /// divide in opmodes 3 and 7, and a BCD op in the register-pair slot.
    fn logic(&mut self, logic: Mnemonic, unsigned: Mnemonic, signed: Mnemonic, bcd: Mnemonic) -> Option<Instruction> {
        let op = self.opcode;
        let dn = Operand::Ea(Ea::D(self.reg_high()));
        match (op >> 6) & 7 {
            3 | 7 => {
                let mnemonic = if op & 0x0100 == 0 { unsigned } else { signed };
                let src = self.ea_low(Size::Word, DATA)?;
                return Some(self.inst(mnemonic, Some(Size::Word), Operand::Ea(src), dn));
            }
            _ => {}
        }
        if op & 0x01F0 == 0x0100 {
            let (src, dst) = self.register_pair();
            return Some(self.inst(bcd, Some(Size::Byte), src, dst));
        }
        let size = size_field(op >> 6)?;
        if op & 0x0100 == 0 {
            let src = self.ea_low(size, DATA)?;
            Some(self.inst(logic, Some(size), Operand::Ea(src), dn))
        } else {
            let dst = self.ea_low(size, MEM_ALT)?;
            Some(self.inst(logic, Some(size), dn, Operand::Ea(dst)))
        }
    }

    /// `Dy,Dx` or `-(Ay),-(Ax)` of the extended arithmetic instructions.
    fn register_pair(&self) -> (Operand, Operand) {
        let (x, y) = (self.reg_high(), self.reg_low());
        if self.opcode & 0x08 != 0 {
            (Operand::Ea(Ea::PreDec(y)), Operand::Ea(Ea::PreDec(x)))
        } else {
            (Operand::Ea(Ea::D(y)), Operand::Ea(Ea::D(x)))
        }
    }

    fn or_div(&mut self) -> Option<Instruction> {
        self.logic(Mnemonic::Or, Mnemonic::Divu, Mnemonic::Divs, Mnemonic::Sbcd)
    }

    fn and_mul(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let (x, y) = (self.reg_high(), self.reg_low());
        let exg = match op & 0x01F8 {
            0x0140 => Some((Ea::D(x), Ea::D(y))),
            0x0148 => Some((Ea::A(x), Ea::A(y))),
            0x0188 => Some((Ea::D(x), Ea::A(y))),
            _ => None,
        };
        if let Some((a, b)) = exg {
            return Some(self.inst(Mnemonic::Exg, Some(Size::Long), Operand::Ea(a), Operand::Ea(b)));
        }
        self.logic(Mnemonic::And, Mnemonic::Mulu, Mnemonic::Muls, Mnemonic::Abcd)
    }

    fn add_sub(&mut self, plain: Mnemonic, address: Mnemonic, extended: Mnemonic) -> Option<Instruction> {
        let op = self.opcode;
        match (op >> 6) & 7 {
            3 | 7 => {
                let size = if op & 0x0100 == 0 { Size::Word } else { Size::Long };
                let src = self.ea_low(size, ALL)?;
                let dst = Operand::Ea(Ea::A(self.reg_high()));
                return Some(self.inst(address, Some(size), Operand::Ea(src), dst));
            }
            _ => {}
        }
        let size = size_field(op >> 6)?;
        if op & 0x0130 == 0x0100 {
            let (src, dst) = self.register_pair();
            return Some(self.inst(extended, Some(size), src, dst));
        }
        let dn = Operand::Ea(Ea::D(self.reg_high()));
        if op & 0x0100 == 0 {
            let src = self.ea_low(size, if size == Size::Byte { DATA } else { ALL })?;
            Some(self.inst(plain, Some(size), Operand::Ea(src), dn))
        } else {
            let dst = self.ea_low(size, MEM_ALT)?;
            Some(self.inst(plain, Some(size), dn, Operand::Ea(dst)))
        }
    }

    fn cmp_eor(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let (x, y) = (self.reg_high(), self.reg_low());
        match (op >> 6) & 7 {
            3 | 7 => {
                let size = if op & 0x0100 == 0 { Size::Word } else { Size::Long };
                let src = self.ea_low(size, ALL)?;
                return Some(self.inst(Mnemonic::Cmpa, Some(size), Operand::Ea(src), Operand::Ea(Ea::A(x))));
            }
            _ => {}
        }
        let size = size_field(op >> 6)?;
        if op & 0x0100 == 0 {
            let src = self.ea_low(size, if size == Size::Byte { DATA } else { ALL })?;
            return Some(self.inst(Mnemonic::Cmp, Some(size), Operand::Ea(src), Operand::Ea(Ea::D(x))));
        }
        if (op >> 3) & 7 == 1 {
            let src = Operand::Ea(Ea::PostInc(y));
            return Some(self.inst(Mnemonic::Cmpm, Some(size), src, Operand::Ea(Ea::PostInc(x))));
        }
        let dst = self.ea_low(size, DATA_ALT)?;
        Some(self.inst(Mnemonic::Eor, Some(size), Operand::Ea(Ea::D(x)), Operand::Ea(dst)))
    }

    fn shift(&mut self) -> Option<Instruction> {
        let op = self.opcode;
        let left = op & 0x0100 != 0;
        let (kind, size, src, dst) = if let Some(size) = size_field(op >> 6) {
            let count = self.reg_high();
            let src = if op & 0x20 != 0 {
                Ea::D(count)
            } else {
                Ea::Imm(if count == 0 { 8 } else { u32::from(count) })
            };
            ((op >> 3) & 3, size, Operand::Ea(src), Ea::D(self.reg_low()))
        } else {
            if op & 0x0800 != 0 {
                return None;
            }
            let dst = self.ea_low(Size::Word, MEM_ALT)?;
            ((op >> 9) & 3, Size::Word, Operand::None, dst)
        };
        let mnemonic = match (kind, left) {
            (0, true) => Mnemonic::Asl,
            (0, false) => Mnemonic::Asr,
            (1, true) => Mnemonic::Lsl,
            (1, false) => Mnemonic::Lsr,
            (2, true) => Mnemonic::Roxl,
            (2, false) => Mnemonic::Roxr,
            (_, true) => Mnemonic::Rol,
            (_, false) => Mnemonic::Ror,
        };
        Some(self.inst(mnemonic, Some(size), src, Operand::Ea(dst)))
    }
}

/// Decode the instruction at the start of `bytes`. Missing bytes read as zero.
#[must_use]
pub fn decode(bytes: &[u8]) -> Instruction {
    let mut decoder = Decoder {
        bytes,
        pos: 0,
        opcode: 0,
    };
    let opcode = decoder.word();
    decoder.opcode = opcode;
    decoder.decode().unwrap_or(Instruction::invalid(opcode))
}
