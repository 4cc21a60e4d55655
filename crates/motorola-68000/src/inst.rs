//! Decoded 68000 instructions.

use crate::flags::Cond;

/// Operation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 4,
        }
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Long => 0xFFFF_FFFF,
        }
    }

    #[must_use]
    pub const fn msb(self) -> u32 {
        match self {
            Self::Byte => 0x80,
            Self::Word => 0x8000,
            Self::Long => 0x8000_0000,
        }
    }

    /// Sign-extend the low bits of `value` to 32 bits.
    #[must_use]
    pub const fn sign_extend(self, value: u32) -> u32 {
        match self {
            Self::Byte => value as u8 as i8 as i32 as u32,
            Self::Word => value as u16 as i16 as i32 as u32,
            Self::Long => value,
        }
    }

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Byte => ".b",
            Self::Word => ".w",
            Self::Long => ".l",
        }
    }
}

/// Index register of a `d8(An,Xn)` or `d8(PC,Xn)` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReg {
    /// 0-7 for D0-D7, 8-15 for A0-A7.
    pub reg: u8,
    /// Whole register rather than the sign-extended low word.
    pub long: bool,
}

/// Effective address with its extension words already read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ea {
    D(u8),
    A(u8),
    Ind(u8),
    PostInc(u8),
    PreDec(u8),
    Disp(u8, i16),
    Index(u8, IndexReg, i8),
    /// `(xxx).W`, already sign-extended.
    AbsW(u32),
    AbsL(u32),
    /// `d16(PC)`. `base` is the byte offset of the extension word from the
    /// start of the instruction, which is what PC holds when it is read.
    PcDisp { base: u8, disp: i16 },
    PcIndex { base: u8, index: IndexReg, disp: i8 },
    Imm(u32),
}

impl Ea {
    #[must_use]
    pub const fn is_register(self) -> bool {
        matches!(self, Self::D(_) | Self::A(_))
    }

    /// Effective-address calculation time (Motorola's "EA" column), in
    /// CPU clocks, excluding the operand access itself for registers.
    #[must_use]
    pub const fn calc_cycles(self, size: Size) -> u32 {
        let long = matches!(size, Size::Long);
        let base = match self {
            Self::D(_) | Self::A(_) => return 0,
            Self::Ind(_) | Self::PostInc(_) | Self::Imm(_) => 4,
            Self::PreDec(_) => 6,
            Self::Disp(..) | Self::AbsW(_) | Self::PcDisp { .. } => 8,
            Self::Index(..) | Self::PcIndex { .. } => 10,
            Self::AbsL(_) => 12,
        };
        if long { base + 4 } else { base }
    }

    /// Time for a MOVE destination write; `-(An)` has no extra decrement cost.
    #[must_use]
    pub const fn write_cycles(self, size: Size) -> u32 {
        match self {
            Self::PreDec(_) => {
                if matches!(size, Size::Long) {
                    8
                } else {
                    4
                }
            }
            other => other.calc_cycles(size),
        }
    }

    /// Control addressing cost shared by JMP, JSR, LEA and PEA. Returns
    /// the column index into their timing rows.
    #[must_use]
    pub const fn control_class(self) -> usize {
        match self {
            Self::Ind(_) => 0,
            Self::Disp(..) => 1,
            Self::Index(..) => 2,
            Self::AbsW(_) => 3,
            Self::AbsL(_) => 4,
            Self::PcDisp { .. } => 5,
            _ => 6,
        }
    }
}

/// Anything that can appear as an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Ea(Ea),
    /// MOVEM register mask in the instruction's own bit order.
    RegList(u16),
    Ccr,
    Sr,
    Usp,
    /// Branch displacement relative to the address after the opcode word.
    Branch(i16),
}

impl Operand {
    #[must_use]
    pub const fn ea(self) -> Option<Ea> {
        match self {
            Self::Ea(ea) => Some(ea),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Abcd,
    Add,
    Adda,
    Addi,
    Addq,
    Addx,
    And,
    Andi,
    Asl,
    Asr,
    Bcc,
    Bchg,
    Bclr,
    Bra,
    Bset,
    Bsr,
    Btst,
    Chk,
    Clr,
    Cmp,
    Cmpa,
    Cmpi,
    Cmpm,
    Dbcc,
    Divs,
    Divu,
    Eor,
    Eori,
    Exg,
    Ext,
    Illegal,
    Jmp,
    Jsr,
    Lea,
    Link,
    Lsl,
    Lsr,
    Move,
    Movea,
    Movem,
    Movep,
    Moveq,
    Muls,
    Mulu,
    Nbcd,
    Neg,
    Negx,
    Nop,
    Not,
    Or,
    Ori,
    Pea,
    Reset,
    Rol,
    Ror,
    Roxl,
    Roxr,
    Rte,
    Rtr,
    Rts,
    Sbcd,
    Scc,
    Stop,
    Sub,
    Suba,
    Subi,
    Subq,
    Subx,
    Swap,
    Tas,
    Trap,
    Trapv,
    Tst,
    Unlk,
    /// Opcodes 0xAxxx, which trap through vector 10.
    LineA,
    /// Opcodes 0xFxxx, which trap through vector 11.
    LineF,
    /// No valid encoding.
    Invalid,
}

/// A decoded 68000 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    /// `None` for unsized instructions.
    pub size: Option<Size>,
    pub src: Operand,
    pub dst: Operand,
    /// Condition of Bcc, DBcc and Scc.
    pub cond: Cond,
    pub opcode: u16,
    /// Encoded length in bytes, extension words included.
    pub len: u8,
}

impl Instruction {
    pub(crate) const fn invalid(opcode: u16) -> Self {
        Self {
            mnemonic: Mnemonic::Invalid,
            size: None,
            src: Operand::None,
            dst: Operand::None,
            cond: Cond::T,
            opcode,
            len: 2,
        }
    }

    /// Operation size, word when the instruction is unsized.
    #[must_use]
    pub fn size_or_word(&self) -> Size {
        self.size.unwrap_or(Size::Word)
    }

    /// Whether execution never falls through to the next instruction.
    #[must_use]
    pub const fn ends_block(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Bra
                | Mnemonic::Jmp
                | Mnemonic::Rts
                | Mnemonic::Rte
                | Mnemonic::Rtr
                | Mnemonic::Trap
                | Mnemonic::Illegal
                | Mnemonic::LineA
                | Mnemonic::LineF
                | Mnemonic::Stop
                | Mnemonic::Invalid
        )
    }
}
