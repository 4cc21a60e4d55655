//! Canonical decoded instruction.

/// 8-bit registers, including the undocumented index halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
}

/// 16-bit registers and register pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    Bc,
    De,
    Hl,
    Sp,
    Af,
    Ix,
    Iy,
}

/// Branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

/// Operand descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operand {
    #[default]
    None,
    Reg8(Reg8),
    Reg16(Reg16),
    Imm8(u8),
    Imm16(u16),
    /// `(rr)`
    Ind(Reg16),
    /// `(ix+d)` / `(iy+d)`
    Indexed(Reg16, i8),
    /// `(nn)`
    Abs(u16),
    /// `(n)` in IN/OUT
    Port(u8),
    /// Relative branch displacement, from the end of the instruction.
    Rel(i8),
    /// `(c)` in IN/OUT
    PortC,
    Cond(Cond),
    Bit(u8),
    /// Interrupt mode for IM.
    Mode(u8),
    /// The shadow AF of `ex af, af'`.
    AfAlt,
}

/// Instruction tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Nop,
    Ld,
    Push,
    Pop,
    Ex,
    Exx,
    Ldi,
    Ldir,
    Ldd,
    Lddr,
    Cpi,
    Cpir,
    Cpd,
    Cpdr,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Inc,
    Dec,
    Daa,
    Cpl,
    Neg,
    Ccf,
    Scf,
    Halt,
    Di,
    Ei,
    Im,
    Rlca,
    Rla,
    Rrca,
    Rra,
    Rlc,
    Rl,
    Rrc,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
    Rld,
    Rrd,
    Bit,
    Set,
    Res,
    Jp,
    Jr,
    Djnz,
    Call,
    Ret,
    Reti,
    Retn,
    Rst,
    In,
    Ini,
    Inir,
    Ind,
    Indr,
    Out,
    Outi,
    Otir,
    Outd,
    Otdr,
}

/// A decoded Z80 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub dst: Operand,
    pub src: Operand,
    /// Undocumented DDCB/FDCB forms also copy the result to a register.
    pub copy: Option<Reg8>,
    /// Encoded length in bytes.
    pub len: u8,
    /// Base T-states (branch not taken, block op not repeating).
    pub cycles: u8,
}

impl Instruction {
    /// Whether control never falls through to the next instruction.
    #[must_use]
    pub const fn ends_block(&self) -> bool {
        match self.mnemonic {
            Mnemonic::Jp | Mnemonic::Jr | Mnemonic::Ret => !matches!(self.dst, Operand::Cond(_)),
            Mnemonic::Reti | Mnemonic::Retn | Mnemonic::Rst | Mnemonic::Halt => true,
            _ => false,
        }
    }
}
