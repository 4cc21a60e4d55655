//! Zilog-syntax disassembly, lower case with `$` hex.

use std::fmt::Write;

use crate::inst::{Cond, Instruction, Mnemonic, Operand, Reg8, Reg16};

const fn mnemonic(m: Mnemonic) -> &'static str {
    match m {
        Mnemonic::Nop => "nop",
        Mnemonic::Ld => "ld",
        Mnemonic::Push => "push",
        Mnemonic::Pop => "pop",
        Mnemonic::Ex => "ex",
        Mnemonic::Exx => "exx",
        Mnemonic::Ldi => "ldi",
        Mnemonic::Ldir => "ldir",
        Mnemonic::Ldd => "ldd",
        Mnemonic::Lddr => "lddr",
        Mnemonic::Cpi => "cpi",
        Mnemonic::Cpir => "cpir",
        Mnemonic::Cpd => "cpd",
        Mnemonic::Cpdr => "cpdr",
        Mnemonic::Add => "add",
        Mnemonic::Adc => "adc",
        Mnemonic::Sub => "sub",
        Mnemonic::Sbc => "sbc",
        Mnemonic::And => "and",
        Mnemonic::Xor => "xor",
        Mnemonic::Or => "or",
        Mnemonic::Cp => "cp",
        Mnemonic::Inc => "inc",
        Mnemonic::Dec => "dec",
        Mnemonic::Daa => "daa",
        Mnemonic::Cpl => "cpl",
        Mnemonic::Neg => "neg",
        Mnemonic::Ccf => "ccf",
        Mnemonic::Scf => "scf",
        Mnemonic::Halt => "halt",
        Mnemonic::Di => "di",
        Mnemonic::Ei => "ei",
        Mnemonic::Im => "im",
        Mnemonic::Rlca => "rlca",
        Mnemonic::Rla => "rla",
        Mnemonic::Rrca => "rrca",
        Mnemonic::Rra => "rra",
        Mnemonic::Rlc => "rlc",
        Mnemonic::Rl => "rl",
        Mnemonic::Rrc => "rrc",
        Mnemonic::Rr => "rr",
        Mnemonic::Sla => "sla",
        Mnemonic::Sra => "sra",
        Mnemonic::Sll => "sll",
        Mnemonic::Srl => "srl",
        Mnemonic::Rld => "rld",
        Mnemonic::Rrd => "rrd",
        Mnemonic::Bit => "bit",
        Mnemonic::Set => "set",
        Mnemonic::Res => "res",
        Mnemonic::Jp => "jp",
        Mnemonic::Jr => "jr",
        Mnemonic::Djnz => "djnz",
        Mnemonic::Call => "call",
        Mnemonic::Ret => "ret",
        Mnemonic::Reti => "reti",
        Mnemonic::Retn => "retn",
        Mnemonic::Rst => "rst",
        Mnemonic::In => "in",
        Mnemonic::Ini => "ini",
        Mnemonic::Inir => "inir",
        Mnemonic::Ind => "ind",
        Mnemonic::Indr => "indr",
        Mnemonic::Out => "out",
        Mnemonic::Outi => "outi",
        Mnemonic::Otir => "otir",
        Mnemonic::Outd => "outd",
        Mnemonic::Otdr => "otdr",
    }
}

const fn reg8(r: Reg8) -> &'static str {
    match r {
        Reg8::B => "b",
        Reg8::C => "c",
        Reg8::D => "d",
        Reg8::E => "e",
        Reg8::H => "h",
        Reg8::L => "l",
        Reg8::A => "a",
        Reg8::Ixh => "ixh",
        Reg8::Ixl => "ixl",
        Reg8::Iyh => "iyh",
        Reg8::Iyl => "iyl",
        Reg8::I => "i",
        Reg8::R => "r",
    }
}

const fn reg16(r: Reg16) -> &'static str {
    match r {
        Reg16::Bc => "bc",
        Reg16::De => "de",
        Reg16::Hl => "hl",
        Reg16::Sp => "sp",
        Reg16::Af => "af",
        Reg16::Ix => "ix",
        Reg16::Iy => "iy",
    }
}

const fn cond(c: Cond) -> &'static str {
    match c {
        Cond::Nz => "nz",
        Cond::Z => "z",
        Cond::Nc => "nc",
        Cond::C => "c",
        Cond::Po => "po",
        Cond::Pe => "pe",
        Cond::P => "p",
        Cond::M => "m",
    }
}

fn operand(op: Operand, next: u16) -> String {
    match op {
        Operand::None => String::new(),
        Operand::Reg8(r) => reg8(r).to_string(),
        Operand::Reg16(r) => reg16(r).to_string(),
        Operand::Imm8(n) => format!("${n:02X}"),
        Operand::Imm16(n) => format!("${n:04X}"),
        Operand::Ind(r) => format!("({})", reg16(r)),
        Operand::Indexed(r, d) if d < 0 => format!("({}-${:02X})", reg16(r), d.unsigned_abs()),
        Operand::Indexed(r, d) => format!("({}+${d:02X})", reg16(r)),
        Operand::Abs(n) => format!("(${n:04X})"),
        Operand::Port(n) => format!("(${n:02X})"),
        Operand::Rel(d) => format!("${:04X}", next.wrapping_add_signed(i16::from(d))),
        Operand::PortC => "(c)".to_string(),
        Operand::Cond(c) => cond(c).to_string(),
        Operand::Bit(n) | Operand::Mode(n) => n.to_string(),
        Operand::AfAlt => "af'".to_string(),
    }
}

/// Render `inst`, located at `pc`, as assembler text.
#[must_use]
pub fn disassemble(inst: &Instruction, pc: u16) -> String {
    let next = pc.wrapping_add(u16::from(inst.len));
    // SUB/AND/XOR/OR/CP name A implicitly.
    let implicit_a = matches!(
        inst.mnemonic,
        Mnemonic::Sub | Mnemonic::And | Mnemonic::Xor | Mnemonic::Or | Mnemonic::Cp
    );
    let operands: Vec<String> = [
        if implicit_a { Operand::None } else { inst.dst },
        inst.src,
    ]
    .into_iter()
    .filter(|op| *op != Operand::None)
    .map(|op| operand(op, next))
    .chain(inst.copy.map(|r| reg8(r).to_string()))
    .collect();

    let mut text = mnemonic(inst.mnemonic).to_string();
    if !operands.is_empty() {
        let _ = write!(text, " {}", operands.join(", "));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    #[test]
    fn relative_targets_are_absolute() {
        assert_eq!(disassemble(&decode(&[0x18, 0xFE, 0, 0]), 0x0100), "jr $0100");
        assert_eq!(disassemble(&decode(&[0x10, 0x05, 0, 0]), 0x0200), "djnz $0207");
    }
}
