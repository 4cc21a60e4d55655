//! Motorola-syntax disassembly, lower case with `$` hex.

use std::fmt::Write;

use crate::inst::{Ea, IndexReg, Instruction, Mnemonic, Operand, Size};

const fn mnemonic(m: Mnemonic) -> &'static str {
    match m {
        Mnemonic::Abcd => "abcd",
        Mnemonic::Add => "add",
        Mnemonic::Adda => "adda",
        Mnemonic::Addi => "addi",
        Mnemonic::Addq => "addq",
        Mnemonic::Addx => "addx",
        Mnemonic::And => "and",
        Mnemonic::Andi => "andi",
        Mnemonic::Asl => "asl",
        Mnemonic::Asr => "asr",
        Mnemonic::Bcc => "b",
        Mnemonic::Bchg => "bchg",
        Mnemonic::Bclr => "bclr",
        Mnemonic::Bra => "bra",
        Mnemonic::Bset => "bset",
        Mnemonic::Bsr => "bsr",
        Mnemonic::Btst => "btst",
        Mnemonic::Chk => "chk",
        Mnemonic::Clr => "clr",
        Mnemonic::Cmp => "cmp",
        Mnemonic::Cmpa => "cmpa",
        Mnemonic::Cmpi => "cmpi",
        Mnemonic::Cmpm => "cmpm",
        Mnemonic::Dbcc => "db",
        Mnemonic::Divs => "divs",
        Mnemonic::Divu => "divu",
        Mnemonic::Eor => "eor",
        Mnemonic::Eori => "eori",
        Mnemonic::Exg => "exg",
        Mnemonic::Ext => "ext",
        Mnemonic::Illegal => "illegal",
        Mnemonic::Jmp => "jmp",
        Mnemonic::Jsr => "jsr",
        Mnemonic::Lea => "lea",
        Mnemonic::Link => "link",
        Mnemonic::Lsl => "lsl",
        Mnemonic::Lsr => "lsr",
        Mnemonic::Move => "move",
        Mnemonic::Movea => "movea",
        Mnemonic::Movem => "movem",
        Mnemonic::Movep => "movep",
        Mnemonic::Moveq => "moveq",
        Mnemonic::Muls => "muls",
        Mnemonic::Mulu => "mulu",
        Mnemonic::Nbcd => "nbcd",
        Mnemonic::Neg => "neg",
        Mnemonic::Negx => "negx",
        Mnemonic::Nop => "nop",
        Mnemonic::Not => "not",
        Mnemonic::Or => "or",
        Mnemonic::Ori => "ori",
        Mnemonic::Pea => "pea",
        Mnemonic::Reset => "reset",
        Mnemonic::Rol => "rol",
        Mnemonic::Ror => "ror",
        Mnemonic::Roxl => "roxl",
        Mnemonic::Roxr => "roxr",
        Mnemonic::Rte => "rte",
        Mnemonic::Rtr => "rtr",
        Mnemonic::Rts => "rts",
        Mnemonic::Sbcd => "sbcd",
        Mnemonic::Scc => "s",
        Mnemonic::Stop => "stop",
        Mnemonic::Sub => "sub",
        Mnemonic::Suba => "suba",
        Mnemonic::Subi => "subi",
        Mnemonic::Subq => "subq",
        Mnemonic::Subx => "subx",
        Mnemonic::Swap => "swap",
        Mnemonic::Tas => "tas",
        Mnemonic::Trap => "trap",
        Mnemonic::Trapv => "trapv",
        Mnemonic::Tst => "tst",
        Mnemonic::Unlk => "unlk",
        Mnemonic::LineA => "dc.w",
        Mnemonic::LineF => "dc.w",
        Mnemonic::Invalid => "dc.w",
    }
}

/// Mnemonics whose size is implied by the operation.
const fn implicit_size(m: Mnemonic) -> bool {
    matches!(
        m,
        Mnemonic::Bcc
            | Mnemonic::Bra
            | Mnemonic::Bsr
            | Mnemonic::Moveq
            | Mnemonic::Scc
            | Mnemonic::Exg
            | Mnemonic::Nbcd
            | Mnemonic::Tas
            | Mnemonic::Abcd
            | Mnemonic::Sbcd
    )
}

fn reg(n: u8) -> String {
    if n < 8 { format!("d{n}") } else { format!("a{}", n - 8) }
}

fn index(i: IndexReg) -> String {
    format!("{}.{}", reg(i.reg), if i.long { 'l' } else { 'w' })
}

fn signed(d: i32) -> String {
    if d < 0 {
        format!("-${:X}", d.unsigned_abs())
    } else {
        format!("${d:X}")
    }
}

fn immediate(size: Option<Size>, n: u32) -> String {
    match size {
        Some(Size::Byte) => format!("#${:02X}", n as u8),
        Some(Size::Word) => format!("#${:04X}", n as u16),
        Some(Size::Long) => format!("#${n:08X}"),
        None => format!("#${n:X}"),
    }
}

fn ea(e: Ea, size: Option<Size>, pc: u32) -> String {
    match e {
        Ea::D(n) => format!("d{n}"),
        Ea::A(n) => format!("a{n}"),
        Ea::Ind(n) => format!("(a{n})"),
        Ea::PostInc(n) => format!("(a{n})+"),
        Ea::PreDec(n) => format!("-(a{n})"),
        Ea::Disp(n, d) => format!("{}(a{n})", signed(i32::from(d))),
        Ea::Index(n, i, d) => format!("{}(a{n},{})", signed(i32::from(d)), index(i)),
        Ea::AbsW(addr) => format!("(${:04X}).w", addr as u16),
        Ea::AbsL(addr) => format!("(${addr:08X}).l"),
        Ea::PcDisp { base, disp } => {
            let target = pc.wrapping_add(u32::from(base)).wrapping_add_signed(i32::from(disp));
            format!("${:06X}(pc)", target & 0x00FF_FFFF)
        }
        Ea::PcIndex { base, index: i, disp } => {
            let target = pc.wrapping_add(u32::from(base)).wrapping_add_signed(i32::from(disp));
            format!("${:06X}(pc,{})", target & 0x00FF_FFFF, index(i))
        }
        Ea::Imm(n) => immediate(size, n),
    }
}

/// `d0-d3/a6` from a mask with bit 0 = D0 and bit 15 = A7.
fn reg_list(mask: u16) -> String {
    let mut groups = Vec::new();
    let mut n = 0;
    while n < 16 {
        if mask & (1 << n) == 0 {
            n += 1;
            continue;
        }
        let start = n;
        // Runs do not cross from data into address registers.
        while n + 1 < 16 && mask & (1 << (n + 1)) != 0 && (n + 1) % 8 != 0 {
            n += 1;
        }
        if start == n {
            groups.push(reg(start));
        } else {
            groups.push(format!("{}-{}", reg(start), reg(n)));
        }
        n += 1;
    }
    groups.join("/")
}

fn operand(op: Operand, inst: &Instruction, pc: u32) -> String {
    match op {
        Operand::None => String::new(),
        Operand::Ea(e) => ea(e, inst.size, pc),
        Operand::RegList(mask) => {
            let predec = matches!(inst.dst, Operand::Ea(Ea::PreDec(_)));
            reg_list(if predec { mask.reverse_bits() } else { mask })
        }
        Operand::Ccr => "ccr".to_string(),
        Operand::Sr => "sr".to_string(),
        Operand::Usp => "usp".to_string(),
        Operand::Branch(d) => {
            let target = pc.wrapping_add(2).wrapping_add_signed(i32::from(d));
            format!("${:06X}", target & 0x00FF_FFFF)
        }
    }
}

/// Render `inst`, located at `pc`, as assembler text.
#[must_use]
pub fn disassemble(inst: &Instruction, pc: u32) -> String {
    if matches!(inst.mnemonic, Mnemonic::LineA | Mnemonic::LineF | Mnemonic::Invalid) {
        return format!("dc.w ${:04X}", inst.opcode);
    }
    let mut text = mnemonic(inst.mnemonic).to_string();
    if matches!(inst.mnemonic, Mnemonic::Bcc | Mnemonic::Dbcc | Mnemonic::Scc) {
        let _ = write!(text, "{}", inst.cond);
    }
    match inst.size {
        Some(size) if !implicit_size(inst.mnemonic) => text.push_str(size.suffix()),
        _ => {}
    }
    let operands: Vec<String> = [inst.src, inst.dst]
        .into_iter()
        .filter(|op| *op != Operand::None)
        .map(|op| operand(op, inst, pc))
        .collect();
    if !operands.is_empty() {
        let _ = write!(text, " {}", operands.join(", "));
    }
    text
}
