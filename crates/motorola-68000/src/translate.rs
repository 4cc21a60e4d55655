//! Instruction to host-op translation.

use jit_core::{BlockEnd, Emitter};

use crate::alu::ShiftOp;
use crate::cpu::M68kIsa;
use crate::inst::{Ea, Instruction, Mnemonic, Operand, Size};
use crate::ops::{AddrOp, Addr, AluOp, Base, BitOp, Loc, Op, UnaryOp, vector};

fn static_addr(address: u32, size: Size, em: &Emitter<'_, M68kIsa>) -> Addr {
    let address = if size == Size::Byte { address } else { address & !1 };
    Addr::Static(em.access(address), address)
}

/// Memory operand for `ea`. PC-relative modes become absolute here.
fn addr(ea: Ea, pc: u32, size: Size, em: &Emitter<'_, M68kIsa>) -> Option<Addr> {
    Some(match ea {
        Ea::Ind(r) => Addr::Ind(r),
        Ea::PostInc(r) => Addr::PostInc(r),
        Ea::PreDec(r) => Addr::PreDec(r),
        Ea::Disp(r, disp) => Addr::Disp(r, disp),
        Ea::Index(r, index, disp) => Addr::Index(Base::A(r), index, disp),
        Ea::AbsW(a) | Ea::AbsL(a) => static_addr(a, size, em),
        Ea::PcDisp { base, disp } => {
            let target = pc.wrapping_add(u32::from(base)).wrapping_add(disp as i32 as u32);
            static_addr(target, size, em)
        }
        Ea::PcIndex { base, index, disp } => Addr::Index(Base::Pc(pc.wrapping_add(u32::from(base))), index, disp),
        Ea::D(_) | Ea::A(_) | Ea::Imm(_) => return None,
    })
}

/// Statically known target of a control-mode operand, if it has one.
fn static_target(ea: Ea, pc: u32) -> Option<u32> {
    match ea {
        Ea::AbsW(a) | Ea::AbsL(a) => Some(a),
        Ea::PcDisp { base, disp } => Some(pc.wrapping_add(u32::from(base)).wrapping_add(disp as i32 as u32)),
        _ => None,
    }
}

fn loc(op: Operand, pc: u32, size: Size, em: &Emitter<'_, M68kIsa>) -> Option<Loc> {
    Some(match op {
        Operand::Ea(Ea::D(r)) => Loc::D(r),
        Operand::Ea(Ea::A(r)) => Loc::A(r),
        Operand::Ea(Ea::Imm(v)) => Loc::Imm(v),
        Operand::Ea(ea) => Loc::Mem(addr(ea, pc, size, em)?),
        _ => return None,
    })
}

fn ea_of(op: Operand) -> Option<Ea> {
    match op {
        Operand::Ea(ea) => Some(ea),
        _ => None,
    }
}

fn reg_of(op: Operand) -> Option<u8> {
    match op {
        Operand::Ea(Ea::D(r) | Ea::A(r)) => Some(r),
        _ => None,
    }
}

fn branch_target(inst: &Instruction, pc: u32) -> Option<u32> {
    match inst.dst {
        Operand::Branch(disp) => Some(pc.wrapping_add(2).wrapping_add(disp as i32 as u32)),
        _ => None,
    }
}

fn immediate(op: Operand) -> Option<u32> {
    match op {
        Operand::Ea(Ea::Imm(v)) => Some(v),
        _ => None,
    }
}

pub(crate) fn translate(inst: &Instruction, pc: u32, em: &mut Emitter<'_, M68kIsa>) -> BlockEnd {
    emit(inst, pc, em).unwrap_or_else(|| {
        log::error!("m68k: no translation for {inst:?} at {pc:#08X}");
        em.illegal(pc)
    })
}

/// Emit the body of `inst` at `pc`. `None` when an operand does not fit
/// its instruction.
#[allow(clippy::too_many_lines)]
fn emit(inst: &Instruction, pc: u32, em: &mut Emitter<'_, M68kIsa>) -> Option<BlockEnd> {
    use Mnemonic as M;
    let size = inst.size_or_word();
    let next = pc.wrapping_add(u32::from(inst.len));
    let src = |em: &Emitter<'_, M68kIsa>| loc(inst.src, pc, size, em);
    let dst = |em: &Emitter<'_, M68kIsa>| loc(inst.dst, pc, size, em);

    let op = match inst.mnemonic {
        M::Move => match (inst.src, inst.dst) {
            (Operand::Usp, to) => Op::MoveUsp {
                to_usp: false,
                reg: reg_of(to)?,
                pc,
            },
            (from, Operand::Usp) => Op::MoveUsp {
                to_usp: true,
                reg: reg_of(from)?,
                pc,
            },
            (Operand::Sr, _) => Op::FromSr(dst(em)?),
            (_, Operand::Sr | Operand::Ccr) => Op::ToSr {
                src: src(em)?,
                ccr_only: inst.dst == Operand::Ccr,
                pc,
            },
            _ => Op::Move {
                size,
                src: src(em)?,
                dst: dst(em)?,
            },
        },
        M::Moveq => Op::Move {
            size,
            src: src(em)?,
            dst: dst(em)?,
        },
        M::Movea => Op::MoveA {
            size,
            src: src(em)?,
            reg: reg_of(inst.dst)?,
        },

        M::Add | M::Sub | M::And | M::Or | M::Eor | M::Cmp | M::Cmpm | M::Addx | M::Subx => {
            let op = match inst.mnemonic {
                M::Add => AluOp::Add,
                M::Sub => AluOp::Sub,
                M::And => AluOp::And,
                M::Or => AluOp::Or,
                M::Eor => AluOp::Eor,
                M::Addx => AluOp::AddX,
                M::Subx => AluOp::SubX,
                _ => AluOp::Cmp,
            };
            Op::Alu {
                op,
                size,
                src: src(em)?,
                dst: dst(em)?,
            }
        }
        M::Addi | M::Subi | M::Andi | M::Ori | M::Eori | M::Cmpi => {
            let op = match inst.mnemonic {
                M::Addi => AluOp::Add,
                M::Subi => AluOp::Sub,
                M::Andi => AluOp::And,
                M::Ori => AluOp::Or,
                M::Eori => AluOp::Eor,
                _ => AluOp::Cmp,
            };
            match inst.dst {
                Operand::Ccr | Operand::Sr => Op::LogicSr {
                    op,
                    value: immediate(inst.src)? as u16,
                    ccr_only: inst.dst == Operand::Ccr,
                    pc,
                },
                _ => Op::Alu {
                    op,
                    size,
                    src: src(em)?,
                    dst: dst(em)?,
                },
            }
        }
        M::Adda | M::Suba | M::Cmpa => Op::AddrArith {
            op: match inst.mnemonic {
                M::Adda => AddrOp::Add,
                M::Suba => AddrOp::Sub,
                _ => AddrOp::Cmp,
            },
            size,
            src: src(em)?,
            reg: reg_of(inst.dst)?,
        },
        M::Addq | M::Subq => {
            let add = inst.mnemonic == M::Addq;
            match inst.dst {
                // Address registers take the whole 32 bits and keep the flags.
                Operand::Ea(Ea::A(reg)) => Op::AddrArith {
                    op: if add { AddrOp::Add } else { AddrOp::Sub },
                    size: Size::Long,
                    src: src(em)?,
                    reg,
                },
                _ => Op::Alu {
                    op: if add { AluOp::Add } else { AluOp::Sub },
                    size,
                    src: src(em)?,
                    dst: dst(em)?,
                },
            }
        }
        M::Clr | M::Neg | M::Negx | M::Not | M::Tst | M::Nbcd | M::Tas => Op::Unary {
            op: match inst.mnemonic {
                M::Clr => UnaryOp::Clr,
                M::Neg => UnaryOp::Neg,
                M::Negx => UnaryOp::NegX,
                M::Not => UnaryOp::Not,
                M::Tst => UnaryOp::Tst,
                M::Nbcd => UnaryOp::Nbcd,
                _ => UnaryOp::Tas,
            },
            size,
            dst: dst(em)?,
        },
        M::Ext => Op::Ext {
            size,
            reg: reg_of(inst.dst)?,
        },
        M::Swap => Op::Swap(reg_of(inst.dst)?),
        M::Exg => Op::Exg(src(em)?, dst(em)?),

        M::Asl | M::Asr | M::Lsl | M::Lsr | M::Rol | M::Ror | M::Roxl | M::Roxr => Op::Shift {
            op: match inst.mnemonic {
                M::Asl => ShiftOp::Asl,
                M::Asr => ShiftOp::Asr,
                M::Lsl => ShiftOp::Lsl,
                M::Lsr => ShiftOp::Lsr,
                M::Rol => ShiftOp::Rol,
                M::Ror => ShiftOp::Ror,
                M::Roxl => ShiftOp::Roxl,
                _ => ShiftOp::Roxr,
            },
            size,
            count: match inst.src {
                Operand::None => Loc::Imm(1),
                _ => src(em)?,
            },
            dst: dst(em)?,
        },
        M::Btst | M::Bchg | M::Bclr | M::Bset => Op::Bit {
            op: match inst.mnemonic {
                M::Btst => BitOp::Test,
                M::Bchg => BitOp::Change,
                M::Bclr => BitOp::Clear,
                _ => BitOp::Set,
            },
            bit: src(em)?,
            dst: dst(em)?,
        },
        M::Mulu | M::Muls => Op::Mul {
            signed: inst.mnemonic == M::Muls,
            src: src(em)?,
            reg: reg_of(inst.dst)?,
        },
        M::Divu | M::Divs => Op::Div {
            signed: inst.mnemonic == M::Divs,
            src: src(em)?,
            reg: reg_of(inst.dst)?,
            next,
        },
        M::Abcd | M::Sbcd => Op::Bcd {
            subtract: inst.mnemonic == M::Sbcd,
            src: src(em)?,
            dst: dst(em)?,
        },
        M::Chk => Op::Chk {
            src: src(em)?,
            reg: reg_of(inst.dst)?,
            next,
        },

        M::Lea => Op::Lea {
            addr: addr(ea_of(inst.src)?, pc, Size::Long, em)?,
            reg: reg_of(inst.dst)?,
        },
        M::Pea => Op::Pea(addr(ea_of(inst.src)?, pc, Size::Long, em)?),
        M::Movem => match (inst.src, inst.dst) {
            (Operand::RegList(mask), Operand::Ea(ea)) => Op::MoveM {
                size,
                to_memory: true,
                mask,
                addr: addr(ea, pc, size, em)?,
            },
            (Operand::Ea(ea), Operand::RegList(mask)) => Op::MoveM {
                size,
                to_memory: false,
                mask,
                addr: addr(ea, pc, size, em)?,
            },
            _ => return None,
        },
        M::Movep => match (inst.src, inst.dst) {
            (Operand::Ea(Ea::D(data)), Operand::Ea(Ea::Disp(a, disp))) => Op::MoveP {
                size,
                to_memory: true,
                data,
                addr: a,
                disp,
            },
            (Operand::Ea(Ea::Disp(a, disp)), Operand::Ea(Ea::D(data))) => Op::MoveP {
                size,
                to_memory: false,
                data,
                addr: a,
                disp,
            },
            _ => return None,
        },
        M::Scc => Op::SetCond {
            cond: inst.cond,
            dst: dst(em)?,
        },

        M::Bra => {
            em.jump(branch_target(inst, pc)?);
            return Some(BlockEnd::Terminal);
        }
        M::Bsr => {
            let target = branch_target(inst, pc)?;
            em.op(Op::PushPc(next));
            em.jump(target);
            return Some(BlockEnd::Continue);
        }
        M::Bcc => {
            let target = branch_target(inst, pc)?;
            let (taken, not_taken) = if size == Size::Byte { (2, 0) } else { (0, 2) };
            em.op(Op::Test {
                cond: inst.cond,
                taken,
                not_taken,
            });
            em.jump_if(target);
            return Some(BlockEnd::Continue);
        }
        M::Dbcc => {
            let target = branch_target(inst, pc)?;
            em.op(Op::DecrementBranch {
                cond: inst.cond,
                reg: reg_of(inst.src)?,
            });
            em.jump_if(target);
            return Some(BlockEnd::Continue);
        }
        M::Jmp => {
            let ea = ea_of(inst.src)?;
            match static_target(ea, pc) {
                Some(target) => em.jump(target),
                None => em.op(Op::Jump(addr(ea, pc, Size::Long, em)?)),
            }
            return Some(BlockEnd::Terminal);
        }
        M::Jsr => {
            let ea = ea_of(inst.src)?;
            match static_target(ea, pc) {
                Some(target) => {
                    em.op(Op::PushPc(next));
                    em.jump(target);
                }
                None => em.op(Op::Jsr {
                    addr: addr(ea, pc, Size::Long, em)?,
                    ret: next,
                }),
            }
            return Some(BlockEnd::Continue);
        }
        M::Rts => Op::Rts,
        M::Rtr => Op::Rtr,
        M::Rte => Op::Rte { pc },
        M::Link => Op::Link {
            reg: reg_of(inst.src)?,
            disp: immediate(inst.dst)? as i32,
        },
        M::Unlk => Op::Unlk(reg_of(inst.src)?),
        M::Trap => Op::Trap {
            vector: vector::TRAP + immediate(inst.src)?,
            pc: next,
        },
        M::Trapv => Op::TrapV { next },
        M::Illegal => Op::Trap {
            vector: vector::ILLEGAL,
            pc,
        },
        M::LineA => Op::Trap {
            vector: vector::LINE_A,
            pc,
        },
        M::LineF => Op::Trap {
            vector: vector::LINE_F,
            pc,
        },
        M::Reset => Op::Reset { pc },
        M::Stop => Op::Stop {
            sr: immediate(inst.src)? as u16,
            pc,
            next,
        },
        M::Nop | M::Invalid => return Some(end_of(inst)),
    };
    em.op(op);
    Some(end_of(inst))
}

fn end_of(inst: &Instruction) -> BlockEnd {
    if inst.ends_block() {
        BlockEnd::Terminal
    } else {
        BlockEnd::Continue
    }
}
