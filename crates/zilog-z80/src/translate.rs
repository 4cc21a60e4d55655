//! Instruction to host-op translation.

use jit_core::{BlockEnd, Emitter};

use crate::alu::ShiftOp;
use crate::cpu::Z80Isa;
use crate::inst::{Instruction, Mnemonic as M, Operand, Reg8};
use crate::ops::{AccOp, AluOp, BlockKind, Loc8, Loc16, MemRef, Op, Port, WideOp};

fn loc8(operand: Operand, em: &Emitter<'_, Z80Isa>) -> Option<Loc8> {
    Some(match operand {
        Operand::Reg8(reg) => Loc8::Reg(reg),
        Operand::Imm8(value) => Loc8::Imm(value),
        Operand::Ind(reg) => Loc8::Mem(MemRef::Reg(reg)),
        Operand::Indexed(reg, disp) => Loc8::Mem(MemRef::Indexed(reg, disp)),
        Operand::Abs(addr) => Loc8::Mem(MemRef::Static(em.access(u32::from(addr)), addr)),
        _ => return None,
    })
}

fn loc16(operand: Operand, em: &Emitter<'_, Z80Isa>) -> Option<Loc16> {
    Some(match operand {
        Operand::Reg16(reg) => Loc16::Reg(reg),
        Operand::Imm16(value) => Loc16::Imm(value),
        Operand::Abs(addr) => Loc16::Mem(em.access(u32::from(addr)), addr),
        _ => return None,
    })
}

fn port(operand: Operand) -> Port {
    match operand {
        Operand::Port(n) => Port::Imm(n),
        _ => Port::C,
    }
}

const fn relative(next: u16, disp: i8) -> u32 {
    next.wrapping_add_signed(disp as i16) as u32
}

fn ld(inst: &Instruction, em: &mut Emitter<'_, Z80Isa>) -> Option<()> {
    let op = match (inst.dst, inst.src) {
        (Operand::Reg8(Reg8::R), _) => Op::LdRa,
        (Operand::Reg8(Reg8::A), Operand::Reg8(reg @ (Reg8::I | Reg8::R))) => Op::LdAir(reg),
        (Operand::Reg16(_), _) | (_, Operand::Reg16(_) | Operand::Imm16(_)) => Op::Ld16 {
            dst: loc16(inst.dst, em)?,
            src: loc16(inst.src, em)?,
        },
        _ => Op::Ld8 {
            dst: loc8(inst.dst, em)?,
            src: loc8(inst.src, em)?,
        },
    };
    em.op(op);
    Some(())
}

fn alu(inst: &Instruction, em: &mut Emitter<'_, Z80Isa>) -> Option<()> {
    if let (Operand::Reg16(dst), Operand::Reg16(src)) = (inst.dst, inst.src) {
        let op = match inst.mnemonic {
            M::Adc => WideOp::Adc,
            M::Sbc => WideOp::Sbc,
            _ => WideOp::Add,
        };
        em.op(Op::Wide { op, dst, src });
        return Some(());
    }
    let op = match inst.mnemonic {
        M::Add => AluOp::Add,
        M::Adc => AluOp::Adc,
        M::Sub => AluOp::Sub,
        M::Sbc => AluOp::Sbc,
        M::And => AluOp::And,
        M::Xor => AluOp::Xor,
        M::Or => AluOp::Or,
        _ => AluOp::Cp,
    };
    em.op(Op::Alu {
        op,
        src: loc8(inst.src, em)?,
    });
    Some(())
}

const fn shift_op(mnemonic: M) -> ShiftOp {
    match mnemonic {
        M::Rlc => ShiftOp::Rlc,
        M::Rrc => ShiftOp::Rrc,
        M::Rl => ShiftOp::Rl,
        M::Rr => ShiftOp::Rr,
        M::Sla => ShiftOp::Sla,
        M::Sra => ShiftOp::Sra,
        M::Sll => ShiftOp::Sll,
        _ => ShiftOp::Srl,
    }
}

const fn block(mnemonic: M) -> (BlockKind, bool, bool) {
    match mnemonic {
        M::Ldi => (BlockKind::Ld, false, false),
        M::Ldd => (BlockKind::Ld, true, false),
        M::Ldir => (BlockKind::Ld, false, true),
        M::Lddr => (BlockKind::Ld, true, true),
        M::Cpi => (BlockKind::Cp, false, false),
        M::Cpd => (BlockKind::Cp, true, false),
        M::Cpir => (BlockKind::Cp, false, true),
        M::Cpdr => (BlockKind::Cp, true, true),
        M::Ini => (BlockKind::In, false, false),
        M::Ind => (BlockKind::In, true, false),
        M::Inir => (BlockKind::In, false, true),
        M::Indr => (BlockKind::In, true, true),
        M::Outi => (BlockKind::Out, false, false),
        M::Outd => (BlockKind::Out, true, false),
        M::Otir => (BlockKind::Out, false, true),
        _ => (BlockKind::Out, true, true),
    }
}

/// Emit the body of `inst` at `pc`. `None` when an operand has no
/// translation.
fn emit(inst: &Instruction, pc: u32, em: &mut Emitter<'_, Z80Isa>) -> Option<()> {
    let next = (pc as u16).wrapping_add(u16::from(inst.len));
    let bit = |operand: Operand| match operand {
        Operand::Bit(n) => n,
        _ => 0,
    };

    match inst.mnemonic {
        M::Nop => {}
        M::Ld => ld(inst, em)?,
        M::Add | M::Adc | M::Sub | M::Sbc | M::And | M::Xor | M::Or | M::Cp => alu(inst, em)?,
        M::Inc | M::Dec => {
            let inc = inst.mnemonic == M::Inc;
            let op = match (inst.dst, inc) {
                (Operand::Reg16(reg), true) => Op::Inc16(reg),
                (Operand::Reg16(reg), false) => Op::Dec16(reg),
                (dst, true) => Op::Inc8(loc8(dst, em)?),
                (dst, false) => Op::Dec8(loc8(dst, em)?),
            };
            em.op(op);
        }
        M::Rlc | M::Rrc | M::Rl | M::Rr | M::Sla | M::Sra | M::Sll | M::Srl => em.op(Op::Shift {
            op: shift_op(inst.mnemonic),
            loc: loc8(inst.dst, em)?,
            copy: inst.copy,
        }),
        M::Rlca => em.op(Op::Acc(AccOp::Rlca)),
        M::Rrca => em.op(Op::Acc(AccOp::Rrca)),
        M::Rla => em.op(Op::Acc(AccOp::Rla)),
        M::Rra => em.op(Op::Acc(AccOp::Rra)),
        M::Daa => em.op(Op::Acc(AccOp::Daa)),
        M::Cpl => em.op(Op::Acc(AccOp::Cpl)),
        M::Neg => em.op(Op::Acc(AccOp::Neg)),
        M::Scf => em.op(Op::Acc(AccOp::Scf)),
        M::Ccf => em.op(Op::Acc(AccOp::Ccf)),
        M::Bit => em.op(Op::Bit {
            bit: bit(inst.dst),
            loc: loc8(inst.src, em)?,
        }),
        M::Set | M::Res => em.op(Op::SetRes {
            bit: bit(inst.dst),
            set: inst.mnemonic == M::Set,
            loc: loc8(inst.src, em)?,
            copy: inst.copy,
        }),
        M::Push | M::Pop => {
            if let Operand::Reg16(reg) = inst.dst {
                em.op(if inst.mnemonic == M::Push {
                    Op::Push(reg)
                } else {
                    Op::Pop(reg)
                });
            }
        }
        M::Ex => match (inst.dst, inst.src) {
            (Operand::Ind(_), Operand::Reg16(reg)) => em.op(Op::ExSp(reg)),
            (_, Operand::AfAlt) => em.op(Op::ExAf),
            _ => em.op(Op::ExDeHl),
        },
        M::Exx => em.op(Op::Exx),
        M::Ldi
        | M::Ldd
        | M::Ldir
        | M::Lddr
        | M::Cpi
        | M::Cpd
        | M::Cpir
        | M::Cpdr
        | M::Ini
        | M::Ind
        | M::Inir
        | M::Indr
        | M::Outi
        | M::Outd
        | M::Otir
        | M::Otdr => {
            let (kind, decrement, repeat) = block(inst.mnemonic);
            em.op(Op::Block {
                kind,
                decrement,
                repeat,
                pc: pc as u16,
            });
        }
        M::Halt => em.op(Op::Halt { resume: next }),
        M::Di => em.op(Op::Di),
        M::Ei => em.op(Op::Ei),
        M::Im => {
            if let Operand::Mode(mode) = inst.dst {
                em.op(Op::Im(mode));
            }
        }
        M::Jp => match (inst.dst, inst.src) {
            (Operand::Imm16(target), _) => em.jump(u32::from(target)),
            (Operand::Cond(cond), Operand::Imm16(target)) => {
                em.op(Op::Test { cond, taken: 0 });
                em.jump_if(u32::from(target));
            }
            (Operand::Ind(reg), _) => em.op(Op::JumpReg(reg)),
            _ => {}
        },
        M::Jr => match (inst.dst, inst.src) {
            (Operand::Rel(disp), _) => em.jump(relative(next, disp)),
            (Operand::Cond(cond), Operand::Rel(disp)) => {
                em.op(Op::Test { cond, taken: 5 });
                em.jump_if(relative(next, disp));
            }
            _ => {}
        },
        M::Djnz => {
            if let Operand::Rel(disp) = inst.dst {
                em.op(Op::Djnz);
                em.jump_if(relative(next, disp));
            }
        }
        M::Call => match (inst.dst, inst.src) {
            (Operand::Imm16(target), _) => {
                em.op(Op::Call { cond: None, ret: next });
                em.jump(u32::from(target));
            }
            (Operand::Cond(cond), Operand::Imm16(target)) => {
                em.op(Op::Call {
                    cond: Some(cond),
                    ret: next,
                });
                em.jump_if(u32::from(target));
            }
            _ => {}
        },
        M::Ret => em.op(Op::Ret(match inst.dst {
            Operand::Cond(cond) => Some(cond),
            _ => None,
        })),
        M::Reti | M::Retn => em.op(Op::Retn),
        M::Rst => {
            if let Operand::Imm8(vector) = inst.dst {
                em.op(Op::Call { cond: None, ret: next });
                em.jump(u32::from(vector));
            }
        }
        M::In => em.op(Op::In {
            dst: match inst.dst {
                Operand::Reg8(reg) => Some(reg),
                _ => None,
            },
            port: port(inst.src),
        }),
        M::Out => em.op(Op::Out {
            port: port(inst.dst),
            src: loc8(inst.src, em)?,
        }),
        M::Rld => em.op(Op::Rld),
        M::Rrd => em.op(Op::Rrd),
    }
    Some(())
}

pub(crate) fn translate(inst: &Instruction, pc: u32, em: &mut Emitter<'_, Z80Isa>) -> BlockEnd {
    if emit(inst, pc, em).is_none() {
        log::error!("z80: no translation for {inst:?} at {pc:#06X}");
        return em.illegal(pc);
    }
    if inst.ends_block() {
        BlockEnd::Terminal
    } else {
        BlockEnd::Continue
    }
}
