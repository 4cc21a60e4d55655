//! Operations stored in translated code and their execution.

use jit_core::{Access, Env, Flow, GuestBus};

use crate::alu::{self, AluResult, ShiftOp};
use crate::cpu::Z80Isa;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};
use crate::inst::{Cond, Reg8, Reg16};
use crate::registers::Registers;

type Z80Env<'a, B> = Env<'a, Z80Isa, B>;

/// Memory operand, resolved as far as translation time allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemRef {
    /// `(nn)`: the map lookup was done at translation.
    Static(Access, u16),
    /// `(rr)`
    Reg(Reg16),
    /// `(ix+d)`
    Indexed(Reg16, i8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc8 {
    Reg(Reg8),
    Mem(MemRef),
    Imm(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc16 {
    Reg(Reg16),
    Imm(u16),
    /// Little-endian word at `(nn)`.
    Mem(Access, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

/// Accumulator-only operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccOp {
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Neg,
    Scf,
    Ccf,
}

/// 16-bit arithmetic on HL/IX/IY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideOp {
    Add,
    Adc,
    Sbc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Ld,
    Cp,
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// `(n)`, with A on the upper address lines.
    Imm(u8),
    /// `(c)`, with B on the upper address lines.
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ld8 { dst: Loc8, src: Loc8 },
    Ld16 { dst: Loc16, src: Loc16 },
    /// `ld a, i` / `ld a, r`
    LdAir(Reg8),
    /// `ld r, a`
    LdRa,
    Alu { op: AluOp, src: Loc8 },
    Inc8(Loc8),
    Dec8(Loc8),
    Inc16(Reg16),
    Dec16(Reg16),
    Wide { op: WideOp, dst: Reg16, src: Reg16 },
    Shift {
        op: ShiftOp,
        loc: Loc8,
        copy: Option<Reg8>,
    },
    Acc(AccOp),
    Bit { bit: u8, loc: Loc8 },
    SetRes {
        bit: u8,
        set: bool,
        loc: Loc8,
        copy: Option<Reg8>,
    },
    Push(Reg16),
    Pop(Reg16),
    ExAf,
    Exx,
    ExDeHl,
    ExSp(Reg16),
    /// Evaluate a condition for the following conditional jump, charging
    /// `taken` extra T-states when it holds.
    Test { cond: Cond, taken: u32 },
    Djnz,
    /// Stack `ret` if the condition holds. A following jump does the transfer.
    Call { cond: Option<Cond>, ret: u16 },
    Ret(Option<Cond>),
    /// RETI and RETN both restore IFF1 from IFF2.
    Retn,
    JumpReg(Reg16),
    /// One step of a block instruction at `pc`; repeating forms jump back
    /// to their own prologue while the count is not exhausted.
    Block {
        kind: BlockKind,
        decrement: bool,
        repeat: bool,
        pc: u16,
    },
    In { dst: Option<Reg8>, port: Port },
    Out { port: Port, src: Loc8 },
    Rld,
    Rrd,
    Di,
    Ei,
    Im(u8),
    Halt { resume: u16 },
}

const fn condition(f: u8, cond: Cond) -> bool {
    match cond {
        Cond::Nz => f & ZF == 0,
        Cond::Z => f & ZF != 0,
        Cond::Nc => f & CF == 0,
        Cond::C => f & CF != 0,
        Cond::Po => f & PF == 0,
        Cond::Pe => f & PF != 0,
        Cond::P => f & SF == 0,
        Cond::M => f & SF != 0,
    }
}

fn address(regs: &Registers, mem: MemRef) -> u16 {
    match mem {
        MemRef::Static(_, addr) => addr,
        MemRef::Reg(reg) => regs.reg16(reg),
        MemRef::Indexed(reg, disp) => regs.reg16(reg).wrapping_add_signed(i16::from(disp)),
    }
}

fn load8<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, loc: Loc8) -> u8 {
    match loc {
        Loc8::Reg(reg) => env.ctx.regs.reg8(reg),
        Loc8::Imm(value) => value,
        Loc8::Mem(MemRef::Static(access, addr)) => env.read8_at(access, u32::from(addr)),
        Loc8::Mem(mem) => {
            let addr = address(&env.ctx.regs, mem);
            env.read8(u32::from(addr))
        }
    }
}

fn store8<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, loc: Loc8, value: u8) {
    match loc {
        Loc8::Reg(reg) => env.ctx.regs.set_reg8(reg, value),
        Loc8::Imm(_) => {}
        Loc8::Mem(MemRef::Static(access, addr)) => env.write8_at(access, u32::from(addr), value),
        Loc8::Mem(mem) => {
            let addr = address(&env.ctx.regs, mem);
            env.write8(u32::from(addr), value);
        }
    }
}

pub(crate) fn read_word<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, addr: u16) -> u16 {
    let lo = env.read8(u32::from(addr));
    let hi = env.read8(u32::from(addr.wrapping_add(1)));
    u16::from_le_bytes([lo, hi])
}

fn write_word<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, addr: u16, value: u16) {
    let [lo, hi] = value.to_le_bytes();
    env.write8(u32::from(addr), lo);
    env.write8(u32::from(addr.wrapping_add(1)), hi);
}

pub(crate) fn push<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, value: u16) {
    let [lo, hi] = value.to_le_bytes();
    let sp = env.ctx.regs.sp.wrapping_sub(1);
    env.write8(u32::from(sp), hi);
    let sp = sp.wrapping_sub(1);
    env.write8(u32::from(sp), lo);
    env.ctx.regs.sp = sp;
}

fn pop<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>) -> u16 {
    let sp = env.ctx.regs.sp;
    let value = read_word(env, sp);
    env.ctx.regs.sp = sp.wrapping_add(2);
    value
}

fn load16<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, loc: Loc16) -> u16 {
    match loc {
        Loc16::Reg(reg) => env.ctx.regs.reg16(reg),
        Loc16::Imm(value) => value,
        Loc16::Mem(access, addr) => {
            let lo = env.read8_at(access, u32::from(addr));
            let hi = env.read8(u32::from(addr.wrapping_add(1)));
            u16::from_le_bytes([lo, hi])
        }
    }
}

fn store16<B: GuestBus<Registers>>(env: &mut Z80Env<'_, B>, loc: Loc16, value: u16) {
    match loc {
        Loc16::Reg(reg) => env.ctx.regs.set_reg16(reg, value),
        Loc16::Imm(_) => {}
        Loc16::Mem(access, addr) => {
            let [lo, hi] = value.to_le_bytes();
            env.write8_at(access, u32::from(addr), lo);
            env.write8(u32::from(addr.wrapping_add(1)), hi);
        }
    }
}

fn port_address(regs: &Registers, port: Port) -> u16 {
    match port {
        Port::Imm(n) => u16::from_be_bytes([regs.a, n]),
        Port::C => regs.bc(),
    }
}

fn t_states(env: &Z80Env<'_, impl GuestBus<Registers>>) -> u32 {
    env.ctx.current_cycle / env.ctx.clock_divider
}

fn alu(op: AluOp, a: u8, b: u8, f: u8) -> AluResult {
    let carry = f & CF != 0;
    match op {
        AluOp::Add => alu::add8(a, b, false),
        AluOp::Adc => alu::add8(a, b, carry),
        AluOp::Sub => alu::sub8(a, b, false),
        AluOp::Sbc => alu::sub8(a, b, carry),
        AluOp::And => alu::and8(a, b),
        AluOp::Xor => alu::xor8(a, b),
        AluOp::Or => alu::or8(a, b),
        AluOp::Cp => alu::cp8(a, b),
    }
}

fn accumulator(regs: &mut Registers, op: AccOp) {
    let (a, f) = (regs.a, regs.f);
    let kept = f & (SF | ZF | PF);
    let result = match op {
        AccOp::Rlca => alu::shift_accumulator(ShiftOp::Rlc, a, f),
        AccOp::Rrca => alu::shift_accumulator(ShiftOp::Rrc, a, f),
        AccOp::Rla => alu::shift_accumulator(ShiftOp::Rl, a, f),
        AccOp::Rra => alu::shift_accumulator(ShiftOp::Rr, a, f),
        AccOp::Daa => alu::daa(a, f),
        AccOp::Neg => alu::sub8(0, a, false),
        AccOp::Cpl => {
            let value = !a;
            AluResult {
                value,
                flags: kept | (f & CF) | HF | NF | (value & (YF | XF)),
            }
        }
        AccOp::Scf => AluResult {
            value: a,
            flags: kept | CF | (a & (YF | XF)),
        },
        AccOp::Ccf => AluResult {
            value: a,
            flags: kept | (a & (YF | XF)) | if f & CF != 0 { HF } else { CF },
        },
    };
    regs.a = result.value;
    regs.f = result.flags;
}

/// Undocumented X/Y of LDI and CPI come from bits 3 and 1 of `n`.
const fn block_xy(n: u8) -> u8 {
    (n & XF) | ((n & 0x02) << 4)
}

/// One step of LDx/CPx/INx/OUTx. Returns whether a repeating form goes on.
fn block_step<B: GuestBus<Registers>>(
    env: &mut Z80Env<'_, B>,
    kind: BlockKind,
    decrement: bool,
) -> bool {
    let step = |v: u16| if decrement { v.wrapping_sub(1) } else { v.wrapping_add(1) };
    let hl = env.ctx.regs.hl();
    match kind {
        BlockKind::Ld => {
            let value = env.read8(u32::from(hl));
            let de = env.ctx.regs.de();
            env.write8(u32::from(de), value);
            let regs = &mut env.ctx.regs;
            regs.set_hl(step(hl));
            regs.set_de(step(de));
            let bc = regs.bc().wrapping_sub(1);
            regs.set_bc(bc);
            let mut f = (regs.f & (SF | ZF | CF)) | block_xy(value.wrapping_add(regs.a));
            if bc != 0 {
                f |= PF;
            }
            regs.f = f;
            bc != 0
        }
        BlockKind::Cp => {
            let value = env.read8(u32::from(hl));
            let regs = &mut env.ctx.regs;
            let diff = alu::sub8(regs.a, value, false);
            regs.set_hl(step(hl));
            let bc = regs.bc().wrapping_sub(1);
            regs.set_bc(bc);
            let n = diff.value.wrapping_sub(u8::from(diff.flags & HF != 0));
            let mut f = (diff.flags & (SF | ZF | HF)) | NF | (regs.f & CF) | block_xy(n);
            if bc != 0 {
                f |= PF;
            }
            regs.f = f;
            bc != 0 && diff.value != 0
        }
        BlockKind::In => {
            let port = env.ctx.regs.bc();
            let value = env.bus.io_read(port, env.ctx);
            env.write8(u32::from(hl), value);
            let regs = &mut env.ctx.regs;
            regs.set_hl(step(hl));
            regs.b = regs.b.wrapping_sub(1);
            regs.f = (regs.f & CF) | sz53(regs.b) | NF;
            regs.b != 0
        }
        BlockKind::Out => {
            let value = env.read8(u32::from(hl));
            env.ctx.regs.b = env.ctx.regs.b.wrapping_sub(1);
            let port = env.ctx.regs.bc();
            env.bus.io_write(port, value, env.ctx);
            let regs = &mut env.ctx.regs;
            regs.set_hl(step(hl));
            regs.f = (regs.f & CF) | sz53(regs.b) | NF;
            regs.b != 0
        }
    }
}

/// Execute one translated Z80 operation.
pub(crate) fn execute<B: GuestBus<Registers>>(op: &Op, env: &mut Z80Env<'_, B>) -> Flow {
    match *op {
        Op::Ld8 { dst, src } => {
            let value = load8(env, src);
            store8(env, dst, value);
        }
        Op::Ld16 { dst, src } => {
            let value = load16(env, src);
            store16(env, dst, value);
        }
        Op::LdAir(src) => {
            let t = t_states(env);
            let regs = &mut env.ctx.regs;
            let value = if src == Reg8::R { regs.refresh(t) } else { regs.i };
            regs.a = value;
            regs.f = sz53(value) | (regs.f & CF) | if regs.iff2 { PF } else { 0 };
        }
        Op::LdRa => {
            let t = t_states(env);
            let regs = &mut env.ctx.regs;
            regs.set_refresh(regs.a, t);
        }
        Op::Alu { op, src } => {
            let value = load8(env, src);
            let regs = &mut env.ctx.regs;
            let result = alu(op, regs.a, value, regs.f);
            regs.a = result.value;
            regs.f = result.flags;
        }
        Op::Inc8(loc) => {
            let value = load8(env, loc);
            let result = alu::inc8(value, env.ctx.regs.f);
            store8(env, loc, result.value);
            env.ctx.regs.f = result.flags;
        }
        Op::Dec8(loc) => {
            let value = load8(env, loc);
            let result = alu::dec8(value, env.ctx.regs.f);
            store8(env, loc, result.value);
            env.ctx.regs.f = result.flags;
        }
        Op::Inc16(reg) => {
            let regs = &mut env.ctx.regs;
            regs.set_reg16(reg, regs.reg16(reg).wrapping_add(1));
        }
        Op::Dec16(reg) => {
            let regs = &mut env.ctx.regs;
            regs.set_reg16(reg, regs.reg16(reg).wrapping_sub(1));
        }
        Op::Wide { op, dst, src } => {
            let regs = &mut env.ctx.regs;
            let (a, b, carry) = (regs.reg16(dst), regs.reg16(src), regs.f & CF != 0);
            let (value, flags) = match op {
                WideOp::Add => alu::add16(a, b, regs.f),
                WideOp::Adc => alu::adc16(a, b, carry),
                WideOp::Sbc => alu::sbc16(a, b, carry),
            };
            regs.set_reg16(dst, value);
            regs.f = flags;
        }
        Op::Shift { op, loc, copy } => {
            let value = load8(env, loc);
            let result = alu::shift(op, value, env.ctx.regs.f & CF != 0);
            store8(env, loc, result.value);
            env.ctx.regs.f = result.flags;
            if let Some(reg) = copy {
                env.ctx.regs.set_reg8(reg, result.value);
            }
        }
        Op::Acc(op) => accumulator(&mut env.ctx.regs, op),
        Op::Bit { bit, loc } => {
            let value = load8(env, loc);
            let regs = &mut env.ctx.regs;
            let mut f = (regs.f & CF) | HF | (value & (YF | XF));
            if value & (1 << bit) == 0 {
                f |= ZF | PF;
            } else if bit == 7 {
                f |= SF;
            }
            regs.f = f;
        }
        Op::SetRes { bit, set, loc, copy } => {
            let value = load8(env, loc);
            let value = if set { value | 1 << bit } else { value & !(1 << bit) };
            store8(env, loc, value);
            if let Some(reg) = copy {
                env.ctx.regs.set_reg8(reg, value);
            }
        }
        Op::Push(reg) => {
            let value = env.ctx.regs.reg16(reg);
            push(env, value);
        }
        Op::Pop(reg) => {
            let value = pop(env);
            env.ctx.regs.set_reg16(reg, value);
        }
        Op::ExAf => env.ctx.regs.swap_af(),
        Op::Exx => env.ctx.regs.swap_main(),
        Op::ExDeHl => {
            let regs = &mut env.ctx.regs;
            let (de, hl) = (regs.de(), regs.hl());
            regs.set_de(hl);
            regs.set_hl(de);
        }
        Op::ExSp(reg) => {
            let sp = env.ctx.regs.sp;
            let stacked = read_word(env, sp);
            let value = env.ctx.regs.reg16(reg);
            write_word(env, sp, value);
            env.ctx.regs.set_reg16(reg, stacked);
        }
        Op::Test { cond, taken } => {
            let holds = condition(env.ctx.regs.f, cond);
            env.ctx.branch_taken = holds;
            if holds {
                env.ctx.add_clocks(taken);
            }
        }
        Op::Djnz => {
            let regs = &mut env.ctx.regs;
            regs.b = regs.b.wrapping_sub(1);
            let holds = regs.b != 0;
            env.ctx.branch_taken = holds;
            if holds {
                env.ctx.add_clocks(5);
            }
        }
        Op::Call { cond, ret } => {
            if let Some(cond) = cond {
                let holds = condition(env.ctx.regs.f, cond);
                env.ctx.branch_taken = holds;
                if !holds {
                    return Flow::Next;
                }
                env.ctx.add_clocks(7);
            }
            push(env, ret);
        }
        Op::Ret(cond) => {
            if let Some(cond) = cond {
                if !condition(env.ctx.regs.f, cond) {
                    return Flow::Next;
                }
                env.ctx.add_clocks(6);
            }
            return Flow::Dispatch(u32::from(pop(env)));
        }
        Op::Retn => {
            env.ctx.regs.iff1 = env.ctx.regs.iff2;
            env.bus.interrupt_state_changed(env.ctx);
            return Flow::Dispatch(u32::from(pop(env)));
        }
        Op::JumpReg(reg) => return Flow::Dispatch(u32::from(env.ctx.regs.reg16(reg))),
        Op::Block {
            kind,
            decrement,
            repeat,
            pc,
        } => {
            if block_step(env, kind, decrement) && repeat {
                env.ctx.add_clocks(5);
                return Flow::Dispatch(u32::from(pc));
            }
        }
        Op::In { dst, port } => {
            let addr = port_address(&env.ctx.regs, port);
            let value = env.bus.io_read(addr, env.ctx);
            let regs = &mut env.ctx.regs;
            if port == Port::C {
                regs.f = sz53p(value) | (regs.f & CF);
            }
            if let Some(reg) = dst {
                regs.set_reg8(reg, value);
            }
        }
        Op::Out { port, src } => {
            let value = load8(env, src);
            let addr = port_address(&env.ctx.regs, port);
            env.bus.io_write(addr, value, env.ctx);
        }
        Op::Rld | Op::Rrd => {
            let hl = env.ctx.regs.hl();
            let mem = env.read8(u32::from(hl));
            let a = env.ctx.regs.a;
            let (stored, low) = if *op == Op::Rld {
                ((mem << 4) | (a & 0x0F), mem >> 4)
            } else {
                ((a << 4) | (mem >> 4), mem & 0x0F)
            };
            env.write8(u32::from(hl), stored);
            let regs = &mut env.ctx.regs;
            regs.a = (a & 0xF0) | low;
            regs.f = sz53p(regs.a) | (regs.f & CF);
        }
        Op::Di => {
            env.ctx.regs.iff1 = false;
            env.ctx.regs.iff2 = false;
            env.bus.interrupt_state_changed(env.ctx);
        }
        Op::Ei => {
            let ctx = &mut *env.ctx;
            ctx.regs.iff1 = true;
            ctx.regs.iff2 = true;
            // The instruction after EI always runs before an interrupt.
            ctx.regs.int_enable_cycle = ctx.current_cycle + 4 * ctx.clock_divider;
            if ctx.int_cycle != emu_core::CYCLE_NEVER {
                let due = ctx.int_cycle.max(ctx.regs.int_enable_cycle);
                ctx.target_cycle = ctx.target_cycle.min(due);
            }
            env.bus.interrupt_state_changed(env.ctx);
        }
        Op::Im(mode) => {
            env.ctx.regs.im = mode;
            env.bus.interrupt_state_changed(env.ctx);
        }
        Op::Halt { resume } => return Flow::Halt {
            resume: u32::from(resume),
        },
    }
    Flow::Next
}
