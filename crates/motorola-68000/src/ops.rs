//! Guest operations stored in translated 68000 code.
//!
//! Operands are resolved as far as translation allows: absolute and
//! PC-relative addresses become [`Addr::Static`] with their memory map
//! resolution attached, everything register-relative is computed when the
//! operation runs.

use jit_core::{Access, Env, Flow, GuestBus};

use crate::alu::{self, AluResult, ShiftOp};
use crate::cpu::M68kIsa;
use crate::flags::{C, CCR_MASK, Cond, N, S, T, V, X, Z, set_if};
use crate::inst::{IndexReg, Size};
use crate::registers::Registers;
use crate::timing::{CHECK_TRAP_CLOCKS, TRAP_CLOCKS, ZERO_DIVIDE_CLOCKS, divs_cycles, divu_cycles, muls_cycles, mulu_cycles};

pub(crate) type M68kEnv<'a, B> = Env<'a, M68kIsa, B>;

const NZVC: u16 = N | Z | V | C;
const XNZVC: u16 = X | NZVC;

/// Exception vector numbers.
pub(crate) mod vector {
    pub const ILLEGAL: u32 = 4;
    pub const ZERO_DIVIDE: u32 = 5;
    pub const CHK: u32 = 6;
    pub const TRAPV: u32 = 7;
    pub const PRIVILEGE: u32 = 8;
    pub const LINE_A: u32 = 10;
    pub const LINE_F: u32 = 11;
    pub const AUTOVECTOR: u32 = 24;
    pub const TRAP: u32 = 32;
}

/// Base of an indexed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    A(u8),
    /// PC value at the extension word, known at translation time.
    Pc(u32),
}

/// A memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    Static(Access, u32),
    Ind(u8),
    PostInc(u8),
    PreDec(u8),
    Disp(u8, i16),
    Index(Base, IndexReg, i8),
}

/// Any data operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    D(u8),
    A(u8),
    Mem(Addr),
    Imm(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    AddX,
    SubX,
    Cmp,
    And,
    Or,
    Eor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrOp {
    Add,
    Sub,
    Cmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Clr,
    Neg,
    NegX,
    Not,
    Tst,
    Nbcd,
    Tas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    Test,
    Change,
    Clear,
    Set,
}

/// One guest operation. `pc` fields hold the address of the instruction
/// itself, `next` the address after it; both are what exceptions stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Move { size: Size, src: Loc, dst: Loc },
    MoveA { size: Size, src: Loc, reg: u8 },
    Alu { op: AluOp, size: Size, src: Loc, dst: Loc },
    AddrArith { op: AddrOp, size: Size, src: Loc, reg: u8 },
    Unary { op: UnaryOp, size: Size, dst: Loc },
    Ext { size: Size, reg: u8 },
    Swap(u8),
    Exg(Loc, Loc),
    Shift { op: ShiftOp, size: Size, count: Loc, dst: Loc },
    Bit { op: BitOp, bit: Loc, dst: Loc },
    Mul { signed: bool, src: Loc, reg: u8 },
    Div { signed: bool, src: Loc, reg: u8, next: u32 },
    Bcd { subtract: bool, src: Loc, dst: Loc },
    Lea { addr: Addr, reg: u8 },
    Pea(Addr),
    MoveM { size: Size, to_memory: bool, mask: u16, addr: Addr },
    MoveP { size: Size, to_memory: bool, data: u8, addr: u8, disp: i16 },
    SetCond { cond: Cond, dst: Loc },
    /// Bcc: set the branch flag, charging the taken or untaken extra.
    Test { cond: Cond, taken: u32, not_taken: u32 },
    /// DBcc: set the branch flag when the loop continues.
    DecrementBranch { cond: Cond, reg: u8 },
    PushPc(u32),
    Jump(Addr),
    Jsr { addr: Addr, ret: u32 },
    Rts,
    Rtr,
    Rte { pc: u32 },
    Link { reg: u8, disp: i32 },
    Unlk(u8),
    ToSr { src: Loc, ccr_only: bool, pc: u32 },
    FromSr(Loc),
    LogicSr { op: AluOp, value: u16, ccr_only: bool, pc: u32 },
    MoveUsp { to_usp: bool, reg: u8, pc: u32 },
    Trap { vector: u32, pc: u32 },
    TrapV { next: u32 },
    Chk { src: Loc, reg: u8, next: u32 },
    Reset { pc: u32 },
    Stop { sr: u16, pc: u32, next: u32 },
}

/// A resolved operand: effective address side effects have happened.
#[derive(Debug, Clone, Copy)]
enum Target {
    D(u8),
    A(u8),
    Mem(u32, Option<Access>),
    Imm(u32),
}

fn set_da(regs: &mut Registers, n: usize, value: u32) {
    if n < 8 {
        regs.d[n] = value;
    } else {
        regs.set_a(n - 8, value);
    }
}

fn set_ccr_bits(regs: &mut Registers, mask: u16, ccr: u16) {
    regs.sr = (regs.sr & !mask) | (ccr & mask);
}

/// `(A7)+` and `-(A7)` keep the stack word aligned for byte accesses.
const fn step(reg: u8, size: Size) -> u32 {
    if reg == 7 && matches!(size, Size::Byte) {
        2
    } else {
        size.bytes()
    }
}

fn address<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, addr: Addr, size: Size) -> (u32, Option<Access>) {
    let regs = &mut env.ctx.regs;
    match addr {
        Addr::Static(access, address) => (address, Some(access)),
        Addr::Ind(r) => (regs.a(r.into()), None),
        Addr::PostInc(r) => {
            let a = regs.a(r.into());
            regs.set_a(r.into(), a.wrapping_add(step(r, size)));
            (a, None)
        }
        Addr::PreDec(r) => {
            let a = regs.a(r.into()).wrapping_sub(step(r, size));
            regs.set_a(r.into(), a);
            (a, None)
        }
        Addr::Disp(r, disp) => (regs.a(r.into()).wrapping_add(disp as i32 as u32), None),
        Addr::Index(base, index, disp) => {
            let base = match base {
                Base::A(r) => regs.a(r.into()),
                Base::Pc(pc) => pc,
            };
            let raw = regs.da(index.reg.into());
            let offset = if index.long {
                raw
            } else {
                raw as u16 as i16 as i32 as u32
            };
            (base.wrapping_add(offset).wrapping_add(disp as i32 as u32), None)
        }
    }
}

/// Address of a control-mode operand (LEA, PEA, JMP, JSR).
fn control_address<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, addr: Addr) -> u32 {
    address(env, addr, Size::Long).0
}

fn resolve<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, loc: Loc, size: Size) -> Target {
    match loc {
        Loc::D(r) => Target::D(r),
        Loc::A(r) => Target::A(r),
        Loc::Imm(v) => Target::Imm(v),
        Loc::Mem(addr) => {
            let (a, access) = address(env, addr, size);
            Target::Mem(a, access)
        }
    }
}

pub(crate) fn read_mem<B: GuestBus<Registers>>(
    env: &mut M68kEnv<'_, B>,
    size: Size,
    address: u32,
    access: Option<Access>,
) -> u32 {
    match size {
        Size::Byte => u32::from(match access {
            Some(access) => env.read8_at(access, address),
            None => env.read8(address),
        }),
        Size::Word => {
            let address = address & !1;
            u32::from(match access {
                Some(access) => env.read16_at(access, address),
                None => env.read16(address),
            })
        }
        Size::Long => {
            let address = address & !1;
            let hi = u32::from(match access {
                Some(access) => env.read16_at(access, address),
                None => env.read16(address),
            });
            let lo = u32::from(env.read16(address.wrapping_add(2)));
            (hi << 16) | lo
        }
    }
}

pub(crate) fn write_mem<B: GuestBus<Registers>>(
    env: &mut M68kEnv<'_, B>,
    size: Size,
    address: u32,
    access: Option<Access>,
    value: u32,
) {
    match size {
        Size::Byte => match access {
            Some(access) => env.write8_at(access, address, value as u8),
            None => env.write8(address, value as u8),
        },
        Size::Word => {
            let address = address & !1;
            match access {
                Some(access) => env.write16_at(access, address, value as u16),
                None => env.write16(address, value as u16),
            }
        }
        Size::Long => {
            let address = address & !1;
            let hi = (value >> 16) as u16;
            match access {
                Some(access) => env.write16_at(access, address, hi),
                None => env.write16(address, hi),
            }
            env.write16(address.wrapping_add(2), value as u16);
        }
    }
}

fn read<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, target: Target, size: Size) -> u32 {
    match target {
        Target::D(r) => env.ctx.regs.d[usize::from(r)] & size.mask(),
        Target::A(r) => env.ctx.regs.a(r.into()) & size.mask(),
        Target::Imm(v) => v & size.mask(),
        Target::Mem(address, access) => read_mem(env, size, address, access),
    }
}

fn write<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, target: Target, size: Size, value: u32) {
    match target {
        Target::D(r) => {
            let d = &mut env.ctx.regs.d[usize::from(r)];
            *d = (*d & !size.mask()) | (value & size.mask());
        }
        Target::A(r) => env.ctx.regs.set_a(r.into(), value),
        Target::Mem(address, access) => write_mem(env, size, address, access, value),
        Target::Imm(_) => log::warn!("m68k: write to immediate operand ignored"),
    }
}

fn load<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, loc: Loc, size: Size) -> u32 {
    let target = resolve(env, loc, size);
    read(env, target, size)
}

pub(crate) fn push_long<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, value: u32) {
    let sp = env.ctx.regs.push(4);
    write_mem(env, Size::Long, sp, None, value);
}

pub(crate) fn push_word<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, value: u16) {
    let sp = env.ctx.regs.push(2);
    write_mem(env, Size::Word, sp, None, value.into());
}

fn pop_long<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>) -> u32 {
    let sp = env.ctx.regs.pop(4);
    read_mem(env, Size::Long, sp, None)
}

fn pop_word<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>) -> u16 {
    let sp = env.ctx.regs.pop(2);
    read_mem(env, Size::Word, sp, None) as u16
}

/// Stack PC and SR in supervisor mode and fetch the handler address from
/// the vector table.
pub(crate) fn enter_exception<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, vector: u32, pc: u32) -> u32 {
    let sr = env.ctx.regs.sr;
    env.ctx.regs.sr = (sr | S) & !T;
    push_long(env, pc);
    push_word(env, sr);
    let handler = read_mem(env, Size::Long, vector * 4, None);
    log::trace!("m68k: exception {vector} from {pc:#08X} to {handler:#08X}");
    handler
}

fn exception<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, vector: u32, pc: u32) -> Flow {
    Flow::Dispatch(enter_exception(env, vector, pc))
}

/// Privilege check for instructions that need supervisor mode.
fn privileged<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, pc: u32) -> Option<Flow> {
    if env.ctx.regs.is_supervisor() {
        return None;
    }
    log::debug!("m68k: privilege violation at {pc:#08X}");
    env.ctx.add_clocks(TRAP_CLOCKS);
    Some(exception(env, vector::PRIVILEGE, pc))
}

/// Write SR, letting the machine recompute interrupt timing.
fn write_sr<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, value: u16) {
    env.ctx.regs.set_sr(value);
    env.bus.interrupt_state_changed(env.ctx);
}

/// Z is only ever cleared by the extended and decimal operations.
const fn sticky_zero(mut r: AluResult, old_sr: u16) -> AluResult {
    r.ccr &= !Z;
    if r.value == 0 {
        r.ccr |= old_sr & Z;
    }
    r
}

fn alu<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, op: AluOp, size: Size, src: Loc, dst: Loc) {
    let s = load(env, src, size);
    let target = resolve(env, dst, size);
    let d = read(env, target, size);
    let sr = env.ctx.regs.sr;
    let x = env.ctx.regs.x();
    let (result, mask) = match op {
        AluOp::Add => (alu::add(size, s, d, 0), XNZVC),
        AluOp::Sub | AluOp::Cmp => (alu::sub(size, s, d, 0), if op == AluOp::Cmp { NZVC } else { XNZVC }),
        AluOp::AddX => (sticky_zero(alu::add(size, s, d, x), sr), XNZVC),
        AluOp::SubX => (sticky_zero(alu::sub(size, s, d, x), sr), XNZVC),
        AluOp::And => (alu::logic(size, s & d), NZVC),
        AluOp::Or => (alu::logic(size, s | d), NZVC),
        AluOp::Eor => (alu::logic(size, s ^ d), NZVC),
    };
    if op != AluOp::Cmp {
        write(env, target, size, result.value);
    }
    set_ccr_bits(&mut env.ctx.regs, mask, result.ccr);
}

fn unary<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, op: UnaryOp, size: Size, dst: Loc) {
    let target = resolve(env, dst, size);
    let d = read(env, target, size);
    let sr = env.ctx.regs.sr;
    let x = env.ctx.regs.x();
    let (result, mask, store) = match op {
        UnaryOp::Clr => (alu::logic(size, 0), NZVC, true),
        UnaryOp::Neg => (alu::sub(size, d, 0, 0), XNZVC, true),
        UnaryOp::NegX => (sticky_zero(alu::sub(size, d, 0, x), sr), XNZVC, true),
        UnaryOp::Not => (alu::logic(size, !d), NZVC, true),
        UnaryOp::Tst => (alu::logic(size, d), NZVC, false),
        UnaryOp::Tas => {
            let flags = alu::logic(size, d);
            let set = AluResult {
                value: d | 0x80,
                ccr: flags.ccr,
            };
            (set, NZVC, true)
        }
        UnaryOp::Nbcd => (bcd(d as u8, 0, x as u8, true, sr), XNZVC, true),
    };
    if store {
        write(env, target, size, result.value);
    }
    set_ccr_bits(&mut env.ctx.regs, mask, result.ccr);
}

fn bcd(src: u8, dst: u8, x: u8, subtract: bool, sr: u16) -> AluResult {
    let (value, carry, overflow) = if subtract {
        alu::bcd_sub(src, dst, x)
    } else {
        alu::bcd_add(src, dst, x)
    };
    let mut ccr = alu::nz(Size::Byte, value.into());
    ccr = set_if(ccr, V, overflow);
    ccr = set_if(ccr, C | X, carry);
    sticky_zero(
        AluResult {
            value: value.into(),
            ccr,
        },
        sr,
    )
}

fn shift<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, op: ShiftOp, size: Size, count: Loc, dst: Loc) {
    let count = match count {
        Loc::D(r) => env.ctx.regs.d[usize::from(r)] & 63,
        Loc::Imm(n) => n,
        _ => 1,
    };
    if matches!(dst, Loc::D(_)) {
        env.ctx.add_clocks(2 * count);
    }
    let target = resolve(env, dst, size);
    let value = read(env, target, size);
    let x = env.ctx.regs.sr & X != 0;
    let result = alu::shift(op, size, value, count, x);
    write(env, target, size, result.value);
    set_ccr_bits(&mut env.ctx.regs, XNZVC, result.ccr);
}

fn bit<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, op: BitOp, bit: Loc, dst: Loc) {
    let number = match bit {
        Loc::D(r) => env.ctx.regs.d[usize::from(r)],
        Loc::Imm(n) => n,
        _ => 0,
    };
    let size = if matches!(dst, Loc::D(_)) { Size::Long } else { Size::Byte };
    let mask = 1u32 << (number % (size.bytes() * 8));
    let target = resolve(env, dst, size);
    let value = read(env, target, size);
    let regs = &mut env.ctx.regs;
    regs.sr = set_if(regs.sr, Z, value & mask == 0);
    let new = match op {
        BitOp::Test => return,
        BitOp::Change => value ^ mask,
        BitOp::Clear => value & !mask,
        BitOp::Set => value | mask,
    };
    write(env, target, size, new);
}

fn multiply<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, signed: bool, src: Loc, reg: u8) {
    let s = load(env, src, Size::Word) as u16;
    let d = env.ctx.regs.d[usize::from(reg)] as u16;
    let (product, clocks) = if signed {
        let p = i32::from(s as i16) * i32::from(d as i16);
        (p as u32, muls_cycles(s))
    } else {
        (u32::from(s) * u32::from(d), mulu_cycles(s))
    };
    env.ctx.add_clocks(clocks);
    env.ctx.regs.d[usize::from(reg)] = product;
    set_ccr_bits(&mut env.ctx.regs, NZVC, alu::nz(Size::Long, product));
}

fn divide<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, signed: bool, src: Loc, reg: u8, next: u32) -> Flow {
    let divisor = load(env, src, Size::Word) as u16;
    if divisor == 0 {
        env.ctx.add_clocks(ZERO_DIVIDE_CLOCKS);
        env.ctx.regs.sr &= !C;
        return exception(env, vector::ZERO_DIVIDE, next);
    }
    let dividend = env.ctx.regs.d[usize::from(reg)];
    let result = if signed {
        env.ctx.add_clocks(divs_cycles(dividend as i32, divisor as i16));
        let (n, d) = (i64::from(dividend as i32), i64::from(divisor as i16));
        let (q, r) = (n / d, n % d);
        i16::try_from(q)
            .ok()
            .map(|q| (u32::from(q as u16), r as u16))
    } else {
        env.ctx.add_clocks(divu_cycles(dividend, divisor));
        let (q, r) = (dividend / u32::from(divisor), dividend % u32::from(divisor));
        u16::try_from(q).ok().map(|q| (u32::from(q), r as u16))
    };
    let regs = &mut env.ctx.regs;
    match result {
        Some((quotient, remainder)) => {
            regs.d[usize::from(reg)] = (u32::from(remainder) << 16) | quotient;
            set_ccr_bits(regs, NZVC, alu::nz(Size::Word, quotient));
        }
        // Overflow leaves the register alone.
        None => set_ccr_bits(regs, NZVC, N | V),
    }
    Flow::Next
}

fn movem<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, size: Size, to_memory: bool, mask: u16, addr: Addr) {
    let bytes = size.bytes();
    match addr {
        // Predecrement stores A7 first, so the mask is reversed.
        Addr::PreDec(r) => {
            let mut a = env.ctx.regs.a(r.into());
            for i in (0..16).filter(|&i| mask & (1 << i) != 0) {
                let value = env.ctx.regs.da(15 - i);
                a = a.wrapping_sub(bytes);
                write_mem(env, size, a, None, value);
            }
            env.ctx.regs.set_a(r.into(), a);
        }
        _ => {
            let (mut a, mut access) = match addr {
                Addr::PostInc(r) => (env.ctx.regs.a(r.into()), None),
                other => address(env, other, size),
            };
            for i in (0..16).filter(|&i| mask & (1 << i) != 0) {
                if to_memory {
                    let value = env.ctx.regs.da(i);
                    write_mem(env, size, a, access, value);
                } else {
                    let value = size.sign_extend(read_mem(env, size, a, access));
                    set_da(&mut env.ctx.regs, i, value);
                }
                // Only the first transfer can use the translated resolution.
                access = None;
                a = a.wrapping_add(bytes);
            }
            if let Addr::PostInc(r) = addr {
                env.ctx.regs.set_a(r.into(), a);
            }
        }
    }
}

fn movep<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, size: Size, to_memory: bool, data: u8, areg: u8, disp: i16) {
    let base = env.ctx.regs.a(areg.into()).wrapping_add(disp as i32 as u32);
    let count = size.bytes();
    let d = usize::from(data);
    if to_memory {
        let value = env.ctx.regs.d[d];
        for i in 0..count {
            let byte = (value >> (8 * (count - 1 - i))) as u8;
            env.write8(base.wrapping_add(2 * i), byte);
        }
    } else {
        let mut value = 0u32;
        for i in 0..count {
            value = (value << 8) | u32::from(env.read8(base.wrapping_add(2 * i)));
        }
        let reg = &mut env.ctx.regs.d[d];
        *reg = (*reg & !size.mask()) | value;
    }
}

fn decrement_branch<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, cond: Cond, reg: u8) {
    let ctx = &mut *env.ctx;
    if cond.test(ctx.regs.sr) {
        ctx.branch_taken = false;
        ctx.add_clocks(2);
        return;
    }
    let d = &mut ctx.regs.d[usize::from(reg)];
    let counter = (*d as u16).wrapping_sub(1);
    *d = (*d & 0xFFFF_0000) | u32::from(counter);
    if counter == 0xFFFF {
        ctx.branch_taken = false;
        ctx.add_clocks(4);
    } else {
        ctx.branch_taken = true;
    }
}

fn check<B: GuestBus<Registers>>(env: &mut M68kEnv<'_, B>, src: Loc, reg: u8, next: u32) -> Flow {
    let bound = load(env, src, Size::Word) as u16 as i16;
    let value = env.ctx.regs.d[usize::from(reg)] as u16 as i16;
    let regs = &mut env.ctx.regs;
    if value < 0 {
        regs.sr |= N;
    } else if value > bound {
        regs.sr &= !N;
    } else {
        return Flow::Next;
    }
    env.ctx.add_clocks(CHECK_TRAP_CLOCKS);
    exception(env, vector::CHK, next)
}

#[allow(clippy::too_many_lines)]
pub(crate) fn execute<B: GuestBus<Registers>>(op: &Op, env: &mut M68kEnv<'_, B>) -> Flow {
    match *op {
        Op::Move { size, src, dst } => {
            let value = load(env, src, size);
            let target = resolve(env, dst, size);
            write(env, target, size, value);
            set_ccr_bits(&mut env.ctx.regs, NZVC, alu::nz(size, value));
        }
        Op::MoveA { size, src, reg } => {
            let value = size.sign_extend(load(env, src, size));
            env.ctx.regs.set_a(reg.into(), value);
        }
        Op::Alu { op, size, src, dst } => alu(env, op, size, src, dst),
        Op::AddrArith { op, size, src, reg } => {
            let s = size.sign_extend(load(env, src, size));
            let a = env.ctx.regs.a(reg.into());
            match op {
                AddrOp::Add => env.ctx.regs.set_a(reg.into(), a.wrapping_add(s)),
                AddrOp::Sub => env.ctx.regs.set_a(reg.into(), a.wrapping_sub(s)),
                AddrOp::Cmp => {
                    let r = alu::sub(Size::Long, s, a, 0);
                    set_ccr_bits(&mut env.ctx.regs, NZVC, r.ccr);
                }
            }
        }
        Op::Unary { op, size, dst } => unary(env, op, size, dst),
        Op::Ext { size, reg } => {
            let d = &mut env.ctx.regs.d[usize::from(reg)];
            let value = match size {
                Size::Long => *d as u16 as i16 as i32 as u32,
                _ => (*d & 0xFFFF_0000) | u32::from(*d as u8 as i8 as i16 as u16),
            };
            *d = value;
            let ccr = alu::nz(size, value);
            set_ccr_bits(&mut env.ctx.regs, NZVC, ccr);
        }
        Op::Swap(reg) => {
            let d = &mut env.ctx.regs.d[usize::from(reg)];
            *d = d.rotate_left(16);
            let ccr = alu::nz(Size::Long, *d);
            set_ccr_bits(&mut env.ctx.regs, NZVC, ccr);
        }
        Op::Exg(a, b) => {
            let ta = resolve(env, a, Size::Long);
            let tb = resolve(env, b, Size::Long);
            let va = read(env, ta, Size::Long);
            let vb = read(env, tb, Size::Long);
            write(env, ta, Size::Long, vb);
            write(env, tb, Size::Long, va);
        }
        Op::Shift { op, size, count, dst } => shift(env, op, size, count, dst),
        Op::Bit { op, bit: number, dst } => bit(env, op, number, dst),
        Op::Mul { signed, src, reg } => multiply(env, signed, src, reg),
        Op::Div { signed, src, reg, next } => return divide(env, signed, src, reg, next),
        Op::Bcd { subtract, src, dst } => {
            let s = load(env, src, Size::Byte) as u8;
            let target = resolve(env, dst, Size::Byte);
            let d = read(env, target, Size::Byte) as u8;
            let regs = &env.ctx.regs;
            let result = bcd(s, d, regs.x() as u8, subtract, regs.sr);
            write(env, target, Size::Byte, result.value);
            set_ccr_bits(&mut env.ctx.regs, XNZVC, result.ccr);
        }
        Op::Lea { addr, reg } => {
            let a = control_address(env, addr);
            env.ctx.regs.set_a(reg.into(), a);
        }
        Op::Pea(addr) => {
            let a = control_address(env, addr);
            push_long(env, a);
        }
        Op::MoveM {
            size,
            to_memory,
            mask,
            addr,
        } => movem(env, size, to_memory, mask, addr),
        Op::MoveP {
            size,
            to_memory,
            data,
            addr,
            disp,
        } => movep(env, size, to_memory, data, addr, disp),
        Op::SetCond { cond, dst } => {
            let set = cond.test(env.ctx.regs.sr);
            if set && matches!(dst, Loc::D(_)) {
                env.ctx.add_clocks(2);
            }
            let target = resolve(env, dst, Size::Byte);
            write(env, target, Size::Byte, if set { 0xFF } else { 0 });
        }
        Op::Test {
            cond,
            taken,
            not_taken,
        } => {
            let ctx = &mut *env.ctx;
            ctx.branch_taken = cond.test(ctx.regs.sr);
            ctx.add_clocks(if ctx.branch_taken { taken } else { not_taken });
        }
        Op::DecrementBranch { cond, reg } => decrement_branch(env, cond, reg),
        Op::PushPc(ret) => push_long(env, ret),
        Op::Jump(addr) => return Flow::Dispatch(control_address(env, addr)),
        Op::Jsr { addr, ret } => {
            let target = control_address(env, addr);
            push_long(env, ret);
            return Flow::Dispatch(target);
        }
        Op::Rts => return Flow::Dispatch(pop_long(env)),
        Op::Rtr => {
            let ccr = pop_word(env);
            env.ctx.regs.set_ccr(ccr as u8);
            return Flow::Dispatch(pop_long(env));
        }
        Op::Rte { pc } => {
            if let Some(flow) = privileged(env, pc) {
                return flow;
            }
            let sr = pop_word(env);
            let target = pop_long(env);
            write_sr(env, sr);
            return Flow::Dispatch(target);
        }
        Op::Link { reg, disp } => {
            let value = env.ctx.regs.a(reg.into());
            push_long(env, value);
            let regs = &mut env.ctx.regs;
            let sp = regs.active_sp();
            regs.set_a(reg.into(), sp);
            regs.set_active_sp(sp.wrapping_add(disp as u32));
        }
        Op::Unlk(reg) => {
            let frame = env.ctx.regs.a(reg.into());
            env.ctx.regs.set_active_sp(frame);
            let value = pop_long(env);
            env.ctx.regs.set_a(reg.into(), value);
        }
        Op::ToSr { src, ccr_only, pc } => {
            if !ccr_only && let Some(flow) = privileged(env, pc) {
                return flow;
            }
            let value = load(env, src, Size::Word) as u16;
            if ccr_only {
                env.ctx.regs.set_ccr(value as u8);
            } else {
                write_sr(env, value);
            }
        }
        Op::FromSr(dst) => {
            let sr = env.ctx.regs.sr;
            let target = resolve(env, dst, Size::Word);
            write(env, target, Size::Word, sr.into());
        }
        Op::LogicSr {
            op,
            value,
            ccr_only,
            pc,
        } => {
            if !ccr_only && let Some(flow) = privileged(env, pc) {
                return flow;
            }
            let sr = env.ctx.regs.sr;
            let new = match op {
                AluOp::And => sr & value,
                AluOp::Or => sr | value,
                _ => sr ^ value,
            };
            if ccr_only {
                set_ccr_bits(&mut env.ctx.regs, CCR_MASK, new);
            } else {
                write_sr(env, new);
            }
        }
        Op::MoveUsp { to_usp, reg, pc } => {
            if let Some(flow) = privileged(env, pc) {
                return flow;
            }
            let regs = &mut env.ctx.regs;
            if to_usp {
                regs.usp = regs.a(reg.into());
            } else {
                let usp = regs.usp;
                regs.set_a(reg.into(), usp);
            }
        }
        Op::Trap { vector, pc } => return exception(env, vector, pc),
        Op::TrapV { next } => {
            if env.ctx.regs.sr & V != 0 {
                env.ctx.add_clocks(CHECK_TRAP_CLOCKS);
                return exception(env, vector::TRAPV, next);
            }
        }
        Op::Chk { src, reg, next } => return check(env, src, reg, next),
        Op::Reset { pc } => {
            if let Some(flow) = privileged(env, pc) {
                return flow;
            }
            log::debug!("m68k: RESET instruction at {pc:#08X}");
        }
        Op::Stop { sr, pc, next } => {
            if let Some(flow) = privileged(env, pc) {
                return flow;
            }
            write_sr(env, sr);
            return Flow::Halt { resume: next };
        }
    }
    Flow::Next
}
