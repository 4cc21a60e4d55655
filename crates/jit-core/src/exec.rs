//! Executor for translated code.

use crate::bus::{Env, GuestBus};
use crate::code::{CodePtr, HostOp};
use crate::isa::{Flow, Isa};

/// Why translated code stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeExit {
    /// Cycle limit reached at the prologue in `site` for instruction `pc`.
    CycleLimit { pc: u32, site: CodePtr },
    Halt { resume: u32 },
    Untranslated { pc: u32 },
    Retranslate { pc: u32, site: CodePtr },
    /// Breakpoint at `pc`; its cycles are charged, execution goes on at `resume`.
    Breakpoint { pc: u32, resume: CodePtr },
    Illegal { pc: u32 },
}

/// Run translated code from `start` until something needs the run entry.
pub(crate) fn run_native<I: Isa, B: GuestBus<I::Regs>>(
    env: &mut Env<'_, I, B>,
    start: CodePtr,
) -> NativeExit {
    let mut ip = start;
    let mut pc = 0;
    loop {
        let Some(op) = env.cache.arena.get(ip).cloned() else {
            log::error!("{}: execution left translated code at {ip:?}", I::NAME);
            return NativeExit::Illegal { pc };
        };
        let here = ip;
        ip = ip.add(1);
        match op {
            HostOp::Nop => {}
            HostOp::Prologue { pc: at, cycles } => {
                if env.ctx.current_cycle >= env.ctx.target_cycle {
                    return NativeExit::CycleLimit { pc: at, site: here };
                }
                env.ctx.current_cycle += cycles;
                pc = at;
            }
            HostOp::Breakpoint { pc: at, cycles } => {
                if env.ctx.current_cycle >= env.ctx.target_cycle {
                    return NativeExit::CycleLimit { pc: at, site: here };
                }
                env.ctx.current_cycle += cycles;
                return NativeExit::Breakpoint { pc: at, resume: ip };
            }
            HostOp::Retranslate { pc: at } => return NativeExit::Retranslate { pc: at, site: here },
            HostOp::AddCycles(cycles) => env.ctx.current_cycle += cycles,
            HostOp::BankedFetch { handler, pc: at, bytes } => {
                for i in 0..bytes {
                    env.bus.code_fetch(handler, at.wrapping_add(i), env.ctx);
                }
            }
            HostOp::Guest(op) => match I::execute(&op, env) {
                Flow::Next => {}
                Flow::Dispatch(target) => match env.lookup(target) {
                    Some(dest) => ip = dest,
                    None => return NativeExit::Untranslated { pc: target },
                },
                Flow::Halt { resume } => return NativeExit::Halt { resume },
            },
            HostOp::Jump(dest) => {
                if dest.is_unlinked() {
                    log::error!("{}: unlinked jump at {here:?} after {pc:#06X}", I::NAME);
                    return NativeExit::Illegal { pc };
                }
                ip = dest;
            }
            HostOp::JumpIf(dest) => {
                if env.ctx.branch_taken {
                    if dest.is_unlinked() {
                        log::error!("{}: unlinked branch at {here:?} after {pc:#06X}", I::NAME);
                        return NativeExit::Illegal { pc };
                    }
                    ip = dest;
                }
            }
            HostOp::Goto(target) => match env.lookup(target) {
                Some(dest) => ip = dest,
                None => return NativeExit::Untranslated { pc: target },
            },
            HostOp::GotoIf(target) => {
                if env.ctx.branch_taken {
                    match env.lookup(target) {
                        Some(dest) => ip = dest,
                        None => return NativeExit::Untranslated { pc: target },
                    }
                }
            }
            HostOp::Illegal { pc: at } => return NativeExit::Illegal { pc: at },
        }
    }
}
