//! Motorola 68000 executed by dynamic translation.
//!
//! Opcode words are decoded into [`Instruction`] records with their
//! extension words already read, translated into host-op blocks by
//! [`M68kIsa`], and run by the shared `jit-core` backend. [`M68k`] adds
//! the run entry the scheduler calls: autovectored interrupts, STOP and
//! the reset exception.
//!
//! PC-relative operands are resolved to absolute addresses at translation
//! time. Word and long accesses ignore address bit 0. Cycle counts are
//! master clocks, 68000 clocks times the clock divider.

mod alu;
mod cpu;
mod decode;
mod disasm;
pub mod flags;
mod inst;
mod ops;
mod registers;
mod timing;
mod translate;

pub use cpu::{M68k, M68kBus, M68kIsa, M68kSnapshot};
pub use decode::decode;
pub use disasm::disassemble;
pub use flags::Cond;
pub use inst::{Ea, IndexReg, Instruction, Mnemonic, Operand, Size};
pub use registers::Registers;
pub use timing::base_cycles;
