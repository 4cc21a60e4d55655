//! Zilog Z80 executed by dynamic translation.
//!
//! Instructions are decoded from opcode tables into [`Instruction`]
//! records, translated into host-op blocks by [`Z80Isa`], and run by the
//! shared `jit-core` backend. [`Z80`] wraps that with the run entry the
//! scheduler calls: interrupt acceptance (IM 0/1/2 and NMI), HALT idling,
//! and the EI shadow. Cycle counts are master clocks, T-states times the
//! clock divider.

mod alu;
mod cpu;
mod decode;
mod disasm;
pub mod flags;
mod inst;
mod ops;
mod registers;
mod translate;

pub use cpu::{Z80, Z80Isa, Z80Snapshot};
pub use decode::decode;
pub use disasm::disassemble;
pub use inst::{Cond, Instruction, Mnemonic, Operand, Reg8, Reg16};
pub use registers::Registers;
