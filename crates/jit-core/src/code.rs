//! Host instruction set for translated code.
//!
//! Translated guest code is a sequence of [`HostOp`] slots living in code
//! regions handed out by the [`CodeArena`](crate::CodeArena). A slot is the
//! unit of patching: every translated guest instruction starts with exactly
//! one prologue slot, and the only in-place rewrites ever made to emitted
//! code replace that slot (see [`PATCH_FOOTPRINT`]).

use std::fmt;

use crate::memmap::HandlerId;

/// Number of slots an in-place patch overwrites.
///
/// SMC invalidation, breakpoint injection and relocation after a
/// retranslation each replace a single slot at the instruction start.
pub const PATCH_FOOTPRINT: usize = 1;

/// Location of a host instruction: a code region and a slot offset in it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodePtr {
    region: u32,
    offset: u32,
}

impl CodePtr {
    /// Placeholder target for links that have not been resolved yet.
    pub const UNLINKED: Self = Self {
        region: u32::MAX,
        offset: u32::MAX,
    };

    #[must_use]
    pub const fn new(region: u32, offset: u32) -> Self {
        Self { region, offset }
    }

    #[must_use]
    pub const fn region(self) -> u32 {
        self.region
    }

    #[must_use]
    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// The slot `slots` positions further on in the same region.
    #[must_use]
    pub const fn add(self, slots: u32) -> Self {
        Self {
            region: self.region,
            offset: self.offset + slots,
        }
    }

    #[must_use]
    pub const fn is_unlinked(self) -> bool {
        self.region == u32::MAX
    }
}

impl fmt::Debug for CodePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlinked() {
            write!(f, "CodePtr(unlinked)")
        } else {
            write!(f, "CodePtr({}:{:#x})", self.region, self.offset)
        }
    }
}

/// One slot of translated code.
///
/// `X` is the guest-specific operation type. Everything else is shared
/// control flow and cycle accounting, so the executor and the patching
/// machinery never need to know which guest produced the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp<X> {
    /// Padding left by an in-place retranslation.
    Nop,
    /// Instruction start: return to the scheduler if the cycle limit has
    /// been reached, otherwise charge `cycles` master clocks.
    Prologue { pc: u32, cycles: u32 },
    /// Instruction start whose guest bytes changed after translation.
    Retranslate { pc: u32 },
    /// Instruction start with a debugger breakpoint. Performs the same limit
    /// check and charge as the prologue it replaced.
    Breakpoint { pc: u32, cycles: u32 },
    /// Charge extra master clocks (taken branches, repeat iterations).
    AddCycles(u32),
    /// Instruction bytes `pc..pc + bytes` come through a banked window whose
    /// handler charges the bus cost of each fetch.
    BankedFetch {
        handler: HandlerId,
        pc: u32,
        bytes: u32,
    },
    /// Guest operation with operands already resolved.
    Guest(X),
    /// Direct transfer to translated code. Patchable while unlinked.
    Jump(CodePtr),
    /// Direct transfer taken when the preceding guest op set the branch flag.
    JumpIf(CodePtr),
    /// Transfer to a guest address through a live native-address lookup.
    Goto(u32),
    /// Live-lookup transfer taken when the branch flag is set.
    GotoIf(u32),
    /// Decoder gap or genuine guest fault; executing it ends the run.
    Illegal { pc: u32 },
}

impl<X> HostOp<X> {
    /// Whether this slot is an instruction start.
    #[must_use]
    pub const fn is_instruction_start(&self) -> bool {
        matches!(
            self,
            Self::Prologue { .. } | Self::Retranslate { .. } | Self::Breakpoint { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlinked_is_distinct_from_real_pointers() {
        assert!(CodePtr::UNLINKED.is_unlinked());
        assert!(!CodePtr::new(0, 0).is_unlinked());
        assert_eq!(CodePtr::new(2, 5).add(3), CodePtr::new(2, 8));
    }

    #[test]
    fn only_entry_slots_are_instruction_starts() {
        let prologue: HostOp<()> = HostOp::Prologue { pc: 0, cycles: 4 };
        let bp: HostOp<()> = HostOp::Breakpoint { pc: 0, cycles: 4 };
        assert!(prologue.is_instruction_start());
        assert!(bp.is_instruction_start());
        assert!(!HostOp::<()>::Jump(CodePtr::new(0, 1)).is_instruction_start());
    }
}
