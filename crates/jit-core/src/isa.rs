//! Seam between the shared backend and a guest instruction set.

use std::fmt;

use crate::bus::{Env, GuestBus};
use crate::cache::CodeCache;
use crate::code::{CodePtr, HostOp};
use crate::memmap::{Access, BankView, MemMap};

/// What translated code does after a guest operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the next slot.
    Next,
    /// Continue at a guest address computed at run time.
    Dispatch(u32),
    /// The CPU stopped (HALT, STOP); `resume` is where it restarts.
    Halt { resume: u32 },
}

/// Whether a translated instruction ends its basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    Continue,
    Terminal,
}

/// A guest instruction set.
pub trait Isa: Sized + 'static {
    type Regs: fmt::Debug + Clone + Default;
    /// Operation stored in translated code.
    type Op: fmt::Debug + Clone;
    /// Decoded instruction.
    type Inst: fmt::Debug + Clone;

    /// Short CPU name used in diagnostics.
    const NAME: &'static str;
    /// log2 of the address-map unit in bytes.
    const UNIT_SHIFT: u32;
    /// Longest possible encoding; the decoder is always given this many bytes.
    const MAX_INST_BYTES: usize;
    /// Upper bound on slots one translated instruction may use.
    const MAX_INST_SLOTS: usize;

    /// Decode one instruction from the start of `bytes`. Never fails:
    /// undefined encodings decode to an illegal instruction.
    fn decode(bytes: &[u8]) -> Self::Inst;

    /// Encoded length in bytes.
    fn length(inst: &Self::Inst) -> u32;

    fn is_illegal(inst: &Self::Inst) -> bool;

    /// Static cost in CPU clocks, charged by the instruction prologue.
    fn base_cycles(inst: &Self::Inst) -> u32;

    /// Emit the body of `inst` (the prologue is already in place).
    fn translate(inst: &Self::Inst, pc: u32, em: &mut Emitter<'_, Self>) -> BlockEnd;

    /// Execute one translated operation.
    fn execute<B: GuestBus<Self::Regs>>(op: &Self::Op, env: &mut Env<'_, Self, B>) -> Flow;
}

/// Scratch buffer one instruction is translated into before it is placed
/// in the code buffer.
pub struct Emitter<'a, I: Isa> {
    pub(crate) ops: Vec<HostOp<I::Op>>,
    /// Slot indices of unlinked jumps and the guest address they target.
    pub(crate) links: Vec<(usize, u32)>,
    cache: &'a CodeCache<I>,
    memmap: &'a MemMap,
    views: &'a [Option<BankView>],
    divider: u32,
}

impl<'a, I: Isa> Emitter<'a, I> {
    pub(crate) fn new(
        cache: &'a CodeCache<I>,
        memmap: &'a MemMap,
        views: &'a [Option<BankView>],
        divider: u32,
    ) -> Self {
        Self {
            ops: Vec::with_capacity(I::MAX_INST_SLOTS),
            links: Vec::new(),
            cache,
            memmap,
            views,
            divider,
        }
    }

    pub fn op(&mut self, op: I::Op) {
        self.ops.push(HostOp::Guest(op));
    }

    /// Charge `clocks` extra CPU clocks at this point of the instruction.
    pub fn add_clocks(&mut self, clocks: u32) {
        if clocks > 0 {
            self.ops.push(HostOp::AddCycles(clocks * self.divider));
        }
    }

    /// Resolve a statically known data address.
    #[must_use]
    pub fn access(&self, address: u32) -> Access {
        self.memmap.resolve(address)
    }

    /// End the block with an illegal-instruction exit, for an instruction
    /// whose operands the translator cannot express.
    pub fn illegal(&mut self, pc: u32) -> BlockEnd {
        self.ops.push(HostOp::Illegal { pc });
        BlockEnd::Terminal
    }

    /// Unconditional transfer to a statically known guest address.
    pub fn jump(&mut self, target: u32) {
        self.transfer(target, false);
    }

    /// Transfer taken when the preceding guest op set the branch flag.
    pub fn jump_if(&mut self, target: u32) {
        self.transfer(target, true);
    }

    fn transfer(&mut self, target: u32, conditional: bool) {
        let target = target & self.memmap.address_mask();
        if self.memmap.is_banked(target) || self.memmap.code_location(target, self.views).is_none() {
            self.ops.push(if conditional {
                HostOp::GotoIf(target)
            } else {
                HostOp::Goto(target)
            });
            return;
        }
        let dest = self
            .cache
            .lookup(self.memmap, self.views, target)
            .unwrap_or(CodePtr::UNLINKED);
        if dest.is_unlinked() {
            self.links.push((self.ops.len(), target));
        }
        self.ops.push(if conditional {
            HostOp::JumpIf(dest)
        } else {
            HostOp::Jump(dest)
        });
    }

    /// Slots emitted so far, prologue included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
