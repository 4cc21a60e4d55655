//! Fatal translation and execution errors.

use thiserror::Error;

/// Errors that stop the current run.
///
/// None of these have a recovery path inside the core: the guest hardware
/// defines no behaviour for them, so the caller is expected to report the
/// diagnostic and stop the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    /// The code budget is exhausted; there is nowhere to put translated code.
    #[error("code allocation of {requested} slots failed ({allocated} of {budget} in use)")]
    CodeAllocation {
        requested: usize,
        allocated: usize,
        budget: usize,
    },

    /// Native-address resolution hit an address with no executable backing.
    #[error("{cpu}: no executable memory at {address:#08X}")]
    UnmappedAddress { cpu: &'static str, address: u32 },

    /// Execution reached an opcode the decoder marks as illegal.
    #[error("{cpu}: illegal instruction at {address:#08X}: {bytes:02X?}")]
    IllegalInstruction {
        cpu: &'static str,
        address: u32,
        bytes: Vec<u8>,
    },

    /// A translated instruction has less room than a patch needs.
    #[error("{cpu}: instruction at {address:#08X} reserves {reserved} slots, patch needs {needed}")]
    FootprintTooSmall {
        cpu: &'static str,
        address: u32,
        reserved: usize,
        needed: usize,
    },
}
