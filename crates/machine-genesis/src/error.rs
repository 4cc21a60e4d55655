//! Errors surfaced by a Genesis session.

use jit_core::JitError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// A CPU hit a fatal translation or execution error.
    #[error(transparent)]
    Jit(#[from] JitError),

    #[error("ROM image is empty")]
    EmptyRom,

    #[error("ROM image of {len} bytes does not fit the 4 MiB cartridge window")]
    RomTooLarge { len: usize },

    #[error("snapshot {what} is {found} bytes, expected {expected}")]
    SnapshotMismatch {
        what: &'static str,
        found: usize,
        expected: usize,
    },
}
