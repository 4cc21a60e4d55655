//! Guest-independent dynamic translation backend.
//!
//! Guest code is translated one basic block at a time into slots of
//! [`HostOp`], placed in page-granular regions by the [`CodeArena`], and
//! indexed by guest address in per-region [`NativeAddressMap`]s. Direct
//! branches to code that does not exist yet are queued in
//! [`DeferredLinks`] and patched once their target is translated.
//!
//! Emitted code is append-only with two exceptions, both confined to the
//! single entry slot every instruction reserves:
//!
//! - a guest write over translated bytes replaces the entry with
//!   [`HostOp::Retranslate`];
//! - a debugger breakpoint replaces it with [`HostOp::Breakpoint`].
//!
//! Retranslation then rewrites the instruction's reserved footprint in
//! place, or moves it to a new block and leaves a jump behind.

mod arena;
mod bus;
mod cache;
mod code;
mod context;
mod deferred;
mod error;
mod exec;
mod isa;
mod jit;
mod memmap;
mod native_map;

pub use arena::{CodeArena, CodeBuffer, PAGE_SLOTS};
pub use bus::{Env, GuestBus};
pub use cache::{CacheStats, CodeCache, NativeMaps};
pub use code::{CodePtr, HostOp, PATCH_FOOTPRINT};
pub use context::GuestContext;
pub use deferred::{DeferredAddress, DeferredLinks};
pub use error::JitError;
pub use isa::{BlockEnd, Emitter, Flow, Isa};
pub use jit::{DebugHook, Jit, JitOptions, Stop};
pub use memmap::{
    Access, Backing, BankView, BufferId, CodeLocation, HandlerId, MapKey, MemFlags, MemMap,
    MemMapChunk,
};
pub use native_map::{NativeAddressMap, NativeEntry};
