//! Guest memory access from translated code.

use crate::cache::CodeCache;
use crate::context::GuestContext;
use crate::isa::Isa;
use crate::memmap::{Access, BufferId, HandlerId, MemMap};

/// Machine side of a guest CPU's address space.
///
/// The machine owns every flat buffer named in the memory map and
/// implements every handler. Handlers get the CPU context so they can
/// charge stall cycles or pull the cycle limit in.
pub trait GuestBus<R> {
    fn buffer(&self, id: BufferId) -> &[u8];

    fn buffer_mut(&mut self, id: BufferId) -> &mut [u8];

    fn read8(&mut self, handler: HandlerId, address: u32, ctx: &mut GuestContext<R>) -> u8;

    fn write8(&mut self, handler: HandlerId, address: u32, value: u8, ctx: &mut GuestContext<R>);

    /// Big-endian word read. Defaults to two byte reads.
    fn read16(&mut self, handler: HandlerId, address: u32, ctx: &mut GuestContext<R>) -> u16 {
        let hi = self.read8(handler, address, ctx);
        let lo = self.read8(handler, address.wrapping_add(1), ctx);
        u16::from_be_bytes([hi, lo])
    }

    /// Big-endian word write. Defaults to two byte writes.
    fn write16(&mut self, handler: HandlerId, address: u32, value: u16, ctx: &mut GuestContext<R>) {
        let [hi, lo] = value.to_be_bytes();
        self.write8(handler, address, hi, ctx);
        self.write8(handler, address.wrapping_add(1), lo, ctx);
    }

    /// Separate I/O space (8-bit guests only).
    fn io_read(&mut self, _port: u16, _ctx: &mut GuestContext<R>) -> u8 {
        0xFF
    }

    fn io_write(&mut self, _port: u16, _value: u8, _ctx: &mut GuestContext<R>) {}

    /// An instruction byte at `address` was fetched through the banked
    /// window served by `handler`.
    fn code_fetch(&mut self, _handler: HandlerId, _address: u32, _ctx: &mut GuestContext<R>) {}

    /// Called after translated code changes state the machine derives
    /// interrupt timing from (interrupt mask, interrupt enable).
    fn interrupt_state_changed(&mut self, _ctx: &mut GuestContext<R>) {}
}

/// Everything a guest operation can touch while it executes.
pub struct Env<'a, I: Isa, B> {
    pub ctx: &'a mut GuestContext<I::Regs>,
    pub bus: &'a mut B,
    pub memmap: &'a MemMap,
    pub(crate) cache: &'a mut CodeCache<I>,
}

impl<I: Isa, B: GuestBus<I::Regs>> Env<'_, I, B> {
    pub fn read8(&mut self, address: u32) -> u8 {
        let access = self.memmap.resolve(address);
        self.read8_at(access, address)
    }

    pub fn read16(&mut self, address: u32) -> u16 {
        let access = self.memmap.resolve(address);
        self.read16_at(access, address)
    }

    /// Read through an access resolved at translation time.
    pub fn read8_at(&mut self, access: Access, address: u32) -> u8 {
        match access {
            Access::Flat { buffer, index, .. } => {
                self.bus.buffer(buffer).get(index as usize).copied().unwrap_or(0xFF)
            }
            Access::Banked {
                handler: Some(handler),
                ..
            }
            | Access::Handler(handler) => self.bus.read8(handler, address, self.ctx),
            Access::Banked { slot, index, .. } => match self.ctx.mem_pointers.get(slot).copied().flatten() {
                Some(view) => self
                    .bus
                    .buffer(view.buffer)
                    .get((view.base + index) as usize)
                    .copied()
                    .unwrap_or(0xFF),
                None => 0xFF,
            },
            Access::Unmapped => {
                log::warn!("{}: read from unmapped address {address:#08X}", I::NAME);
                0xFF
            }
        }
    }

    pub fn read16_at(&mut self, access: Access, address: u32) -> u16 {
        match access {
            Access::Flat { buffer, index, .. } => {
                let mem = self.bus.buffer(buffer);
                let index = index as usize;
                match mem.get(index..index + 2) {
                    Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
                    _ => 0xFFFF,
                }
            }
            Access::Banked {
                handler: Some(handler),
                ..
            }
            | Access::Handler(handler) => self.bus.read16(handler, address, self.ctx),
            Access::Banked { .. } | Access::Unmapped => {
                let hi = self.read8_at(access, address);
                let lo = self.read8_at(self.next_byte(access), address.wrapping_add(1));
                u16::from_be_bytes([hi, lo])
            }
        }
    }

    pub fn write8(&mut self, address: u32, value: u8) {
        let access = self.memmap.resolve(address);
        self.write8_at(access, address, value);
    }

    pub fn write16(&mut self, address: u32, value: u16) {
        let access = self.memmap.resolve(address);
        self.write16_at(access, address, value);
    }

    /// Write through an access resolved at translation time.
    ///
    /// Writes that land in an executable chunk invalidate any translation
    /// covering the written byte before the next fetch can see it.
    pub fn write8_at(&mut self, access: Access, address: u32, value: u8) {
        match access {
            Access::Flat {
                buffer,
                index,
                writable,
                code,
            } => {
                if !writable {
                    log::trace!("{}: write to read-only {address:#08X} ignored", I::NAME);
                    return;
                }
                if let Some(slot) = self.bus.buffer_mut(buffer).get_mut(index as usize) {
                    *slot = value;
                }
                if let Some(chunk) = code {
                    self.cache.invalidate_write(self.memmap, chunk, address);
                }
            }
            Access::Banked {
                handler: Some(handler),
                ..
            }
            | Access::Handler(handler) => self.bus.write8(handler, address, value, self.ctx),
            Access::Banked { slot, index, .. } => {
                if let Some(view) = self.ctx.mem_pointers.get(slot).copied().flatten()
                    && let Some(byte) = self
                        .bus
                        .buffer_mut(view.buffer)
                        .get_mut((view.base + index) as usize)
                {
                    *byte = value;
                }
            }
            Access::Unmapped => {
                log::warn!("{}: write {value:#04X} to unmapped address {address:#08X}", I::NAME);
            }
        }
    }

    pub fn write16_at(&mut self, access: Access, address: u32, value: u16) {
        match access {
            Access::Banked {
                handler: Some(handler),
                ..
            }
            | Access::Handler(handler) => self.bus.write16(handler, address, value, self.ctx),
            _ => {
                let [hi, lo] = value.to_be_bytes();
                self.write8_at(access, address, hi);
                self.write8_at(self.next_byte(access), address.wrapping_add(1), lo);
            }
        }
    }

    fn next_byte(&self, access: Access) -> Access {
        match access {
            Access::Flat {
                buffer,
                index,
                writable,
                code,
            } => Access::Flat {
                buffer,
                index: index + 1,
                writable,
                code,
            },
            Access::Banked {
                slot,
                index,
                handler,
            } => Access::Banked {
                slot,
                index: index + 1,
                handler,
            },
            other => other,
        }
    }

    /// Resolve a guest address to translated code without translating.
    #[must_use]
    pub fn lookup(&self, address: u32) -> Option<crate::code::CodePtr> {
        self.cache
            .lookup(self.memmap, &self.ctx.mem_pointers, address)
    }
}
