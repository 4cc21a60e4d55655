//! Z80 side of the system bus.

use emu_core::{Cycle, Peripheral};
use jit_core::{BufferId, GuestBus, GuestContext, HandlerId};
use zilog_z80::Registers;

use crate::bus::Hardware;
use crate::config::MCLKS_PER_68K;
use crate::memory::{BANK_SLOT, H_BANK_REG, H_BANK_WINDOW, H_YM, H_Z80_VDP};

type Z80Context = GuestContext<Registers>;

/// Z80 clocks added to each bank window access while it waits for the 68K bus.
const WINDOW_Z80_CLOCKS: u32 = 3;
/// 68K clocks lost to each bank window access.
const WINDOW_68K_CLOCKS: u32 = 8;

/// Borrowed view of the machine for one Z80 run.
pub(crate) struct Z80Bus<'a> {
    hw: &'a mut Hardware,
    dirty: &'a mut Vec<u32>,
    /// The 68K holds its bus until this cycle.
    locked_until: Cycle,
    /// Master clocks the 68K owes for window accesses made during this run.
    pub m68k_stall: Cycle,
}

impl<'a> Z80Bus<'a> {
    pub(crate) fn new(hw: &'a mut Hardware, dirty: &'a mut Vec<u32>, locked_until: Cycle) -> Self {
        Self {
            hw,
            dirty,
            locked_until,
            m68k_stall: 0,
        }
    }

    fn window_address(&self, address: u32) -> u32 {
        u32::from(self.hw.bank) << 15 | (address & 0x7FFF)
    }

    /// Take the 68K bus for one access.
    fn arbitrate(&mut self, ctx: &mut Z80Context) {
        if ctx.current_cycle < self.locked_until {
            ctx.idle_until(self.locked_until);
        }
        ctx.add_clocks(WINDOW_Z80_CLOCKS);
        self.m68k_stall += WINDOW_68K_CLOCKS * MCLKS_PER_68K;
    }

    fn window_read(&mut self, address: u32, ctx: &mut Z80Context) -> u8 {
        self.arbitrate(ctx);
        let target = self.window_address(address);
        self.hw.mem.read_m68k(target).unwrap_or_else(|| {
            log::warn!("z80: bank read from unsupported {target:#08X}");
            0xFF
        })
    }

    fn window_write(&mut self, address: u32, value: u8, ctx: &mut Z80Context) {
        self.arbitrate(ctx);
        let target = self.window_address(address);
        if let Some(written) = self.hw.mem.write_m68k(target, value) {
            self.dirty.push(written);
        }
    }

    /// Run `f` against the VDP port block at the Z80's clock, waiting out
    /// any VDP stall.
    fn vdp_access<T>(
        &mut self,
        ctx: &mut Z80Context,
        f: impl FnOnce(&mut Hardware, Cycle) -> T,
    ) -> T {
        let now = ctx.current_cycle;
        self.hw.vdp.run_to(now);
        let before = self.hw.vdp.current_cycle();
        let value = f(&mut *self.hw, now);
        let after = self.hw.vdp.current_cycle();
        if after != before {
            ctx.idle_until(after);
        }
        value
    }
}

impl GuestBus<Registers> for Z80Bus<'_> {
    fn buffer(&self, id: BufferId) -> &[u8] {
        self.hw.mem.buffer(id)
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut [u8] {
        self.hw.mem.buffer_mut(id)
    }

    fn read8(&mut self, handler: HandlerId, address: u32, ctx: &mut Z80Context) -> u8 {
        match handler {
            H_YM => {
                self.hw.ym.run_to(ctx.current_cycle);
                self.hw.ym.read_status()
            }
            H_BANK_REG => 0xFF,
            H_Z80_VDP => {
                let port = address & 0xFF;
                if port >= 0x20 {
                    log::warn!("z80: read from VDP port {port:#04X}");
                    return 0xFF;
                }
                self.vdp_access(ctx, |hw, _| hw.vdp_read_byte(port))
            }
            H_BANK_WINDOW => self.window_read(address, ctx),
            _ => {
                log::warn!("z80: read {address:#06X} through unknown handler {handler:?}");
                0xFF
            }
        }
    }

    fn write8(&mut self, handler: HandlerId, address: u32, value: u8, ctx: &mut Z80Context) {
        match handler {
            H_YM => {
                self.hw.ym.run_to(ctx.current_cycle);
                self.hw.ym.write((address & 3) as u8, value);
            }
            H_BANK_REG => {
                if address & 0xFF00 == 0x6000 {
                    ctx.mem_pointers[BANK_SLOT] = self.hw.shift_bank(value);
                }
            }
            H_Z80_VDP => {
                let port = address & 0xFF;
                if port >= 0x20 {
                    log::warn!("z80: write {value:#04X} to VDP port {port:#04X} ignored");
                    return;
                }
                self.vdp_access(ctx, |hw, now| hw.vdp_write_byte(port, value, now));
            }
            H_BANK_WINDOW => self.window_write(address, value, ctx),
            _ => log::warn!("z80: write {address:#06X} through unknown handler {handler:?}"),
        }
    }

    /// Code in the bank window is fetched over the 68K bus like data.
    fn code_fetch(&mut self, handler: HandlerId, address: u32, ctx: &mut Z80Context) {
        if handler == H_BANK_WINDOW {
            self.arbitrate(ctx);
        } else {
            log::warn!("z80: fetch {address:#06X} through unknown handler {handler:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MCLKS_PER_Z80;

    #[test]
    fn window_fetch_stalls_both_cpus() {
        let mut hw = Hardware::blank();
        let mut dirty = Vec::new();
        let mut bus = Z80Bus::new(&mut hw, &mut dirty, 0);
        let mut ctx = Z80Context::new(MCLKS_PER_Z80, 1);
        bus.code_fetch(H_BANK_WINDOW, 0x8000, &mut ctx);
        bus.code_fetch(H_BANK_WINDOW, 0x8001, &mut ctx);
        assert_eq!(ctx.current_cycle, 2 * WINDOW_Z80_CLOCKS * MCLKS_PER_Z80);
        assert_eq!(bus.m68k_stall, 2 * WINDOW_68K_CLOCKS * MCLKS_PER_68K);
    }

    #[test]
    fn window_fetch_waits_for_locked_68k_bus() {
        let mut hw = Hardware::blank();
        let mut dirty = Vec::new();
        let mut bus = Z80Bus::new(&mut hw, &mut dirty, 1000);
        let mut ctx = Z80Context::new(MCLKS_PER_Z80, 1);
        bus.code_fetch(H_BANK_WINDOW, 0x8000, &mut ctx);
        // 1000 rounded up to Z80 clocks, then the access itself.
        assert_eq!(ctx.current_cycle, 1005 + WINDOW_Z80_CLOCKS * MCLKS_PER_Z80);
        assert!(dirty.is_empty());
    }
}
