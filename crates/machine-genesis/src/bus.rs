//! 68000 side of the system bus.
//!
//! [`MainBus`] owns every chip except the 68000 itself, including the Z80,
//! so a 68K handler can bring the Z80 up to date before touching shared
//! state. The Z80 sees the same chips through [`Z80Bus`](crate::z80_bus::Z80Bus),
//! a short-lived view over [`Hardware`].

use emu_core::{CYCLE_NEVER, Cycle, Peripheral, align_up};
use jit_core::{BankView, BufferId, GuestBus, GuestContext, HandlerId, JitError};
use motorola_68000::{M68kBus, Registers};
use sega_vdp::Vdp;
use ti_sn76489::Sn76489;
use yamaha_ym2612::Ym2612;
use zilog_z80::Z80;

use crate::config::{GenesisConfig, InterruptLatency, MCLKS_PER_68K};
use crate::io::IoPorts;
use crate::memory::{BANK_SLOT, H_IO, H_VDP, H_Z80_AREA, Memory};

pub(crate) type M68kContext = GuestContext<Registers>;

/// Chips and memory both CPUs can reach.
#[derive(Debug)]
pub(crate) struct Hardware {
    pub mem: Memory,
    pub vdp: Vdp,
    pub psg: Sn76489,
    pub ym: Ym2612,
    pub io: IoPorts,
    /// Z80 window bank: 68K address bits 15-23.
    pub bank: u16,
}

impl Hardware {
    /// Shift bit 0 of `value` into the top of the 9-bit bank register.
    pub fn shift_bank(&mut self, value: u8) -> Option<BankView> {
        self.bank = (self.bank >> 1 | u16::from(value & 1) << 8) & 0x1FF;
        log::trace!("z80: bank {:#05X}", self.bank);
        self.mem.bank_view(self.bank)
    }

    /// Word write to the VDP port block; `now` is the writer's clock.
    pub fn vdp_write_word(&mut self, port: u32, value: u16, now: Cycle) {
        match port & 0x1F {
            0x00..=0x03 => self.vdp.write_data(value),
            0x04..=0x07 => {
                if self.vdp.write_control(value) {
                    self.vdp.run_dma_done(&mut self.mem, CYCLE_NEVER);
                }
            }
            0x10..=0x17 => {
                self.psg.run_to(now);
                self.psg.write(value as u8);
            }
            other => log::warn!("vdp: write {value:#06X} to port {other:#04X} ignored"),
        }
    }

    /// Byte writes to the VDP ports put the byte on both halves of the bus.
    pub fn vdp_write_byte(&mut self, port: u32, value: u8, now: Cycle) {
        match port & 0x1F {
            0x10..=0x17 => {
                if port & 1 != 0 {
                    self.psg.run_to(now);
                    self.psg.write(value);
                }
            }
            _ => self.vdp_write_word(port, u16::from_be_bytes([value, value]), now),
        }
    }

    pub fn vdp_read_word(&mut self, port: u32) -> u16 {
        match port & 0x1F {
            0x00..=0x03 => self.vdp.read_data(),
            0x04..=0x07 => self.vdp.read_control(),
            0x08..=0x0F => self.vdp.hv_counter(),
            other => {
                log::warn!("vdp: read from port {other:#04X}");
                0xFFFF
            }
        }
    }

    pub fn vdp_read_byte(&mut self, port: u32) -> u8 {
        let [hi, lo] = self.vdp_read_word(port & !1).to_be_bytes();
        if port & 1 == 0 { hi } else { lo }
    }
}

#[cfg(test)]
impl Hardware {
    /// NTSC chips around a blank 32K cartridge.
    pub(crate) fn blank() -> Self {
        use crate::config::{AUDIO_SAMPLE_RATE, MCLKS_PER_PSG, MCLKS_PER_YM, Region};

        let region = Region::Ntsc;
        Self {
            mem: Memory::new(vec![0; 0x8000]).expect("rom"),
            vdp: Vdp::new(false),
            psg: Sn76489::new(region.master_clock(), MCLKS_PER_PSG, AUDIO_SAMPLE_RATE),
            ym: Ym2612::new(MCLKS_PER_YM),
            io: IoPorts::new(region),
            bank: 0,
        }
    }
}

/// The 68000's view of the machine.
pub struct MainBus {
    pub(crate) hw: Hardware,
    pub(crate) z80: Z80,
    pub(crate) busreq: bool,
    pub(crate) z80_reset: bool,
    pub(crate) z80_enabled: bool,
    /// Level the 68K sees once `ctx.int_cycle` is reached.
    pub(crate) int_level: u8,
    pub(crate) refresh_counter: Cycle,
    pub(crate) last_sync: Cycle,
    /// VDP frame number at the last sync.
    pub(crate) frame: u32,
    /// Frame whose Z80 interrupt pulse has been scheduled.
    pub(crate) z80_int_frame: Option<u32>,
    /// External stop request; `CYCLE_NEVER` when running by frames.
    pub(crate) stop_cycle: Cycle,
    /// Return to the scheduler at the next instruction boundary.
    pub(crate) return_requested: bool,
    /// 68K addresses the Z80 wrote through its bank window since the last sync.
    pub(crate) dirty: Vec<u32>,
    /// Error from a Z80 run inside a 68K handler, reported by the scheduler.
    pub(crate) fault: Option<JitError>,
    pub(crate) sync_interval: Cycle,
    pub(crate) int_latency: InterruptLatency,
}

impl MainBus {
    pub(crate) fn new(hw: Hardware, z80: Z80, config: &GenesisConfig) -> Self {
        Self {
            hw,
            z80,
            busreq: false,
            z80_reset: true,
            z80_enabled: config.z80_enabled,
            int_level: 0,
            refresh_counter: 0,
            last_sync: 0,
            frame: 0,
            z80_int_frame: None,
            stop_cycle: CYCLE_NEVER,
            return_requested: false,
            dirty: Vec::new(),
            fault: None,
            sync_interval: config.sync_interval,
            int_latency: config.int_latency,
        }
    }

    /// Reset button: Z80 held in reset with the bus released, YM cleared.
    pub(crate) fn reset(&mut self) {
        self.busreq = false;
        self.z80_reset = true;
        self.z80.reset();
        self.hw.ym.reset();
        self.hw.bank = 0;
        self.z80.ctx.mem_pointers[BANK_SLOT] = self.hw.mem.bank_view(0);
        self.z80_int_frame = None;
    }

    /// The 68K may access Z80 space.
    #[must_use]
    pub fn z80_granted(&self) -> bool {
        !self.z80_enabled || (self.busreq && !self.z80_reset)
    }

    fn z80_area_read(&mut self, address: u32, ctx: &mut M68kContext) -> u8 {
        self.charge_refresh(ctx);
        // One wait state on every access to Z80 space.
        ctx.add_clocks(1);
        let value = if self.z80_granted() {
            match address & 0x7FFF {
                a @ 0x0000..=0x3FFF => self.hw.mem.z80_ram[(a & 0x1FFF) as usize],
                0x4000..=0x5FFF => {
                    self.hw.ym.run_to(ctx.current_cycle);
                    self.hw.ym.read_status()
                }
                0x6000..=0x7EFF => 0xFF,
                _ => {
                    log::warn!("m68k: read of Z80 VDP window {address:#08X}");
                    0xFF
                }
            }
        } else {
            log::warn!("m68k: Z80 space read {address:#08X} without bus grant");
            0xFF
        };
        self.skip_refresh(ctx);
        value
    }

    fn z80_area_write(&mut self, address: u32, value: u8, ctx: &mut M68kContext) {
        self.charge_refresh(ctx);
        ctx.add_clocks(1);
        if self.z80_granted() {
            match address & 0x7FFF {
                a @ 0x0000..=0x3FFF => {
                    let offset = (a & 0x1FFF) as u16;
                    self.hw.mem.z80_ram[usize::from(offset)] = value;
                    self.z80.invalidate_write(offset);
                }
                a @ 0x4000..=0x5FFF => {
                    self.hw.ym.run_to(ctx.current_cycle);
                    self.hw.ym.write((a & 3) as u8, value);
                }
                0x6000..=0x60FF => {
                    self.z80.ctx.mem_pointers[BANK_SLOT] = self.hw.shift_bank(value);
                }
                a => log::warn!("m68k: write {value:#04X} to Z80 address {a:#06X} ignored"),
            }
        } else {
            log::warn!("m68k: Z80 space write {address:#08X} without bus grant ignored");
        }
        self.skip_refresh(ctx);
    }

    fn io_read(&mut self, address: u32, ctx: &mut M68kContext) -> u8 {
        self.charge_refresh(ctx);
        self.hw.io.run_to(ctx.current_cycle);
        let offset = address & 0xFFFF;
        let value = if offset < 0x100 {
            match offset >> 1 {
                0x0 => self.hw.io.version(),
                n @ 0x1..=0x3 => self.hw.io.read_data(n as usize - 1),
                n @ 0x4..=0x6 => self.hw.io.control(n as usize - 4),
                // Serial registers.
                0x7..=0xF => 0,
                _ => 0xFF,
            }
        } else {
            match offset & 0xFF00 {
                0x1100 => u8::from(!self.z80_granted()),
                0x1200 => u8::from(!self.z80_reset),
                0x1000 | 0x1300 => 0xFF,
                _ => {
                    log::warn!("m68k: read of unmapped I/O address {address:#08X}");
                    0xFF
                }
            }
        };
        self.skip_refresh(ctx);
        value
    }

    fn io_write(&mut self, address: u32, value: u8, ctx: &mut M68kContext) {
        self.charge_refresh(ctx);
        self.hw.io.run_to(ctx.current_cycle);
        let offset = address & 0xFFFF;
        if offset < 0x100 {
            match offset >> 1 {
                n @ 0x1..=0x3 => self.hw.io.write_data(n as usize - 1, value),
                n @ 0x4..=0x6 => self.hw.io.write_control(n as usize - 4, value),
                _ => {}
            }
        } else {
            match offset & 0xFF00 {
                0x1100 => self.write_busreq(value & 1 != 0, ctx),
                0x1200 => self.write_z80_reset(value & 1 == 0, ctx),
                0x1000 | 0x1300 => {}
                _ => log::warn!("m68k: write {value:#04X} to unmapped I/O address {address:#08X}"),
            }
        }
        self.skip_refresh(ctx);
    }

    fn write_busreq(&mut self, request: bool, ctx: &mut M68kContext) {
        if request == self.busreq {
            return;
        }
        let now = ctx.current_cycle;
        self.sync_z80(ctx, now, 0);
        self.busreq = request;
        log::debug!(
            "z80: bus {} at cycle {now}",
            if request { "requested" } else { "released" }
        );
    }

    fn write_z80_reset(&mut self, assert: bool, ctx: &mut M68kContext) {
        let now = ctx.current_cycle;
        self.sync_z80(ctx, now, 0);
        if assert {
            if !self.z80_reset {
                log::debug!("z80: reset asserted at cycle {now}");
                self.z80.reset();
            }
            self.hw.ym.run_to(now);
            self.hw.ym.reset();
        } else if self.z80_reset {
            log::debug!("z80: reset released at cycle {now}");
        }
        self.z80_reset = assert;
    }

    /// Bring everything up to date, then run `f` against the VDP port
    /// block. If the VDP had to advance (FIFO full, read wait, DMA), the
    /// 68K stalls until the VDP's clock and the Z80 is kept off the bus
    /// meanwhile.
    fn vdp_access<T>(
        &mut self,
        ctx: &mut M68kContext,
        f: impl FnOnce(&mut Hardware, Cycle) -> T,
    ) -> T {
        self.sync_components(ctx);
        let before = self.hw.vdp.current_cycle();
        let value = f(&mut self.hw, ctx.current_cycle);
        let after = self.hw.vdp.current_cycle();
        if after != before {
            let resume = align_up(after, MCLKS_PER_68K).max(ctx.current_cycle);
            log::trace!("m68k: VDP stall {} -> {resume}", ctx.current_cycle);
            ctx.current_cycle = resume;
            self.sync_z80(ctx, resume, resume);
            self.skip_refresh(ctx);
        }
        self.adjust_int_cycle(ctx);
        value
    }
}

impl GuestBus<Registers> for MainBus {
    fn buffer(&self, id: BufferId) -> &[u8] {
        self.hw.mem.buffer(id)
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut [u8] {
        self.hw.mem.buffer_mut(id)
    }

    fn read8(&mut self, handler: HandlerId, address: u32, ctx: &mut M68kContext) -> u8 {
        match handler {
            H_Z80_AREA => self.z80_area_read(address, ctx),
            H_IO => self.io_read(address, ctx),
            H_VDP => self.vdp_access(ctx, |hw, _| hw.vdp_read_byte(address)),
            _ => {
                log::warn!("m68k: read {address:#08X} through unknown handler {handler:?}");
                0xFF
            }
        }
    }

    fn write8(&mut self, handler: HandlerId, address: u32, value: u8, ctx: &mut M68kContext) {
        match handler {
            H_Z80_AREA => self.z80_area_write(address, value, ctx),
            H_IO => self.io_write(address, value, ctx),
            H_VDP => self.vdp_access(ctx, |hw, now| hw.vdp_write_byte(address, value, now)),
            _ => log::warn!("m68k: write {address:#08X} through unknown handler {handler:?}"),
        }
    }

    fn read16(&mut self, handler: HandlerId, address: u32, ctx: &mut M68kContext) -> u16 {
        match handler {
            H_VDP => self.vdp_access(ctx, |hw, _| hw.vdp_read_word(address)),
            // 8-bit devices: the byte shows up on both halves.
            _ => {
                let value = self.read8(handler, address, ctx);
                u16::from_be_bytes([value, value])
            }
        }
    }

    fn write16(&mut self, handler: HandlerId, address: u32, value: u16, ctx: &mut M68kContext) {
        let [hi, lo] = value.to_be_bytes();
        match handler {
            H_VDP => self.vdp_access(ctx, |hw, now| hw.vdp_write_word(address, value, now)),
            H_Z80_AREA => self.z80_area_write(address, hi, ctx),
            // Registers below A10100 sit on the odd byte.
            H_IO if address & 0xFFFF < 0x100 => self.io_write(address, lo, ctx),
            _ => self.write8(handler, address, hi, ctx),
        }
    }

    fn interrupt_state_changed(&mut self, ctx: &mut M68kContext) {
        self.adjust_int_cycle(ctx);
    }
}

impl M68kBus for MainBus {
    fn interrupt_level(&self) -> u8 {
        self.int_level
    }

    fn interrupt_acknowledge(&mut self, level: u8, ctx: &mut M68kContext) {
        if level == 2 {
            self.hw.io.acknowledge();
            return;
        }
        // The VDP must have raised the interrupt before it can be cleared.
        self.hw.vdp.run_to(ctx.current_cycle + 1);
        self.hw.vdp.acknowledge(level);
    }
}
