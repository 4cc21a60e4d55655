//! Sega Genesis / Mega Drive.
//!
//! A [`Genesis`] is one emulation session: the 68000 and Z80 run through
//! their translation caches, and the VDP, PSG, YM2612 and I/O chip are
//! clocked from the same master clock by the scheduler. Everything the
//! session needs is owned by it, so independent sessions can coexist.
//!
//! ```no_run
//! use machine_genesis::{Genesis, GenesisConfig};
//!
//! let rom = std::fs::read("game.bin")?;
//! let mut genesis = Genesis::new(GenesisConfig::new(rom))?;
//! for _ in 0..60 {
//!     genesis.run_frame()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bus;
pub mod config;
pub mod error;
pub mod io;
pub mod memory;
mod scheduler;
pub mod snapshot;
mod z80_bus;

use emu_core::{Cycle, Observable, Value};
use jit_core::DebugHook;
use motorola_68000::M68k;
use sega_vdp::Vdp;
use ti_sn76489::Sn76489;
use yamaha_ym2612::Ym2612;
use zilog_z80::Z80;

use crate::bus::{Hardware, MainBus};
use crate::memory::Memory;

pub use crate::config::{
    AUDIO_SAMPLE_RATE, GenesisConfig, InterruptLatency, MCLKS_PER_68K, MCLKS_PER_PSG,
    MCLKS_PER_YM, MCLKS_PER_Z80, Region,
};
pub use crate::error::MachineError;
pub use crate::io::IoPorts;
pub use crate::snapshot::MachineSnapshot;

/// One emulated console.
pub struct Genesis {
    m68k: M68k,
    bus: MainBus,
    region: Region,
}

impl Genesis {
    /// Build a session around `config.rom` and reset it.
    pub fn new(mut config: GenesisConfig) -> Result<Self, MachineError> {
        let mem = Memory::new(std::mem::take(&mut config.rom))?;
        let options = config.jit_options();
        let m68k = M68k::new(mem.m68k_memmap(), options, MCLKS_PER_68K);
        let z80 = Z80::new(Memory::z80_memmap(), options, MCLKS_PER_Z80, 1);
        let region = config.region;
        let hw = Hardware {
            mem,
            vdp: Vdp::new(region.is_pal()),
            psg: Sn76489::new(region.master_clock(), MCLKS_PER_PSG, AUDIO_SAMPLE_RATE),
            ym: Ym2612::new(MCLKS_PER_YM),
            io: IoPorts::new(region),
            bank: 0,
        };
        let bus = MainBus::new(hw, z80, &config);
        let mut genesis = Self { m68k, bus, region };
        genesis.reset();
        log::debug!(
            "genesis: {:?}, {} KiB cartridge",
            region,
            genesis.bus.hw.mem.rom.len() / 1024
        );
        Ok(genesis)
    }

    /// Press the reset button. RAM and translations survive.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.m68k.reset(&mut self.bus);
        self.bus.adjust_int_cycle(&mut self.m68k.ctx);
    }

    /// Run until the VDP completes the current frame.
    pub fn run_frame(&mut self) -> Result<(), MachineError> {
        self.run_until(emu_core::CYCLE_NEVER, true)
    }

    /// Run for at least `cycles` master clocks. The 68K finishes the
    /// instruction it is in, so it may stop a little past the request.
    pub fn run_cycles(&mut self, cycles: Cycle) -> Result<(), MachineError> {
        let stop = self.m68k.current_cycle().saturating_add(cycles);
        self.run_until(stop, false)
    }

    #[must_use]
    pub const fn region(&self) -> Region {
        self.region
    }

    #[must_use]
    pub const fn m68k(&self) -> &M68k {
        &self.m68k
    }

    #[must_use]
    pub fn z80(&self) -> &Z80 {
        &self.bus.z80
    }

    #[must_use]
    pub fn vdp(&self) -> &Vdp {
        &self.bus.hw.vdp
    }

    #[must_use]
    pub fn psg(&self) -> &Sn76489 {
        &self.bus.hw.psg
    }

    #[must_use]
    pub fn ym(&self) -> &Ym2612 {
        &self.bus.hw.ym
    }

    #[must_use]
    pub fn io(&self) -> &IoPorts {
        &self.bus.hw.io
    }

    #[must_use]
    pub fn work_ram(&self) -> &[u8] {
        &self.bus.hw.mem.work_ram
    }

    #[must_use]
    pub fn z80_ram(&self) -> &[u8] {
        &self.bus.hw.mem.z80_ram
    }

    /// Current Z80 bank register (68K address bits 15-23 of the window).
    #[must_use]
    pub fn z80_bank(&self) -> u16 {
        self.bus.hw.bank
    }

    /// The 68K currently owns the Z80 bus.
    #[must_use]
    pub fn z80_bus_granted(&self) -> bool {
        self.bus.z80_granted()
    }

    /// Drain PSG samples produced since the last call.
    pub fn take_audio(&mut self) -> Vec<f32> {
        self.bus.hw.psg.take_buffer()
    }

    /// A controller on `port` (0-2) drives `lines` from now on.
    pub fn drive_port(&mut self, port: usize, lines: u8) {
        let now = self.m68k.current_cycle();
        self.bus.hw.io.drive(port, lines, now);
        self.bus.adjust_int_cycle(&mut self.m68k.ctx);
    }

    /// Write into 68K work RAM from outside the machine, as a debugger would.
    pub fn poke_work_ram(&mut self, offset: usize, bytes: &[u8]) {
        let ram = &mut self.bus.hw.mem.work_ram;
        let mask = ram.len() - 1;
        for (i, &byte) in bytes.iter().enumerate() {
            let index = (offset + i) & mask;
            ram[index] = byte;
            self.m68k.invalidate_write(0xFF_0000 | index as u32);
        }
    }

    /// Write into Z80 RAM from outside the machine.
    pub fn poke_z80_ram(&mut self, offset: usize, bytes: &[u8]) {
        let ram = &mut self.bus.hw.mem.z80_ram;
        let mask = ram.len() - 1;
        for (i, &byte) in bytes.iter().enumerate() {
            let index = (offset + i) & mask;
            ram[index] = byte;
            self.bus.z80.invalidate_write(index as u16);
        }
    }

    /// Make the next run return at its first instruction boundary, with
    /// every component synced. A debugger hook stops the run it was called
    /// from with `ctx.request_stop()`.
    pub fn request_stop(&mut self) {
        self.m68k.ctx.request_stop();
    }

    /// Call the 68K debugger at the next instruction boundary.
    pub fn request_debugger(&mut self) {
        self.m68k.ctx.request_debugger();
    }

    /// Call the Z80 debugger the next time the Z80 runs.
    pub fn request_z80_debugger(&mut self) {
        self.bus.z80.ctx.request_debugger();
    }

    pub fn set_m68k_debugger(&mut self, hook: Box<DebugHook<motorola_68000::Registers>>) {
        self.m68k.set_debugger(hook);
    }

    pub fn set_z80_debugger(&mut self, hook: Box<DebugHook<zilog_z80::Registers>>) {
        self.bus.z80.set_debugger(hook);
    }

    pub fn insert_m68k_breakpoint(&mut self, address: u32) {
        self.m68k.insert_breakpoint(address);
    }

    pub fn remove_m68k_breakpoint(&mut self, address: u32) {
        self.m68k.remove_breakpoint(&self.bus, address);
    }

    pub fn insert_z80_breakpoint(&mut self, address: u16) {
        self.bus.z80.insert_breakpoint(address);
    }

    pub fn remove_z80_breakpoint(&mut self, address: u16) {
        let view = z80_bus::Z80Bus::new(&mut self.bus.hw, &mut self.bus.dirty, 0);
        self.bus.z80.remove_breakpoint(&view, address);
    }
}

const QUERY_PATHS: &[&str] = &[
    "m68k.<reg>",
    "z80.<reg>",
    "vdp.<field>",
    "psg.<field>",
    "ym.<field>",
    "io.<field>",
    "z80_bank",
    "z80_busreq",
    "z80_reset",
    "frame",
];

impl Observable for Genesis {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("m68k.") {
            return self.m68k.query(rest);
        }
        if let Some(rest) = path.strip_prefix("z80.") {
            return self.bus.z80.query(rest);
        }
        if let Some(rest) = path.strip_prefix("vdp.") {
            return self.bus.hw.vdp.query(rest);
        }
        if let Some(rest) = path.strip_prefix("psg.") {
            return self.bus.hw.psg.query(rest);
        }
        if let Some(rest) = path.strip_prefix("ym.") {
            return self.bus.hw.ym.query(rest);
        }
        if let Some(rest) = path.strip_prefix("io.") {
            return self.bus.hw.io.query(rest);
        }
        match path {
            "z80_bank" => Some(self.bus.hw.bank.into()),
            "z80_busreq" => Some(self.bus.busreq.into()),
            "z80_reset" => Some(self.bus.z80_reset.into()),
            "frame" => Some(self.bus.hw.vdp.frame().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
