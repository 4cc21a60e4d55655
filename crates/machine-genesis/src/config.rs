//! Configuration for the Genesis machine crate.

use emu_core::Cycle;
use jit_core::JitOptions;
use sega_vdp::{LINES_NTSC, LINES_PAL, MCLKS_LINE};

pub const NTSC_MCLK_HZ: u32 = 53_693_175;
pub const PAL_MCLK_HZ: u32 = 53_203_395;

/// Master clocks per 68000 clock.
pub const MCLKS_PER_68K: u32 = 7;
/// Master clocks per Z80 T-state.
pub const MCLKS_PER_Z80: u32 = 15;
pub const MCLKS_PER_YM: u32 = 7;
pub const MCLKS_PER_PSG: u32 = 240;

/// Length of the Z80 /INT pulse that follows the vertical interrupt.
pub const Z80_INT_PULSE: Cycle = 2573;

/// Sample rate of the PSG output buffer.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
}

impl Region {
    #[must_use]
    pub const fn master_clock(self) -> u32 {
        match self {
            Self::Ntsc => NTSC_MCLK_HZ,
            Self::Pal => PAL_MCLK_HZ,
        }
    }

    #[must_use]
    pub const fn is_pal(self) -> bool {
        matches!(self, Self::Pal)
    }

    #[must_use]
    pub const fn lines_per_frame(self) -> u16 {
        match self {
            Self::Ntsc => LINES_NTSC,
            Self::Pal => LINES_PAL,
        }
    }

    /// Master clocks per frame.
    #[must_use]
    pub const fn frame_cycles(self) -> Cycle {
        self.lines_per_frame() as Cycle * MCLKS_LINE
    }

    /// Version register: overseas console, no expansion unit, 50 Hz bit for PAL.
    #[must_use]
    pub const fn version_bits(self) -> u8 {
        match self {
            Self::Ntsc => 0xA0,
            Self::Pal => 0xE0,
        }
    }
}

/// How close to a pending 68K interrupt the scheduler forces extra sync
/// points, in master clocks.
///
/// Stalls from refresh and Z80 bus accesses are only charged when the
/// machine syncs, so syncing just before an interrupt keeps them from
/// delaying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptLatency {
    pub prev1: Cycle,
    pub prev2: Cycle,
}

impl Default for InterruptLatency {
    fn default() -> Self {
        Self {
            prev1: MCLKS_PER_68K * 32,
            prev2: MCLKS_PER_68K * 16,
        }
    }
}

/// Default sync quantum: one scanline.
pub const DEFAULT_SYNC_INTERVAL: Cycle = MCLKS_LINE;

#[derive(Debug, Clone)]
pub struct GenesisConfig {
    pub region: Region,
    /// Raw big-endian cartridge image, mapped flat from address 0.
    pub rom: Vec<u8>,
    /// Longest the 68K runs before the rest of the machine is brought up to date.
    pub sync_interval: Cycle,
    pub int_latency: InterruptLatency,
    /// Translation cache budget per CPU, in host instruction slots.
    pub code_budget_slots: usize,
    /// With the Z80 disabled its RAM is always open to the 68K.
    pub z80_enabled: bool,
}

impl GenesisConfig {
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            region: Region::Ntsc,
            rom,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            int_latency: InterruptLatency::default(),
            code_budget_slots: JitOptions::default().code_budget,
            z80_enabled: true,
        }
    }

    #[must_use]
    pub const fn jit_options(&self) -> JitOptions {
        JitOptions {
            code_budget: self.code_budget_slots,
        }
    }
}
