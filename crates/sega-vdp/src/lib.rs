//! Sega Mega Drive VDP (315-5313): beam timing, ports, FIFO and DMA.
//!
//! No pixels are produced. The model exists so the CPUs see the right
//! interrupt timing, status bits, HV counter values and port stalls.
//!
//! # Timing
//!
//! The VDP advances one access slot at a time: 16 master clocks in H40,
//! 20 in H32, with the last slot of a line cut short at 3420 clocks.
//! Horizontal and vertical modes are latched at the start of each frame.
//!
//! - V-int pending: first blanking line, slot 47 (H40) or 60 (H32)
//! - H-int counter: reloaded on lines 0, 1 and during blanking, otherwise
//!   decremented at each line start; reaching zero sets H-int pending
//!
//! # Ports
//!
//! Data port writes go through a four-entry FIFO drained in external
//! slots. A write to a full FIFO runs the VDP forward until an entry
//! drains; callers compare [`Vdp::current_cycle`] before and after to
//! charge the stall.

mod dma;
mod timing;

use std::collections::VecDeque;

use emu_core::{CYCLE_NEVER, Cycle, Observable, Peripheral, Value};
use serde::{Deserialize, Serialize};

use dma::{Dma, DmaStep};
pub use dma::{DmaMode, DmaSource};
pub use timing::{
    ACTIVE_LINES_V28, ACTIVE_LINES_V30, LINES_NTSC, LINES_PAL, MCLKS_LINE, MCLKS_SLOT_H32,
    MCLKS_SLOT_H40, h_counter, v_counter,
};

pub const REG_MODE_1: usize = 0;
pub const REG_MODE_2: usize = 1;
pub const REG_HINT: usize = 10;
pub const REG_MODE_3: usize = 11;
pub const REG_MODE_4: usize = 12;
pub const REG_AUTOINC: usize = 15;
pub const REG_DMA_LEN_L: usize = 19;
pub const REG_DMA_LEN_H: usize = 20;
pub const REG_DMA_SRC_L: usize = 21;
pub const REG_DMA_SRC_M: usize = 22;
pub const REG_DMA_SRC_H: usize = 23;
const REG_COUNT: usize = 24;

/// Mode 1.
pub const HINT_ENABLE: u8 = 0x10;
/// Mode 2.
pub const DISPLAY_ENABLE: u8 = 0x40;
pub const VINT_ENABLE: u8 = 0x20;
pub const DMA_ENABLE: u8 = 0x10;
pub const V30: u8 = 0x08;
/// Mode 3.
pub const EXT_INT_ENABLE: u8 = 0x08;
/// Mode 4.
pub const H40: u8 = 0x01;

const CD_VRAM_READ: u8 = 0x0;
const CD_VRAM_WRITE: u8 = 0x1;
const CD_CRAM_WRITE: u8 = 0x3;
const CD_VSRAM_READ: u8 = 0x4;
const CD_VSRAM_WRITE: u8 = 0x5;
const CD_CRAM_READ: u8 = 0x8;
const CD_DMA_START: u8 = 0x20;

const FIFO_SIZE: usize = 4;
const VRAM_SIZE: usize = 0x1_0000;
const CRAM_SIZE: usize = 64;
const VSRAM_SIZE: usize = 40;

/// Status register bits.
pub const STATUS_FIFO_EMPTY: u16 = 0x200;
pub const STATUS_FIFO_FULL: u16 = 0x100;
pub const STATUS_VINT_PENDING: u16 = 0x80;
pub const STATUS_VBLANK: u16 = 0x8;
pub const STATUS_HBLANK: u16 = 0x4;
pub const STATUS_DMA: u16 = 0x2;
pub const STATUS_PAL: u16 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FifoEntry {
    cycle: Cycle,
    address: u16,
    value: u16,
    cd: u8,
    /// High byte of a VRAM write already committed.
    partial: bool,
}

/// Mega Drive VDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vdp {
    regs: [u8; REG_COUNT],
    vram: Vec<u8>,
    cram: Vec<u16>,
    vsram: Vec<u16>,
    cycles: Cycle,
    /// Line within the frame and master clock within the line.
    line: u16,
    linecyc: u32,
    lines_per_frame: u16,
    pal: bool,
    /// Modes latched at line 0.
    h40: bool,
    v30: bool,
    address: u16,
    cd: u8,
    /// First half of a control port command has been written.
    pending: bool,
    fifo: VecDeque<FifoEntry>,
    dma: Option<Dma>,
    hint_counter: u8,
    vint_pending: bool,
    hint_pending: bool,
    /// An external slot went unused since the last read request.
    unused_slot: bool,
    frame: u32,
    frame_done: bool,
}

/// Raw VDP state for savestates.
pub type VdpSnapshot = Vdp;

impl Vdp {
    /// A powered-on VDP; `pal` selects 313 lines per frame instead of 262.
    #[must_use]
    pub fn new(pal: bool) -> Self {
        Self {
            regs: [0; REG_COUNT],
            vram: vec![0; VRAM_SIZE],
            cram: vec![0; CRAM_SIZE],
            vsram: vec![0; VSRAM_SIZE],
            cycles: 0,
            line: 0,
            linecyc: 0,
            lines_per_frame: if pal { LINES_PAL } else { LINES_NTSC },
            pal,
            h40: false,
            v30: false,
            address: 0,
            cd: 0,
            pending: false,
            fifo: VecDeque::with_capacity(FIFO_SIZE),
            dma: None,
            hint_counter: 0,
            vint_pending: false,
            hint_pending: false,
            unused_slot: false,
            frame: 0,
            frame_done: false,
        }
    }

    #[must_use]
    pub const fn register(&self, reg: usize) -> u8 {
        self.regs[reg]
    }

    #[must_use]
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    #[must_use]
    pub fn cram(&self) -> &[u16] {
        &self.cram
    }

    #[must_use]
    pub fn vsram(&self) -> &[u16] {
        &self.vsram
    }

    #[must_use]
    pub const fn line(&self) -> u16 {
        self.line
    }

    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }

    #[must_use]
    pub const fn lines_per_frame(&self) -> u16 {
        self.lines_per_frame
    }

    #[must_use]
    pub const fn is_h40(&self) -> bool {
        self.h40
    }

    #[must_use]
    pub const fn vint_pending(&self) -> bool {
        self.vint_pending
    }

    #[must_use]
    pub const fn hint_pending(&self) -> bool {
        self.hint_pending
    }

    /// External interrupts (level 2) are enabled in mode register 3.
    #[must_use]
    pub const fn ext_int_enabled(&self) -> bool {
        self.regs[REG_MODE_3] & EXT_INT_ENABLE != 0
    }

    #[must_use]
    pub const fn dma_busy(&self) -> bool {
        self.dma.is_some()
    }

    /// A 68K-to-VDP transfer is running and needs [`run_dma_done`](Self::run_dma_done).
    #[must_use]
    pub fn transfer_active(&self) -> bool {
        self.dma.is_some_and(|dma| dma.mode == DmaMode::Transfer)
    }

    /// True once per completed frame.
    pub fn take_frame_done(&mut self) -> bool {
        std::mem::take(&mut self.frame_done)
    }

    const fn active_lines(&self) -> u16 {
        if self.v30 { ACTIVE_LINES_V30 } else { ACTIVE_LINES_V28 }
    }

    const fn frame_len(&self) -> u32 {
        self.lines_per_frame as u32 * MCLKS_LINE
    }

    /// Master clocks since line 0 started.
    const fn frame_pos(&self) -> u32 {
        self.line as u32 * MCLKS_LINE + self.linecyc
    }

    /// Cycle at which the current frame ends.
    #[must_use]
    pub const fn frame_end(&self) -> Cycle {
        self.cycles + (self.frame_len() - self.frame_pos())
    }

    fn latch_mode(&mut self) {
        self.h40 = self.regs[REG_MODE_4] & H40 != 0;
        self.v30 = self.regs[REG_MODE_2] & V30 != 0;
    }

    /// Advance one slot, using `source` for a 68K transfer.
    fn step(&mut self, source: Option<&mut dyn DmaSource>) {
        if self.line == 0 && self.linecyc == 0 {
            self.latch_mode();
        }
        let active_lines = self.active_lines();
        let len = timing::slot_len(self.h40).min(MCLKS_LINE - self.linecyc);
        if self.linecyc == 0 {
            if self.line <= 1 || self.line >= active_lines {
                self.hint_counter = self.regs[REG_HINT];
            } else if self.hint_counter > 0 {
                self.hint_counter -= 1;
            } else {
                log::trace!("vdp: H-int pending on line {}", self.line);
                self.hint_pending = true;
                self.hint_counter = self.regs[REG_HINT];
            }
        }
        if self.line == active_lines {
            let at = timing::vint_linecyc(self.h40);
            if (self.linecyc..self.linecyc + len).contains(&at) {
                log::trace!("vdp: V-int pending, frame {}", self.frame);
                self.vint_pending = true;
            }
        }
        let active = self.line < active_lines && self.regs[REG_MODE_2] & DISPLAY_ENABLE != 0;
        if timing::is_access_slot(self.h40, active, self.linecyc) {
            self.external_slot(source);
        }
        self.cycles += len;
        self.linecyc += len;
        if self.linecyc >= MCLKS_LINE {
            self.linecyc = 0;
            self.line += 1;
            if self.line >= self.lines_per_frame {
                self.line = 0;
                self.frame += 1;
                self.frame_done = true;
            }
        }
    }

    fn external_slot(&mut self, source: Option<&mut dyn DmaSource>) {
        if let Some(mut dma) = self.dma.take() {
            match self.dma_slot(&mut dma, source) {
                DmaStep::Busy | DmaStep::Starved => self.dma = Some(dma),
                DmaStep::Done => {}
            }
            return;
        }
        let Some(entry) = self.fifo.front_mut() else {
            self.unused_slot = true;
            return;
        };
        if entry.cycle > self.cycles {
            self.unused_slot = true;
            return;
        }
        let entry = *entry;
        if entry.cd & CD_DMA_START != 0 && self.regs[REG_MODE_2] & DMA_ENABLE != 0 {
            // Fill: the data write supplies the value and undoes the auto-increment.
            log::debug!("vdp: DMA fill {:#06X} at {:#06X}", entry.value, entry.address);
            self.dma = Some(Dma {
                mode: DmaMode::Fill,
                cd: entry.cd,
                value: entry.value,
                half: false,
            });
            self.address = entry.address;
        } else if entry.cd & 0xF == CD_VRAM_WRITE {
            if entry.partial {
                self.vram[usize::from(entry.address ^ 1)] = entry.value as u8;
            } else {
                self.vram[usize::from(entry.address)] = (entry.value >> 8) as u8;
                if let Some(front) = self.fifo.front_mut() {
                    front.partial = true;
                }
                return;
            }
        } else {
            self.write_word(entry.cd & 0xF, entry.address, entry.value);
        }
        self.fifo.pop_front();
    }

    /// Word write to CRAM or VSRAM.
    fn write_word(&mut self, cd: u8, address: u16, value: u16) {
        let index = usize::from(address / 2);
        match cd {
            CD_CRAM_WRITE => self.cram[index & (CRAM_SIZE - 1)] = value,
            CD_VSRAM_WRITE => {
                if let Some(slot) = self.vsram.get_mut(index & 63) {
                    *slot = value;
                }
            }
            CD_VRAM_WRITE => {
                let [hi, lo] = value.to_be_bytes();
                self.vram[usize::from(address)] = hi;
                self.vram[usize::from(address ^ 1)] = lo;
            }
            _ => log::warn!("vdp: write with command code {cd:#04X} ignored"),
        }
    }

    /// Run until `target` or until a 68K transfer finishes, whichever is
    /// first, reading words from `source`.
    pub fn run_dma_done(&mut self, source: &mut dyn DmaSource, target: Cycle) {
        while self.cycles < target && self.transfer_active() {
            self.step(Some(&mut *source));
        }
    }

    /// Control port write. Returns true when a 68K transfer started; the
    /// caller must then drive it with [`run_dma_done`](Self::run_dma_done).
    pub fn write_control(&mut self, value: u16) -> bool {
        if self.dma.is_some() {
            log::warn!("vdp: control write {value:#06X} during DMA ignored");
            return false;
        }
        if self.pending {
            self.pending = false;
            self.address = (self.address & 0x3FFF) | (value << 14);
            self.cd = (self.cd & 0x3) | ((value >> 2) & 0x3C) as u8;
            if self.cd & CD_DMA_START != 0 && self.regs[REG_MODE_2] & DMA_ENABLE != 0 {
                let mode = DmaMode::from_source_high(self.regs[REG_DMA_SRC_H]);
                match mode {
                    // Waits for the data port write that carries the value.
                    DmaMode::Fill => {}
                    DmaMode::Transfer | DmaMode::Copy => {
                        log::debug!(
                            "vdp: DMA {mode:?} to {:#06X}, length {:#X}",
                            self.address,
                            self.dma_length()
                        );
                        self.dma = Some(Dma {
                            mode,
                            cd: self.cd,
                            value: 0,
                            half: false,
                        });
                        return mode == DmaMode::Transfer;
                    }
                }
            }
        } else if value & 0xC000 == 0x8000 {
            let reg = usize::from((value >> 8) & 0x1F);
            if reg < REG_COUNT {
                self.regs[reg] = value as u8;
            }
        } else {
            self.pending = true;
            self.address = (self.address & 0xC000) | (value & 0x3FFF);
            self.cd = (self.cd & 0x3C) | (value >> 14) as u8;
        }
        false
    }

    /// Data port write. Ignored while the command code selects a read.
    pub fn write_data(&mut self, value: u16) {
        if self.dma.is_some() {
            log::warn!("vdp: data write {value:#06X} during DMA ignored");
            return;
        }
        if self.cd & 1 == 0 {
            return;
        }
        self.pending = false;
        while self.fifo.len() >= FIFO_SIZE {
            self.step(None);
        }
        self.fifo.push_back(FifoEntry {
            cycle: self.cycles,
            address: self.address,
            value,
            cd: self.cd,
            partial: false,
        });
        self.address = self.address.wrapping_add(u16::from(self.regs[REG_AUTOINC]));
    }

    /// Run until an external slot goes unused.
    fn wait_unused_slot(&mut self) {
        self.unused_slot = false;
        while !self.unused_slot {
            self.step(None);
        }
    }

    /// Data port read. Waits for a free slot, so the clock may advance.
    pub fn read_data(&mut self) -> u16 {
        self.pending = false;
        if self.cd & 1 != 0 {
            return 0;
        }
        self.wait_unused_slot();
        let index = usize::from(self.address / 2);
        let value = match self.cd & 0xF {
            CD_VRAM_READ => {
                let hi = self.vram[usize::from(self.address)];
                self.wait_unused_slot();
                u16::from_be_bytes([hi, self.vram[usize::from(self.address ^ 1)]])
            }
            CD_CRAM_READ => self.cram[index & (CRAM_SIZE - 1)],
            CD_VSRAM_READ => self.vsram.get(index & 63).copied().unwrap_or(0),
            cd => {
                log::warn!("vdp: read with command code {cd:#04X}");
                0
            }
        };
        self.address = self.address.wrapping_add(u16::from(self.regs[REG_AUTOINC]));
        value
    }

    /// Status register without the read side effect.
    #[must_use]
    pub fn status(&self) -> u16 {
        let mut value = 0x3400;
        if self.fifo.is_empty() {
            value |= STATUS_FIFO_EMPTY;
        }
        if self.fifo.len() >= FIFO_SIZE {
            value |= STATUS_FIFO_FULL;
        }
        if self.vint_pending {
            value |= STATUS_VINT_PENDING;
        }
        if self.line >= self.active_lines() {
            value |= STATUS_VBLANK;
        }
        if timing::in_hblank(self.h40, self.linecyc) {
            value |= STATUS_HBLANK;
        }
        if self.dma.is_some() {
            value |= STATUS_DMA;
        }
        if self.pal {
            value |= STATUS_PAL;
        }
        value
    }

    /// Control port read: status, and the second command word is no
    /// longer expected.
    pub fn read_control(&mut self) -> u16 {
        self.pending = false;
        self.status()
    }

    #[must_use]
    pub fn hv_counter(&self) -> u16 {
        u16::from(v_counter(self.line)) << 8 | u16::from(h_counter(self.h40, self.linecyc))
    }

    /// Cycle of the next V-int in this frame, or `CYCLE_NEVER`.
    #[must_use]
    pub fn next_vint(&self) -> Cycle {
        if self.regs[REG_MODE_2] & VINT_ENABLE == 0 {
            return CYCLE_NEVER;
        }
        if self.vint_pending {
            return self.cycles;
        }
        self.next_vint_z80()
    }

    /// The Z80 sees the vertical interrupt whether or not the 68K has it enabled.
    #[must_use]
    pub fn next_vint_z80(&self) -> Cycle {
        let at = u32::from(self.active_lines()) * MCLKS_LINE + timing::vint_linecyc(self.h40);
        let pos = self.frame_pos();
        if pos > at { CYCLE_NEVER } else { self.cycles + (at - pos) }
    }

    /// Cycle of the next H-int in this frame, or `CYCLE_NEVER`.
    #[must_use]
    pub fn next_hint(&self) -> Cycle {
        if self.regs[REG_MODE_1] & HINT_ENABLE == 0 {
            return CYCLE_NEVER;
        }
        if self.hint_pending {
            return self.cycles;
        }
        let active_lines = self.active_lines();
        if self.line >= active_lines {
            return CYCLE_NEVER;
        }
        // The counter reaches zero at the start of this line.
        let mut fire = u32::from(self.line) + u32::from(self.hint_counter) + 1;
        if self.line == 0 {
            fire += 1;
        }
        if fire >= u32::from(active_lines) {
            return CYCLE_NEVER;
        }
        self.cycles + (fire * MCLKS_LINE - self.frame_pos())
    }

    /// Interrupt acknowledge from the 68K.
    pub fn acknowledge(&mut self, level: u8) {
        match level {
            6 => self.vint_pending = false,
            4 => self.hint_pending = false,
            _ => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> VdpSnapshot {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: &VdpSnapshot) {
        self.clone_from(snapshot);
    }
}

impl Peripheral for Vdp {
    fn run_to(&mut self, cycle: Cycle) {
        while self.cycles < cycle {
            self.step(None);
        }
    }

    fn current_cycle(&self) -> Cycle {
        self.cycles
    }

    fn next_event_cycle(&self) -> Cycle {
        emu_core::earliest(self.next_vint(), self.next_hint())
    }

    fn adjust_cycles(&mut self, deduction: Cycle) {
        self.cycles = self.cycles.saturating_sub(deduction);
        for entry in &mut self.fifo {
            entry.cycle = entry.cycle.saturating_sub(deduction);
        }
    }
}

const QUERY_PATHS: &[&str] = &[
    "cycle", "line", "frame", "status", "hv", "h40", "address", "cd", "fifo", "dma",
];

impl Observable for Vdp {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(reg) = path.strip_prefix("reg") {
            let reg = reg.parse::<usize>().ok().filter(|&r| r < REG_COUNT)?;
            return Some(self.regs[reg].into());
        }
        Some(match path {
            "cycle" => self.cycles.into(),
            "line" => self.line.into(),
            "frame" => self.frame.into(),
            "status" => self.status().into(),
            "hv" => self.hv_counter().into(),
            "h40" => self.h40.into(),
            "address" => self.address.into(),
            "cd" => self.cd.into(),
            "fifo" => (self.fifo.len() as u8).into(),
            "dma" => self.dma.is_some().into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
