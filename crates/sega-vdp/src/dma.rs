//! DMA units run in external access slots.

use serde::{Deserialize, Serialize};

use crate::{
    CD_CRAM_WRITE, CD_VRAM_WRITE, CD_VSRAM_WRITE, REG_AUTOINC, REG_DMA_LEN_H, REG_DMA_LEN_L,
    REG_DMA_SRC_H, REG_DMA_SRC_L, REG_DMA_SRC_M, Vdp,
};

/// Where a 68K-to-VDP transfer reads its words.
pub trait DmaSource {
    /// Word at 68K byte `address`.
    fn read_dma_word(&mut self, address: u32) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmaMode {
    /// 68K bus to VDP memory; the 68K is held off the bus until done.
    Transfer,
    Fill,
    Copy,
}

impl DmaMode {
    #[must_use]
    pub const fn from_source_high(reg: u8) -> Self {
        match reg & 0xC0 {
            0x80 => Self::Fill,
            0xC0 => Self::Copy,
            _ => Self::Transfer,
        }
    }
}

/// Outcome of one slot of DMA work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DmaStep {
    Busy,
    /// A transfer needs a source it was not given.
    Starved,
    Done,
}

/// An operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Dma {
    pub mode: DmaMode,
    /// Command code latched at start.
    pub cd: u8,
    pub value: u16,
    /// First half of a two-slot unit (VRAM byte pair, copy read) is done.
    pub half: bool,
}

impl Vdp {
    pub(crate) fn dma_length(&self) -> u32 {
        let len = u32::from(self.regs[REG_DMA_LEN_H]) << 8 | u32::from(self.regs[REG_DMA_LEN_L]);
        if len == 0 { 0x1_0000 } else { len }
    }

    /// 68K byte address of the next transfer word.
    pub(crate) fn dma_source_address(&self) -> u32 {
        (u32::from(self.regs[REG_DMA_SRC_H] & 0x7F) << 16
            | u32::from(self.regs[REG_DMA_SRC_M]) << 8
            | u32::from(self.regs[REG_DMA_SRC_L]))
            << 1
    }

    fn copy_source(&self) -> u16 {
        u16::from(self.regs[REG_DMA_SRC_M]) << 8 | u16::from(self.regs[REG_DMA_SRC_L])
    }

    /// One external slot of DMA work.
    pub(crate) fn dma_slot(&mut self, dma: &mut Dma, source: Option<&mut dyn DmaSource>) -> DmaStep {
        match dma.mode {
            DmaMode::Transfer => match dma.cd & 0xF {
                CD_VRAM_WRITE if dma.half => {
                    self.vram[usize::from(self.address ^ 1)] = dma.value as u8;
                    dma.half = false;
                }
                cd => {
                    let Some(source) = source else {
                        return DmaStep::Starved;
                    };
                    let value = source.read_dma_word(self.dma_source_address());
                    match cd {
                        CD_VRAM_WRITE => {
                            self.vram[usize::from(self.address)] = (value >> 8) as u8;
                            dma.value = value;
                            dma.half = true;
                        }
                        _ => self.write_word(cd, self.address, value),
                    }
                }
            },
            DmaMode::Fill => match dma.cd & 0xF {
                CD_VRAM_WRITE => {
                    self.vram[usize::from(self.address)] = dma.value as u8;
                    dma.value = dma.value.rotate_left(8);
                }
                cd => self.write_word(cd, self.address, dma.value),
            },
            DmaMode::Copy => {
                if dma.half {
                    match dma.cd & 0xF {
                        CD_VRAM_WRITE => self.vram[usize::from(self.address)] = dma.value as u8,
                        cd => self.write_word(cd, self.address, dma.value),
                    }
                    dma.half = false;
                } else {
                    let src = self.copy_source();
                    dma.value = match dma.cd & 0xF {
                        CD_CRAM_WRITE => self.cram[usize::from(src) & 0x3F],
                        CD_VSRAM_WRITE => self.vsram.get(usize::from(src & 0x3F)).copied().unwrap_or(0),
                        _ => u16::from(self.vram[usize::from(src)]),
                    };
                    dma.half = true;
                }
            }
        }
        if !dma.half && self.advance_dma() {
            return DmaStep::Done;
        }
        DmaStep::Busy
    }

    /// Step address, source and length after a completed unit. True when
    /// the length ran out.
    fn advance_dma(&mut self) -> bool {
        self.address = self.address.wrapping_add(u16::from(self.regs[REG_AUTOINC]));
        self.regs[REG_DMA_SRC_L] = self.regs[REG_DMA_SRC_L].wrapping_add(1);
        if self.regs[REG_DMA_SRC_L] == 0 {
            self.regs[REG_DMA_SRC_M] = self.regs[REG_DMA_SRC_M].wrapping_add(1);
        }
        let remaining = self.dma_length() - 1;
        self.regs[REG_DMA_LEN_H] = (remaining >> 8) as u8;
        self.regs[REG_DMA_LEN_L] = remaining as u8;
        if remaining == 0 {
            log::debug!("vdp: DMA done at cycle {}", self.cycles);
        }
        remaining == 0
    }
}
