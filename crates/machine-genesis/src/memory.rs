//! Cartridge, work RAM and Z80 RAM, and the two CPUs' memory maps.
//!
//! # 68000 map
//!
//! | Range             | Backing                       |
//! |-------------------|-------------------------------|
//! | 000000-3FFFFF     | Cartridge ROM, mirrored        |
//! | A00000-A0FFFF     | Z80 space (bus grant required) |
//! | A10000-A1FFFF     | I/O, BUSREQ, RESET             |
//! | C00000-DFFFFF     | VDP ports and PSG              |
//! | E00000-FFFFFF     | 64K work RAM, mirrored         |
//!
//! # Z80 map
//!
//! | Range     | Backing                                   |
//! |-----------|-------------------------------------------|
//! | 0000-3FFF | 8K RAM, mirrored                          |
//! | 4000-5FFF | YM2612                                    |
//! | 6000-7EFF | Bank register                             |
//! | 7F00-7FFF | VDP ports and PSG                         |
//! | 8000-FFFF | 32K window into 68K space (bank register) |

use jit_core::{Backing, BankView, BufferId, HandlerId, MemFlags, MemMap, MemMapChunk};
use sega_vdp::DmaSource;

use crate::error::MachineError;

pub const ROM: BufferId = BufferId(0);
pub const WORK_RAM: BufferId = BufferId(1);
pub const Z80_RAM: BufferId = BufferId(2);

pub const ROM_WINDOW: usize = 0x40_0000;
pub const WORK_RAM_SIZE: usize = 0x1_0000;
pub const Z80_RAM_SIZE: usize = 0x2000;
const MIN_ROM_SIZE: usize = 0x8000;

/// 68K handlers.
pub(crate) const H_Z80_AREA: HandlerId = HandlerId(0);
pub(crate) const H_IO: HandlerId = HandlerId(1);
pub(crate) const H_VDP: HandlerId = HandlerId(2);

/// Z80 handlers.
pub(crate) const H_YM: HandlerId = HandlerId(0);
pub(crate) const H_BANK_REG: HandlerId = HandlerId(1);
pub(crate) const H_Z80_VDP: HandlerId = HandlerId(2);
pub(crate) const H_BANK_WINDOW: HandlerId = HandlerId(3);

/// Chunk indices used for range invalidation.
pub const WORK_RAM_CHUNK: u16 = 4;
pub const Z80_RAM_CHUNK: u16 = 0;

/// Bank slot of the Z80's 8000-FFFF window.
pub const BANK_SLOT: usize = 0;

/// Start of 68K work RAM as seen through the Z80 bank window.
const WORK_RAM_BASE: u32 = 0xE0_0000;

#[derive(Debug, Clone)]
pub struct Memory {
    pub rom: Vec<u8>,
    pub work_ram: Vec<u8>,
    pub z80_ram: Vec<u8>,
    rom_mask: u32,
}

impl Memory {
    /// Pad `rom` to a power of two so the cartridge window mirrors it.
    pub fn new(mut rom: Vec<u8>) -> Result<Self, MachineError> {
        if rom.is_empty() {
            return Err(MachineError::EmptyRom);
        }
        if rom.len() > ROM_WINDOW {
            return Err(MachineError::RomTooLarge { len: rom.len() });
        }
        let size = rom.len().next_power_of_two().max(MIN_ROM_SIZE);
        rom.resize(size, 0xFF);
        Ok(Self {
            rom,
            work_ram: vec![0; WORK_RAM_SIZE],
            z80_ram: vec![0; Z80_RAM_SIZE],
            rom_mask: (size - 1) as u32,
        })
    }

    #[must_use]
    pub fn buffer(&self, id: BufferId) -> &[u8] {
        match id {
            ROM => &self.rom,
            WORK_RAM => &self.work_ram,
            Z80_RAM => &self.z80_ram,
            _ => &[],
        }
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut [u8] {
        match id {
            ROM => &mut self.rom,
            WORK_RAM => &mut self.work_ram,
            Z80_RAM => &mut self.z80_ram,
            _ => &mut [],
        }
    }

    #[must_use]
    pub fn m68k_memmap(&self) -> MemMap {
        MemMap::new(
            vec![
                MemMapChunk {
                    start: 0,
                    end: ROM_WINDOW as u32,
                    mask: self.rom_mask,
                    flags: MemFlags::ROM,
                    backing: Backing::Flat {
                        buffer: ROM,
                        offset: 0,
                    },
                },
                MemMapChunk {
                    start: 0xA0_0000,
                    end: 0xA1_0000,
                    mask: 0xFFFF,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_Z80_AREA),
                },
                MemMapChunk {
                    start: 0xA1_0000,
                    end: 0xA2_0000,
                    mask: 0xFFFF,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_IO),
                },
                MemMapChunk {
                    start: 0xC0_0000,
                    end: 0xE0_0000,
                    mask: 0x1F,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_VDP),
                },
                MemMapChunk {
                    start: WORK_RAM_BASE,
                    end: 0x100_0000,
                    mask: WORK_RAM_SIZE as u32 - 1,
                    flags: MemFlags::RAM,
                    backing: Backing::Flat {
                        buffer: WORK_RAM,
                        offset: 0,
                    },
                },
            ],
            0xFF_FFFF,
        )
    }

    /// The Z80 map.
    #[must_use]
    pub fn z80_memmap() -> MemMap {
        MemMap::new(
            vec![
                MemMapChunk {
                    start: 0,
                    end: 0x4000,
                    mask: Z80_RAM_SIZE as u32 - 1,
                    flags: MemFlags::RAM,
                    backing: Backing::Flat {
                        buffer: Z80_RAM,
                        offset: 0,
                    },
                },
                MemMapChunk {
                    start: 0x4000,
                    end: 0x6000,
                    mask: 0x3,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_YM),
                },
                MemMapChunk {
                    start: 0x6000,
                    end: 0x7F00,
                    mask: 0xFFFF,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_BANK_REG),
                },
                MemMapChunk {
                    start: 0x7F00,
                    end: 0x8000,
                    mask: 0xFF,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_Z80_VDP),
                },
                MemMapChunk {
                    start: 0x8000,
                    end: 0x1_0000,
                    mask: 0x7FFF,
                    flags: MemFlags::RAM,
                    backing: Backing::Banked {
                        slot: BANK_SLOT,
                        handler: Some(H_BANK_WINDOW),
                    },
                },
            ],
            0xFFFF,
        )
    }

    /// Code view for the Z80 window. Only cartridge banks can hold Z80 code.
    #[must_use]
    pub fn bank_view(&self, bank: u16) -> Option<BankView> {
        let base = u32::from(bank) << 15;
        ((base as usize) < ROM_WINDOW).then_some(BankView {
            buffer: ROM,
            base: base & self.rom_mask,
            id: u32::from(bank),
        })
    }

    /// Byte of 68K space as the Z80 window sees it; `None` where the window
    /// reaches something other than cartridge or work RAM.
    #[must_use]
    pub fn read_m68k(&self, address: u32) -> Option<u8> {
        let address = address & 0xFF_FFFF;
        if (address as usize) < ROM_WINDOW {
            self.rom.get((address & self.rom_mask) as usize).copied()
        } else if address >= WORK_RAM_BASE {
            self.work_ram.get(address as usize & (WORK_RAM_SIZE - 1)).copied()
        } else {
            None
        }
    }

    /// Store through the Z80 window. Returns the 68K address when work RAM
    /// changed.
    pub fn write_m68k(&mut self, address: u32, value: u8) -> Option<u32> {
        let address = address & 0xFF_FFFF;
        if address >= WORK_RAM_BASE {
            let offset = address as usize & (WORK_RAM_SIZE - 1);
            self.work_ram[offset] = value;
            return Some(address);
        }
        if (address as usize) >= ROM_WINDOW {
            log::warn!("z80: bank write {value:#04X} to {address:#08X} ignored");
        }
        None
    }
}

/// Words for 68K-to-VDP transfers. The Z80 area and the VDP itself read
/// as zero.
impl DmaSource for Memory {
    fn read_dma_word(&mut self, address: u32) -> u16 {
        let address = address & 0xFF_FFFE;
        let word = |mem: &[u8], index: usize| {
            mem.get(index..index + 2)
                .map_or(0, |b| u16::from_be_bytes([b[0], b[1]]))
        };
        match address {
            a if (a as usize) < ROM_WINDOW => word(&self.rom, (a & self.rom_mask) as usize),
            0xA0_0000..=0xAF_FFFF | 0xC0_0000..=0xDF_FFFF => 0,
            a if a >= WORK_RAM_BASE => word(&self.work_ram, a as usize & (WORK_RAM_SIZE - 1)),
            a => {
                log::warn!("vdp: DMA read from unmapped {a:#08X}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_core::Access;

    #[test]
    fn rom_is_padded_and_mirrored() {
        let mem = Memory::new(vec![0x12, 0x34, 0x56]).expect("rom");
        assert_eq!(mem.rom.len(), MIN_ROM_SIZE);
        assert_eq!(mem.read_m68k(0), Some(0x12));
        assert_eq!(mem.read_m68k(MIN_ROM_SIZE as u32 + 1), Some(0x34));
    }

    #[test]
    fn rom_size_limits() {
        assert_eq!(Memory::new(Vec::new()).unwrap_err(), MachineError::EmptyRom);
        assert_eq!(
            Memory::new(vec![0; ROM_WINDOW + 2]).unwrap_err(),
            MachineError::RomTooLarge { len: ROM_WINDOW + 2 }
        );
    }

    #[test]
    fn work_ram_mirrors_across_top_of_memory() {
        let mem = Memory::new(vec![0; 0x200]).expect("rom");
        let map = mem.m68k_memmap();
        let Access::Flat { buffer, index, code, .. } = map.resolve(0xFF_1234) else {
            panic!("work RAM should be flat");
        };
        assert_eq!((buffer, index), (WORK_RAM, 0x1234));
        assert_eq!(code, Some(WORK_RAM_CHUNK));
        assert_eq!(map.resolve(0xE0_1234), map.resolve(0xFF_1234));
    }

    #[test]
    fn z80_ram_chunk_is_code() {
        let map = Memory::z80_memmap();
        let Access::Flat { index, code, .. } = map.resolve(0x2001) else {
            panic!("Z80 RAM should be flat");
        };
        assert_eq!(index, 1);
        assert_eq!(code, Some(Z80_RAM_CHUNK));
    }

    #[test]
    fn bank_views_cover_cartridge_only() {
        let mem = Memory::new(vec![0; 0x10_0000]).expect("rom");
        assert_eq!(
            mem.bank_view(3),
            Some(BankView {
                buffer: ROM,
                base: 3 << 15,
                id: 3
            })
        );
        assert_eq!(mem.bank_view(0x80), None);
    }

    #[test]
    fn dma_reads_zero_from_z80_and_vdp_space() {
        let mut mem = Memory::new(vec![0xAB, 0xCD]).expect("rom");
        mem.work_ram[0x10] = 0x55;
        mem.work_ram[0x11] = 0xAA;
        assert_eq!(mem.read_dma_word(0), 0xABCD);
        assert_eq!(mem.read_dma_word(0xFF_0010), 0x55AA);
        assert_eq!(mem.read_dma_word(0xA0_0000), 0);
        assert_eq!(mem.read_dma_word(0xC0_0000), 0);
    }

    #[test]
    fn window_writes_only_land_in_work_ram() {
        let mut mem = Memory::new(vec![0; 0x200]).expect("rom");
        assert_eq!(mem.write_m68k(0xFF_8000, 0x42), Some(0xFF_8000));
        assert_eq!(mem.work_ram[0x8000], 0x42);
        assert_eq!(mem.write_m68k(0x00_0010, 0x42), None);
        assert_eq!(mem.rom[0x10], 0);
    }
}
