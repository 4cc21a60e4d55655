//! Hand-assembled cartridges for the integration tests.

#![allow(dead_code)]

use machine_genesis::{Genesis, GenesisConfig};

pub const ENTRY: usize = 0x200;
pub const VINT_HANDLER: usize = 0x300;
pub const HINT_HANDLER: usize = 0x400;
const TRAP: usize = 0x500;

/// Initial supervisor stack, near the top of work RAM.
const STACK: u32 = 0x00FF_FE00;

/// 32K cartridge: `main` at the reset entry, the V-int and H-int handlers
/// on their autovectors, every other exception parked in a loop.
pub fn rom(main: &[u16], vint: &[u16], hint: &[u16]) -> Vec<u8> {
    let mut rom = vec![0xFF; 0x8000];
    put_long(&mut rom, 0, STACK);
    put_long(&mut rom, 4, ENTRY as u32);
    for vector in 2..64 {
        put_long(&mut rom, vector * 4, TRAP as u32);
    }
    put_long(&mut rom, 28 * 4, HINT_HANDLER as u32);
    put_long(&mut rom, 30 * 4, VINT_HANDLER as u32);

    place(&mut rom, ENTRY, main);
    place(&mut rom, VINT_HANDLER, if vint.is_empty() { &[RTE] } else { vint });
    place(&mut rom, HINT_HANDLER, if hint.is_empty() { &[RTE] } else { hint });
    place(&mut rom, TRAP, &[BRA_SELF]);
    rom
}

fn put_long(rom: &mut [u8], at: usize, value: u32) {
    rom[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn place(rom: &mut [u8], at: usize, words: &[u16]) {
    for (i, word) in words.iter().enumerate() {
        rom[at + i * 2..at + i * 2 + 2].copy_from_slice(&word.to_be_bytes());
    }
}

pub fn genesis(rom: Vec<u8>) -> Genesis {
    Genesis::new(GenesisConfig::new(rom)).expect("valid test cartridge")
}

pub fn word_at(ram: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([ram[offset], ram[offset + 1]])
}

// 68000 encodings used by the test programs.

pub const RTE: u16 = 0x4E73;
pub const NOP: u16 = 0x4E71;
/// `bra.s *`
pub const BRA_SELF: u16 = 0x60FE;

/// `move.w #value,(address).l`
pub fn move_w(value: u16, address: u32) -> [u16; 4] {
    [0x33FC, value, (address >> 16) as u16, address as u16]
}

/// `move.b #value,(address).l`
pub fn move_b(value: u8, address: u32) -> [u16; 4] {
    [0x13FC, u16::from(value), (address >> 16) as u16, address as u16]
}

/// `addq.w #1,(address).l`
pub fn inc_w(address: u32) -> [u16; 3] {
    [0x5279, (address >> 16) as u16, address as u16]
}

/// `move.w #sr,sr`
pub fn set_sr(sr: u16) -> [u16; 2] {
    [0x46FC, sr]
}

/// `jmp (address).l`
pub fn jmp(address: u32) -> [u16; 3] {
    [0x4EF9, (address >> 16) as u16, address as u16]
}

/// `wait: btst #0,(A11100).l; bne.s wait`: spin until the Z80 bus is granted.
pub const WAIT_BUSACK: [u16; 5] = [0x0839, 0x0000, 0x00A1, 0x1100, 0x66F6];

pub const VDP_CTRL: u32 = 0xC0_0004;
pub const BUSREQ: u32 = 0xA1_1100;
pub const Z80_RESET: u32 = 0xA1_1200;
pub const WORK_RAM: u32 = 0xFF_0000;

/// Concatenate instruction fragments.
pub fn program(parts: &[&[u16]]) -> Vec<u16> {
    parts.concat()
}
