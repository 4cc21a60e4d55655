//! Z80 bus request/reset, the Z80 bank window and cross-CPU code writes.

mod common;

use common::*;

/// Z80: `ld a,$42; ld ($1000),a; jr $`
const Z80_STORE_42: [u8; 7] = [0x3E, 0x42, 0x32, 0x00, 0x10, 0x18, 0xFE];

/// Z80: select bank $1FE (68K $FF0000), `ld ($8000+offset),a` with `value`, spin.
fn z80_window_store(offset: u16, value: u8) -> Vec<u8> {
    let mut code = vec![0x21, 0x00, 0x60, 0x3E, 0x00, 0x77, 0x3E, 0x01];
    // Bank bits go in LSB first: 0 then eight 1s.
    code.extend(std::iter::repeat_n(0x77, 8));
    let [lo, hi] = (0x8000 | offset).to_le_bytes();
    code.extend([0x3E, value, 0x32, lo, hi, 0x18, 0xFE]);
    code
}

/// Z80: `ld hl,$6000`, then the nine bank register writes selecting `bank`.
fn select_bank(bank: u16) -> Vec<u8> {
    let mut code = vec![0x21, 0x00, 0x60];
    for bit in 0..9 {
        code.extend([0x3E, (bank >> bit & 1) as u8, 0x77]);
    }
    code
}

/// Z80: `loop: ld hl,($1000); inc hl; ld ($1000),hl; jr loop`
const Z80_COUNTER: [u8; 9] = [0x2A, 0x00, 0x10, 0x23, 0x22, 0x00, 0x10, 0x18, 0xF7];

/// A 128K cartridge that releases the Z80 and spins.
fn banked_cartridge(banks: &[(usize, &[u8])]) -> Vec<u8> {
    let mut cart = rom(&program(&[&move_w(0x100, Z80_RESET), &[BRA_SELF]]), &[], &[]);
    cart.resize(0x2_0000, 0xFF);
    for &(at, code) in banks {
        cart[at..at + code.len()].copy_from_slice(code);
    }
    cart
}

fn z80_counter(genesis: &machine_genesis::Genesis) -> u16 {
    u16::from_le_bytes([genesis.z80_ram()[0x1000], genesis.z80_ram()[0x1001]])
}

#[test]
fn z80_space_closed_without_bus_grant() {
    let main = program(&[&move_b(0x55, 0xA0_0010), &[BRA_SELF]]);
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.run_frame().expect("frame");
    assert!(!genesis.z80_bus_granted());
    assert_eq!(genesis.z80_ram()[0x10], 0);
}

#[test]
fn m68k_loads_and_starts_z80_program() {
    let mut main = program(&[&move_w(0x100, BUSREQ), &move_w(0x100, Z80_RESET), &WAIT_BUSACK]);
    for (i, &byte) in Z80_STORE_42.iter().enumerate() {
        main.extend(move_b(byte, 0xA0_0000 + i as u32));
    }
    main.extend(program(&[
        &move_w(0, Z80_RESET),
        &move_w(0, BUSREQ),
        &move_w(0x100, Z80_RESET),
        &[BRA_SELF],
    ]));
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.run_frame().expect("frame");

    assert_eq!(&genesis.z80_ram()[..7], &Z80_STORE_42);
    assert!(!genesis.z80_bus_granted());
    assert_eq!(genesis.z80_ram()[0x1000], 0x42);
}

#[test]
fn z80_held_while_bus_granted() {
    let main = program(&[&move_w(0x100, BUSREQ), &move_w(0x100, Z80_RESET), &[BRA_SELF]]);
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.poke_z80_ram(0, &Z80_STORE_42);
    genesis.run_frame().expect("frame");
    assert!(genesis.z80_bus_granted());
    assert_eq!(genesis.z80_ram()[0x1000], 0, "Z80 never ran");
    assert_eq!(genesis.z80().regs().pc, 0);
}

#[test]
fn bank_window_reaches_work_ram() {
    let main = program(&[&move_w(0x100, Z80_RESET), &[BRA_SELF]]);
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.poke_z80_ram(0, &z80_window_store(0x34, 0x99));
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.z80_bank(), 0x1FE);
    assert_eq!(genesis.work_ram()[0x34], 0x99);
}

#[test]
fn z80_rewrites_running_m68k_code() {
    // 68K loop in work RAM: move.w #1,$FF0000; bra.s loop
    let loop_at = 0x100;
    let mut looped = Vec::new();
    for word in program(&[&move_w(1, WORK_RAM), &[0x60F6]]) {
        looped.extend(word.to_be_bytes());
    }
    let main = program(&[&move_w(0x100, Z80_RESET), &jmp(WORK_RAM + loop_at)]);
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.poke_work_ram(loop_at as usize, &looped);
    // Patch the immediate's low byte from 1 to 2.
    genesis.poke_z80_ram(0, &z80_window_store(loop_at as u16 + 3, 0x02));

    genesis.run_frame().expect("frame");
    assert_eq!(genesis.work_ram()[loop_at as usize + 3], 0x02);
    assert_eq!(word_at(genesis.work_ram(), 0), 2, "68K executes the patched store");
    assert!(genesis.m68k().stats().invalidations >= 1);
}

#[test]
fn external_z80_ram_write_retranslates() {
    // Z80 loop: ld a,1; ld ($1000),a; jr 0
    let mut genesis = genesis(rom(&program(&[&move_w(0x100, Z80_RESET), &[BRA_SELF]]), &[], &[]));
    genesis.poke_z80_ram(0, &[0x3E, 0x01, 0x32, 0x00, 0x10, 0x18, 0xF9]);
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.z80_ram()[0x1000], 1);

    genesis.poke_z80_ram(1, &[0x02]);
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.z80_ram()[0x1000], 2);
}

#[test]
fn bank_register_decodes_its_whole_page() {
    let mut main = program(&[&move_w(0x100, BUSREQ), &move_w(0x100, Z80_RESET), &WAIT_BUSACK]);
    for bit in 0..9u32 {
        main.extend(move_b((0x0AB >> bit & 1) as u8, 0xA0_6000 + bit * 0x1F));
    }
    main.push(BRA_SELF);
    let mut genesis = genesis(rom(&main, &[], &[]));
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.z80_bank(), 0x0AB);
}

#[test]
fn window_code_follows_its_own_bank_switch() {
    // One more bank bit shifts bank 2 to bank 1 under the running code:
    // `ld hl,$6000; ld a,0; ld (hl),a`, then the store at offset 6 comes
    // from whichever bank is selected.
    let switch = [0x21, 0x00, 0x60, 0x3E, 0x00, 0x77];
    let store = |value: u8| [0x3E, value, 0x32, 0x00, 0x10, 0x18, 0xFE];
    let mut bank2 = switch.to_vec();
    bank2.extend(store(2));
    let mut genesis = genesis(banked_cartridge(&[
        (0x1_0000, bank2.as_slice()),
        (0x8000 + switch.len(), &store(1)[..]),
    ]));
    let mut boot = select_bank(2);
    boot.extend([0xC3, 0x00, 0x80]);
    genesis.poke_z80_ram(0, &boot);

    genesis.run_frame().expect("frame");
    assert_eq!(genesis.z80_bank(), 1);
    assert_eq!(genesis.z80_ram()[0x1000], 1, "ran the new bank's code");
}

#[test]
fn window_code_pays_for_the_68k_bus() {
    let mut from_ram = genesis(banked_cartridge(&[]));
    from_ram.poke_z80_ram(0, &Z80_COUNTER);

    let mut from_window = genesis(banked_cartridge(&[(0x8000, &Z80_COUNTER[..])]));
    let mut boot = select_bank(1);
    boot.extend([0xC3, 0x00, 0x80]);
    from_window.poke_z80_ram(0, &boot);

    for _ in 0..2 {
        from_ram.run_frame().expect("frame");
        from_window.run_frame().expect("frame");
    }
    let fast = z80_counter(&from_ram);
    let slow = z80_counter(&from_window);
    // 50 T-states per pass from RAM, 77 with three per fetched byte.
    assert!(slow > 0);
    assert!(slow * 4 < fast * 3, "window {slow} vs RAM {fast}");
}
