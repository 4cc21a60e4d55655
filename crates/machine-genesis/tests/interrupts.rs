//! 68K interrupt timing driven by the VDP.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use emu_core::CYCLE_NEVER;
use jit_core::GuestContext;
use machine_genesis::Genesis;
use motorola_68000::Registers;

/// Enable V-int (mode 5, display on), unmask, spin.
fn vint_program(sr: u16) -> Vec<u16> {
    program(&[&move_w(0x8164, VDP_CTRL), &set_sr(sr), &[BRA_SELF]])
}

fn vint_counter(sr: u16) -> Genesis {
    genesis(rom(&vint_program(sr), &program(&[&inc_w(WORK_RAM), &[RTE]]), &[]))
}

#[test]
fn int_cycle_tracks_next_vint() {
    let mut genesis = vint_counter(0x2000);
    genesis.run_cycles(10_000).expect("run");
    let next = genesis.vdp().next_vint();
    assert_ne!(next, CYCLE_NEVER);
    assert_eq!(genesis.m68k().ctx.int_cycle, next);
}

#[test]
fn vint_dispatched_at_or_after_its_cycle() {
    let mut genesis = vint_counter(0x2000);
    genesis.run_cycles(10_000).expect("run");
    let due = genesis.vdp().next_vint();

    let hits = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&hits);
    genesis.set_m68k_debugger(Box::new(move |ctx: &mut GuestContext<Registers>, _address: u32| {
        log.borrow_mut().push(ctx.current_cycle);
    }));
    genesis.insert_m68k_breakpoint(VINT_HANDLER as u32);
    genesis.run_frame().expect("frame");

    let hits = hits.borrow();
    assert_eq!(hits.len(), 1, "one V-int per frame");
    assert!(hits[0] >= due, "dispatched at {} before {due}", hits[0]);
}

#[test]
fn one_vint_per_frame() {
    let mut genesis = vint_counter(0x2000);
    for _ in 0..3 {
        genesis.run_frame().expect("frame");
    }
    assert_eq!(word_at(genesis.work_ram(), 0), 3);
}

#[test]
fn masked_vint_never_scheduled() {
    let mut genesis = vint_counter(0x2700);
    genesis.run_frame().expect("frame");
    genesis.run_frame().expect("frame");
    assert_eq!(word_at(genesis.work_ram(), 0), 0);
    assert_eq!(genesis.m68k().ctx.int_cycle, CYCLE_NEVER);
}

#[test]
fn hint_every_line_of_active_display() {
    // H-int every line, V-int off.
    let main = program(&[
        &move_w(0x8014, VDP_CTRL),
        &move_w(0x8A00, VDP_CTRL),
        &move_w(0x8144, VDP_CTRL),
        &set_sr(0x2000),
        &[BRA_SELF],
    ]);
    let hint = program(&[&inc_w(WORK_RAM + 2), &[RTE]]);
    let mut genesis = genesis(rom(&main, &[], &hint));
    genesis.run_frame().expect("frame");
    genesis.run_frame().expect("frame");
    let second = word_at(genesis.work_ram(), 2);
    assert!(
        (200..=2 * 224).contains(&second),
        "{second} H-ints over two frames"
    );
    assert_eq!(word_at(genesis.work_ram(), 0), 0, "no V-int handler ran");
}

#[test]
fn stop_waits_for_interrupt() {
    // stop #$2000 instead of spinning.
    let main = program(&[&move_w(0x8164, VDP_CTRL), &[0x4E72, 0x2000], &[BRA_SELF]]);
    let vint = program(&[&inc_w(WORK_RAM), &[RTE]]);
    let mut genesis = genesis(rom(&main, &vint, &[]));
    genesis.run_frame().expect("frame");
    assert_eq!(word_at(genesis.work_ram(), 0), 1);
    assert!(!genesis.m68k().regs().stopped, "woken by the interrupt");
}
