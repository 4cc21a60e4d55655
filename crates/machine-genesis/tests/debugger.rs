//! Stop and debugger requests against a running machine.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use jit_core::GuestContext;
use machine_genesis::Genesis;
use motorola_68000::Registers;

/// `inc_w` of the main loop below.
const LOOP: u32 = ENTRY as u32 + 12;
/// `bra.s` back to it.
const LOOP_BRANCH: u32 = LOOP + 6;

/// V-int on, interrupts unmasked, then count loop iterations at $FF0004.
fn counting_machine() -> Genesis {
    let main = program(&[
        &move_w(0x8164, VDP_CTRL),
        &set_sr(0x2000),
        &inc_w(WORK_RAM + 4),
        &[0x60F8],
    ]);
    genesis(rom(&main, &program(&[&inc_w(WORK_RAM), &[RTE]]), &[]))
}

#[test]
fn stop_from_breakpoint_ends_frame_at_that_instruction() {
    let mut genesis = counting_machine();
    let frame = genesis.vdp().frame();
    let hits = Rc::new(RefCell::new(0u32));
    let seen = Rc::clone(&hits);
    genesis.set_m68k_debugger(Box::new(move |ctx: &mut GuestContext<Registers>, _address: u32| {
        *seen.borrow_mut() += 1;
        if *seen.borrow() == 3 {
            ctx.request_stop();
        }
    }));
    genesis.insert_m68k_breakpoint(LOOP);
    genesis.run_frame().expect("frame");

    assert_eq!(*hits.borrow(), 3);
    assert_eq!(word_at(genesis.work_ram(), 4), 3, "the stopped-at instruction completed");
    assert_eq!(genesis.m68k().regs().pc, LOOP_BRANCH);
    assert_eq!(genesis.vdp().frame(), frame, "frame cut short");

    genesis.remove_m68k_breakpoint(LOOP);
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.vdp().frame(), frame + 1);
    assert_eq!(*hits.borrow(), 3);
}

#[test]
fn requested_stop_returns_before_running() {
    let mut genesis = counting_machine();
    genesis.run_cycles(20_000).expect("run");
    let pc = genesis.m68k().regs().pc;
    let count = word_at(genesis.work_ram(), 4);

    genesis.request_stop();
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.m68k().regs().pc, pc);
    assert_eq!(word_at(genesis.work_ram(), 4), count);

    // The request is spent.
    let frame = genesis.vdp().frame();
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.vdp().frame(), frame + 1);
    assert!(word_at(genesis.work_ram(), 4) > count);
}

#[test]
fn requested_debugger_runs_at_next_instruction() {
    let mut genesis = counting_machine();
    genesis.run_cycles(20_000).expect("run");
    let pc = genesis.m68k().regs().pc;

    let hits = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&hits);
    genesis.set_m68k_debugger(Box::new(move |ctx: &mut GuestContext<Registers>, address: u32| {
        seen.borrow_mut().push((address, ctx.regs.pc));
    }));
    genesis.request_debugger();
    genesis.run_cycles(20_000).expect("run");

    assert_eq!(*hits.borrow(), vec![(pc, pc)]);
    assert!(!genesis.m68k().ctx.debug_requested);
}
