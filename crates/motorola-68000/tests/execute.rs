use std::cell::Cell;
use std::rc::Rc;

use jit_core::{
    Backing, BufferId, GuestBus, GuestContext, HandlerId, JitOptions, MemFlags, MemMap,
    MemMapChunk,
};
use motorola_68000::{M68k, M68kBus, M68kSnapshot, Registers};

const DIVIDER: u32 = 7;
const STACK: u32 = 0x8000;
const ENTRY: u32 = 0x0400;

struct Ram {
    mem: Vec<u8>,
    level: u8,
    acks: Vec<u8>,
    sr_changes: usize,
}

impl GuestBus<Registers> for Ram {
    fn buffer(&self, _id: BufferId) -> &[u8] {
        &self.mem
    }

    fn buffer_mut(&mut self, _id: BufferId) -> &mut [u8] {
        &mut self.mem
    }

    fn read8(&mut self, _handler: HandlerId, _address: u32, _ctx: &mut GuestContext<Registers>) -> u8 {
        0xFF
    }

    fn write8(&mut self, _handler: HandlerId, _address: u32, _value: u8, _ctx: &mut GuestContext<Registers>) {}

    fn interrupt_state_changed(&mut self, _ctx: &mut GuestContext<Registers>) {
        self.sr_changes += 1;
    }
}

impl M68kBus for Ram {
    fn interrupt_level(&self) -> u8 {
        self.level
    }

    fn interrupt_acknowledge(&mut self, level: u8, _ctx: &mut GuestContext<Registers>) {
        self.acks.push(level);
        self.level = 0;
    }
}

fn raise(cpu: &mut M68k, ram: &mut Ram, cycle: u32, level: u8) {
    cpu.ctx.int_cycle = cycle;
    ram.level = level;
}

fn load(mem: &mut [u8], addr: u32, words: &[u16]) {
    for (i, w) in words.iter().enumerate() {
        let at = addr as usize + i * 2;
        mem[at..at + 2].copy_from_slice(&w.to_be_bytes());
    }
}

fn vector(mem: &mut [u8], n: u32, handler: u32) {
    load(mem, n * 4, &[(handler >> 16) as u16, handler as u16]);
}

/// Vector table with SSP and reset PC, `program` at the entry point plus
/// any extra `(address, words)` pieces.
fn machine(program: &[u16], extra: &[(u32, &[u16])]) -> (M68k, Ram) {
    let memmap = MemMap::new(
        vec![MemMapChunk {
            start: 0,
            end: 0x1_0000,
            mask: 0xFFFF,
            flags: MemFlags::RAM,
            backing: Backing::Flat {
                buffer: BufferId(0),
                offset: 0,
            },
        }],
        0xFF_FFFF,
    );
    let mut mem = vec![0; 0x1_0000];
    vector(&mut mem, 0, STACK);
    vector(&mut mem, 1, ENTRY);
    load(&mut mem, ENTRY, program);
    for &(addr, words) in extra {
        load(&mut mem, addr, words);
    }
    let mut ram = Ram {
        mem,
        level: 0,
        acks: Vec::new(),
        sr_changes: 0,
    };
    let mut cpu = M68k::new(memmap, JitOptions::default(), DIVIDER);
    cpu.reset(&mut ram);
    (cpu, ram)
}

const fn clocks(n: u32) -> u32 {
    n * DIVIDER
}

#[test]
fn reset_loads_stack_and_entry() {
    let (cpu, _) = machine(&[0x60FE], &[]);
    assert_eq!(cpu.regs().pc, ENTRY);
    assert_eq!(cpu.regs().ssp, STACK);
    assert_eq!(cpu.regs().sr, 0x2700);
}

#[test]
fn moveq_charges_four_clocks_each() {
    // moveq #1,d0; moveq #2,d1; moveq #-1,d2; bra *
    let (mut cpu, mut ram) = machine(&[0x7001, 0x7202, 0x74FF, 0x60FE], &[]);
    cpu.run_to(&mut ram, clocks(12)).unwrap();
    assert_eq!(cpu.current_cycle(), clocks(12));
    assert_eq!(cpu.regs().pc, ENTRY + 6);
    assert_eq!(cpu.regs().d[..3], [1, 2, 0xFFFF_FFFF]);
    assert_eq!(cpu.regs().sr & 0x0F, 0x08);
}

#[test]
fn dbf_loop_counts_down_to_minus_one() {
    // moveq #0,d0; moveq #4,d1; loop: addq.w #3,d0; dbf d1,loop; stop #$2700
    let (mut cpu, mut ram) = machine(&[0x7000, 0x7204, 0x5640, 0x51C9, 0xFFFC, 0x4E72, 0x2700], &[]);
    cpu.run_to(&mut ram, clocks(1000)).unwrap();
    assert_eq!(cpu.regs().d[0], 15);
    assert_eq!(cpu.regs().d[1] & 0xFFFF, 0xFFFF);
    assert!(cpu.regs().stopped);
    assert_eq!(cpu.regs().pc, ENTRY + 14);
}

#[test]
fn subq_borrow_sets_x_n_c() {
    // moveq #0,d0; subq.l #1,d0; bra *
    let (mut cpu, mut ram) = machine(&[0x7000, 0x5380, 0x60FE], &[]);
    cpu.run_to(&mut ram, clocks(100)).unwrap();
    assert_eq!(cpu.regs().d[0], 0xFFFF_FFFF);
    assert_eq!(cpu.regs().sr & 0x1F, 0x19);
    assert_eq!(cpu.regs().pc, ENTRY + 4);
}

#[test]
fn movem_round_trips_through_stack() {
    let (mut cpu, mut ram) = machine(
        &[
            0x7001, // moveq #1,d0
            0x7202, // moveq #2,d1
            0x48E7, 0xC000, // movem.l d0-d1,-(sp)
            0x4CDF, 0x000C, // movem.l (sp)+,d2-d3
            0x60FE,
        ],
        &[],
    );
    cpu.run_to(&mut ram, clocks(200)).unwrap();
    assert_eq!(&ram.mem[0x7FF8..0x8000], &[0, 0, 0, 1, 0, 0, 0, 2]);
    assert_eq!(cpu.regs().d[2], 1);
    assert_eq!(cpu.regs().d[3], 2);
    assert_eq!(cpu.regs().active_sp(), STACK);
}

#[test]
fn trap_and_rte_return_to_next_instruction() {
    let (mut cpu, mut ram) = machine(
        &[0x4E41, 0x7602, 0x60FE], // trap #1; moveq #2,d3; bra *
        &[(0x0600, &[0x7401, 0x4E73])], // moveq #1,d2; rte
    );
    vector(&mut ram.mem, 33, 0x0600);
    cpu.run_to(&mut ram, clocks(300)).unwrap();
    assert_eq!(cpu.regs().d[2], 1);
    assert_eq!(cpu.regs().d[3], 2);
    assert_eq!(cpu.regs().active_sp(), STACK);
    assert_eq!(cpu.regs().pc, ENTRY + 4);
}

#[test]
fn divide_by_zero_takes_vector_five() {
    let (mut cpu, mut ram) = machine(
        &[0x7064, 0x7200, 0x80C1, 0x60FE], // moveq #100,d0; moveq #0,d1; divu d1,d0; bra *
        &[(0x0700, &[0x7A05, 0x60FE])],   // moveq #5,d5; bra *
    );
    vector(&mut ram.mem, 5, 0x0700);
    cpu.run_to(&mut ram, clocks(300)).unwrap();
    assert_eq!(cpu.regs().d[5], 5);
    assert_eq!(cpu.regs().d[0], 100);
    // Stacked PC is the instruction after the divide.
    assert_eq!(&ram.mem[0x7FFC..0x8000], &[0, 0, 0x04, 0x06]);
}

#[test]
fn user_mode_sr_write_is_privilege_violation() {
    let (mut cpu, mut ram) = machine(
        &[0x46FC, 0x0000, 0x46FC, 0x2700, 0x60FE], // move #0,sr; move #$2700,sr
        &[(0x0700, &[0x7808, 0x60FE])],            // moveq #8,d4; bra *
    );
    vector(&mut ram.mem, 8, 0x0700);
    cpu.run_to(&mut ram, clocks(300)).unwrap();
    assert_eq!(cpu.regs().d[4], 8);
    assert!(cpu.regs().is_supervisor());
    assert_eq!(&ram.mem[0x7FFA..0x7FFC], &[0x00, 0x00]);
}

#[test]
fn autovector_interrupt_wakes_stop() {
    let (mut cpu, mut ram) = machine(
        &[0x4E72, 0x2000], // stop #$2000
        &[(0x0500, &[0x7E2A, 0x4E72, 0x2700])], // moveq #42,d7; stop #$2700
    );
    vector(&mut ram.mem, 30, 0x0500);
    raise(&mut cpu, &mut ram, clocks(100), 6);
    cpu.run_to(&mut ram, clocks(1000)).unwrap();
    assert_eq!(ram.acks, vec![6]);
    assert_eq!(cpu.regs().d[7], 42);
    assert!(cpu.regs().stopped);
    assert_eq!(cpu.current_cycle(), clocks(1000));
    // SR then PC of the instruction after STOP.
    assert_eq!(&ram.mem[0x7FFA..0x8000], &[0x20, 0x00, 0, 0, 0x04, 0x04]);
    assert!(ram.sr_changes >= 1);
}

#[test]
fn masked_level_waits_but_level_seven_does_not() {
    let (mut cpu, mut ram) = machine(
        &[0x4E72, 0x2500], // stop #$2500
        &[(0x0500, &[0x7E01, 0x60FE]), (0x0600, &[0x7E07, 0x60FE])],
    );
    vector(&mut ram.mem, 29, 0x0500);
    vector(&mut ram.mem, 31, 0x0600);

    raise(&mut cpu, &mut ram, clocks(50), 5);
    cpu.run_to(&mut ram, clocks(500)).unwrap();
    assert!(ram.acks.is_empty());
    assert_eq!(cpu.regs().d[7], 0);

    raise(&mut cpu, &mut ram, clocks(600), 7);
    cpu.run_to(&mut ram, clocks(1000)).unwrap();
    assert_eq!(ram.acks, vec![7]);
    assert_eq!(cpu.regs().d[7], 7);
    assert_eq!(cpu.regs().interrupt_mask(), 7);
}

#[test]
fn store_over_translated_code_runs_new_instruction() {
    let (mut cpu, mut ram) = machine(
        &[
            0x6100, 0x001E, // bsr.w $420
            0x31FC, 0x7E07, 0x0422, // move.w #$7E07,($0422).w
            0x6100, 0x0014, // bsr.w $420
            0x4E72, 0x2700,
        ],
        &[(0x0420, &[0x4E71, 0x7E01, 0x4E75])], // nop; moveq #1,d7; rts
    );
    cpu.run_to(&mut ram, clocks(1000)).unwrap();
    assert_eq!(cpu.regs().d[7], 7);
    assert!(cpu.regs().stopped);
    assert!(cpu.stats().invalidations >= 1);
    assert!(cpu.stats().retranslations >= 1);
}

#[test]
fn breakpoint_does_not_change_timing() {
    let program = [0x7001, 0x7202, 0x7403, 0x4E72, 0x2700];

    let (mut plain, mut ram) = machine(&program, &[]);
    plain.run_to(&mut ram, clocks(100)).unwrap();

    let (mut cpu, mut ram) = machine(&program, &[]);
    let hits = Rc::new(Cell::new(0));
    let seen = Rc::clone(&hits);
    cpu.set_debugger(Box::new(move |ctx: &mut GuestContext<Registers>, pc: u32| {
        assert_eq!(pc, ENTRY + 2);
        assert_eq!(ctx.regs.d[0], 1);
        seen.set(seen.get() + 1);
    }));
    cpu.insert_breakpoint(ENTRY + 2);
    cpu.run_to(&mut ram, clocks(100)).unwrap();

    assert_eq!(hits.get(), 1);
    assert_eq!(cpu.regs(), plain.regs());
    assert_eq!(cpu.current_cycle(), plain.current_cycle());
}

#[test]
fn snapshot_survives_msgpack() {
    let (mut cpu, mut ram) = machine(&[0x7A55, 0x4E72, 0x2300], &[]);
    cpu.run_to(&mut ram, clocks(50)).unwrap();
    let snap = cpu.snapshot();
    let bytes = rmp_serde::to_vec(&snap).unwrap();
    let back: M68kSnapshot = rmp_serde::from_slice(&bytes).unwrap();
    assert_eq!(back, snap);
    assert_eq!(back.regs.d[5], 0x55);
    assert!(back.regs.stopped);

    let (mut other, _) = machine(&[], &[]);
    other.restore(&back);
    assert_eq!(other.regs(), cpu.regs());
    assert_eq!(other.current_cycle(), cpu.current_cycle());
}
