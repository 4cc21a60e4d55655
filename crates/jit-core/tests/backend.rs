//! Backend behaviour exercised through a minimal accumulator machine.
//!
//! Encoding (little-endian operands):
//!   01 nn     LDI nn      2 clocks
//!   02 nn     ADDI nn     3 clocks
//!   03 ll hh  JMP hhll    4 clocks
//!   04 ll hh  JNZ hhll    3 clocks (+2 taken)
//!   05        DEC         1 clock
//!   06 ll hh  STA hhll    5 clocks, untranslatable to unmapped memory
//!   07        HALT        1 clock

use jit_core::{
    Access, Backing, BankView, BlockEnd, BufferId, Emitter, Env, Flow, GuestBus, GuestContext,
    HandlerId, HostOp, Isa, Jit, JitError, JitOptions, MemFlags, MemMap, MemMapChunk, Stop,
};
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
struct Regs {
    acc: u8,
}

#[derive(Debug, Clone, PartialEq)]
enum Inst {
    Ldi(u8),
    Addi(u8),
    Jmp(u16),
    Jnz(u16),
    Dec,
    Sta(u16),
    Halt,
    Illegal(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Ldi(u8),
    Addi(u8),
    TestNz,
    Dec,
    Store(Access, u16),
    Halt(u32),
}

struct Toy;

impl Isa for Toy {
    type Regs = Regs;
    type Op = Op;
    type Inst = Inst;

    const NAME: &'static str = "toy";
    const UNIT_SHIFT: u32 = 0;
    const MAX_INST_BYTES: usize = 3;
    const MAX_INST_SLOTS: usize = 4;

    fn decode(bytes: &[u8]) -> Inst {
        let word = u16::from_le_bytes([bytes[1], bytes[2]]);
        match bytes[0] {
            0x01 => Inst::Ldi(bytes[1]),
            0x02 => Inst::Addi(bytes[1]),
            0x03 => Inst::Jmp(word),
            0x04 => Inst::Jnz(word),
            0x05 => Inst::Dec,
            0x06 => Inst::Sta(word),
            0x07 => Inst::Halt,
            other => Inst::Illegal(other),
        }
    }

    fn length(inst: &Inst) -> u32 {
        match inst {
            Inst::Ldi(_) | Inst::Addi(_) => 2,
            Inst::Jmp(_) | Inst::Jnz(_) | Inst::Sta(_) => 3,
            Inst::Dec | Inst::Halt | Inst::Illegal(_) => 1,
        }
    }

    fn is_illegal(inst: &Inst) -> bool {
        matches!(inst, Inst::Illegal(_))
    }

    fn base_cycles(inst: &Inst) -> u32 {
        match inst {
            Inst::Ldi(_) => 2,
            Inst::Addi(_) | Inst::Jnz(_) => 3,
            Inst::Jmp(_) => 4,
            Inst::Dec | Inst::Halt => 1,
            Inst::Sta(_) => 5,
            Inst::Illegal(_) => 0,
        }
    }

    fn translate(inst: &Inst, pc: u32, em: &mut Emitter<'_, Self>) -> BlockEnd {
        match *inst {
            Inst::Ldi(n) => em.op(Op::Ldi(n)),
            Inst::Addi(n) => em.op(Op::Addi(n)),
            Inst::Dec => em.op(Op::Dec),
            Inst::Sta(a) => {
                let access = em.access(u32::from(a));
                if matches!(access, Access::Unmapped) {
                    return em.illegal(pc);
                }
                em.op(Op::Store(access, a));
            }
            Inst::Jmp(t) => {
                em.jump(u32::from(t));
                return BlockEnd::Terminal;
            }
            Inst::Jnz(t) => {
                em.op(Op::TestNz);
                em.jump_if(u32::from(t));
            }
            Inst::Halt => {
                em.op(Op::Halt(pc + 1));
                return BlockEnd::Terminal;
            }
            Inst::Illegal(_) => return BlockEnd::Terminal,
        }
        BlockEnd::Continue
    }

    fn execute<B: GuestBus<Regs>>(op: &Op, env: &mut Env<'_, Self, B>) -> Flow {
        match *op {
            Op::Ldi(n) => env.ctx.regs.acc = n,
            Op::Addi(n) => env.ctx.regs.acc = env.ctx.regs.acc.wrapping_add(n),
            Op::Dec => env.ctx.regs.acc = env.ctx.regs.acc.wrapping_sub(1),
            Op::TestNz => {
                env.ctx.branch_taken = env.ctx.regs.acc != 0;
                if env.ctx.branch_taken {
                    env.ctx.add_clocks(2);
                }
            }
            Op::Store(access, a) => {
                let acc = env.ctx.regs.acc;
                env.write8_at(access, u32::from(a), acc);
            }
            Op::Halt(resume) => return Flow::Halt { resume },
        }
        Flow::Next
    }
}

/// Banked window: 0x1000-0x1FFF shows `mem[BANK_BASE + bank * 0x1000..]`.
const WINDOW: u32 = 0x1000;
const BANK_BASE: u32 = 0x2000;
const H_WINDOW: HandlerId = HandlerId(1);
/// Any store here selects the bank given by the stored value.
const H_BANK_SELECT: HandlerId = HandlerId(2);
const BANK_SELECT: u16 = 0x800;

fn bank(id: u8) -> Option<BankView> {
    Some(BankView {
        buffer: BufferId(0),
        base: BANK_BASE + u32::from(id) * 0x1000,
        id: u32::from(id),
    })
}

struct Ram {
    mem: Vec<u8>,
    /// Instruction bytes fetched through the banked window.
    fetches: Vec<u32>,
}

impl GuestBus<Regs> for Ram {
    fn buffer(&self, _id: BufferId) -> &[u8] {
        &self.mem
    }

    fn buffer_mut(&mut self, _id: BufferId) -> &mut [u8] {
        &mut self.mem
    }

    fn read8(&mut self, _h: HandlerId, _a: u32, _ctx: &mut GuestContext<Regs>) -> u8 {
        0xFF
    }

    fn write8(&mut self, h: HandlerId, _a: u32, v: u8, ctx: &mut GuestContext<Regs>) {
        if h == H_BANK_SELECT {
            ctx.mem_pointers[0] = bank(v);
        }
    }

    fn code_fetch(&mut self, h: HandlerId, address: u32, ctx: &mut GuestContext<Regs>) {
        assert_eq!(h, H_WINDOW);
        self.fetches.push(address);
        ctx.add_clocks(1);
    }
}

struct Machine {
    jit: Jit<Toy>,
    ctx: GuestContext<Regs>,
    bus: Ram,
}

impl Machine {
    fn new(program: &[(u16, &[u8])]) -> Self {
        let memmap = MemMap::new(
            vec![MemMapChunk {
                start: 0,
                end: 0x1000,
                mask: 0xFFF,
                flags: MemFlags::RAM,
                backing: Backing::Flat {
                    buffer: BufferId(0),
                    offset: 0,
                },
            }],
            0xFFFF,
        );
        Self::with_map(memmap, 0x1000, 0, program)
    }

    /// RAM at 0x000-0x7FF, the bank select port at 0x800, the banked
    /// window at 0x1000. `program` addresses index the backing memory.
    fn banked(program: &[(u16, &[u8])]) -> Self {
        let memmap = MemMap::new(
            vec![
                MemMapChunk {
                    start: 0,
                    end: 0x800,
                    mask: 0x7FF,
                    flags: MemFlags::RAM,
                    backing: Backing::Flat {
                        buffer: BufferId(0),
                        offset: 0,
                    },
                },
                MemMapChunk {
                    start: u32::from(BANK_SELECT),
                    end: 0x900,
                    mask: 0xFF,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(H_BANK_SELECT),
                },
                MemMapChunk {
                    start: WINDOW,
                    end: 0x2000,
                    mask: 0xFFF,
                    flags: MemFlags::ROM,
                    backing: Backing::Banked {
                        slot: 0,
                        handler: Some(H_WINDOW),
                    },
                },
            ],
            0xFFFF,
        );
        let mut m = Self::with_map(memmap, 0x4000, 1, program);
        m.ctx.mem_pointers[0] = bank(0);
        m
    }

    fn with_map(memmap: MemMap, size: usize, bank_slots: usize, program: &[(u16, &[u8])]) -> Self {
        let mut mem = vec![0xFF; size];
        for &(at, bytes) in program {
            let at = at as usize;
            mem[at..at + bytes.len()].copy_from_slice(bytes);
        }
        let mut ctx = GuestContext::new(1, bank_slots);
        ctx.target_cycle = 10_000;
        Self {
            jit: Jit::new(memmap, JitOptions::default()),
            ctx,
            bus: Ram {
                mem,
                fetches: Vec::new(),
            },
        }
    }

    fn run(&mut self, pc: u32) -> Result<Stop, JitError> {
        self.jit.run(&mut self.ctx, &mut self.bus, pc)
    }
}

#[test]
fn translating_twice_gives_the_same_code() {
    let mut m = Machine::new(&[(0x100, &[0x01, 0x2A, 0x07])]);
    let first = m.jit.translate(&m.ctx, &m.bus, 0x100).expect("translate");
    let second = m.jit.native_address(&m.ctx, &m.bus, 0x100).expect("lookup");
    assert_eq!(first, second);
    assert_eq!(m.jit.stats().blocks, 1);
}

#[test]
fn straight_line_cycles_match_prologues() {
    let mut m = Machine::new(&[(0, &[0x01, 0x10, 0x02, 0x05, 0x07])]);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 5 }));
    assert_eq!(m.ctx.regs.acc, 0x15);
    assert_eq!(m.ctx.current_cycle, 2 + 3 + 1);
}

#[test]
fn backward_branch_links_to_recorded_entry() {
    let mut m = Machine::new(&[(
        0,
        &[
            0x01, 0x03, // 0: LDI 3
            0x05, // 2: DEC
            0x04, 0x02, 0x00, // 3: JNZ 2
            0x07, // 6: HALT
        ],
    )]);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 7 }));
    assert_eq!(m.ctx.regs.acc, 0);
    // LDI + 3 * (DEC + JNZ) + 2 taken extras + HALT
    assert_eq!(m.ctx.current_cycle, 2 + 3 * (1 + 3) + 2 * 2 + 1);

    let loop_head = m.jit.lookup(&m.ctx, 2).expect("DEC translated");
    let jnz = m.jit.lookup(&m.ctx, 3).expect("JNZ translated");
    assert_eq!(m.jit.cache().slot(jnz.add(2)), Some(&HostOp::JumpIf(loop_head)));
    assert_eq!(m.jit.stats().blocks, 1);
}

#[test]
fn self_loop_translates_once() {
    let mut m = Machine::new(&[(0x40, &[0x03, 0x40, 0x00])]);
    m.ctx.target_cycle = 40;
    assert_eq!(m.run(0x40), Ok(Stop::CycleLimit { pc: 0x40 }));
    let entry = m.jit.lookup(&m.ctx, 0x40).expect("translated");
    assert_eq!(m.jit.cache().slot(entry.add(1)), Some(&HostOp::Jump(entry)));
    assert_eq!(m.jit.stats().instructions, 1);
}

#[test]
fn cycle_limit_resumes_where_it_stopped() {
    let mut m = Machine::new(&[(0, &[0x01, 0x01, 0x02, 0x01, 0x02, 0x01, 0x07])]);
    m.ctx.target_cycle = 3;
    assert_eq!(m.run(0), Ok(Stop::CycleLimit { pc: 4 }));
    assert_eq!(m.ctx.current_cycle, 5);
    assert_eq!(m.ctx.regs.acc, 2);

    m.ctx.target_cycle = 100;
    assert_eq!(m.run(0xDEAD), Ok(Stop::Halted { pc: 7 }));
    assert_eq!(m.ctx.regs.acc, 3);
    assert_eq!(m.ctx.current_cycle, 2 + 3 + 3 + 1);
}

#[test]
fn store_over_translated_code_runs_new_code() {
    let mut m = Machine::new(&[
        (0x00, &[0x01, 0x09]),             // LDI 9
        (0x02, &[0x06, 0x11, 0x00]),       // STA 0x11
        (0x05, &[0x06, 0x11, 0x00]),       // STA 0x11
        (0x08, &[0x03, 0x10, 0x00]),       // JMP 0x10
        (0x10, &[0x01, 0x01, 0x07]),       // LDI 1 ; HALT
    ]);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 0x13 }));
    assert_eq!(m.ctx.regs.acc, 9);
    let stats = m.jit.stats();
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.retranslations, 1);
    assert_eq!(stats.relocations, 0);
}

#[test]
fn external_write_invalidates_once() {
    let mut m = Machine::new(&[(0, &[0x01, 0x07, 0x07])]);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 3 }));
    assert_eq!(m.ctx.regs.acc, 7);

    m.bus.mem[1] = 0x33;
    assert!(m.jit.invalidate_write(1));
    assert!(!m.jit.invalidate_write(1));
    assert!(!m.jit.invalidate_write(0x800));
    assert_eq!(m.jit.stats().invalidations, 1);

    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 3 }));
    assert_eq!(m.ctx.regs.acc, 0x33);
}

#[test]
fn longer_replacement_is_relocated() {
    let mut m = Machine::new(&[(0, &[0x05, 0x07, 0x07])]);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 2 }));
    assert_eq!(m.ctx.regs.acc, 0xFF);

    m.bus.mem[0] = 0x01; // DEC becomes LDI 7 (the old HALT is its operand)
    m.jit.invalidate_write(0);
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 3 }));
    assert_eq!(m.ctx.regs.acc, 7);
    assert_eq!(m.jit.stats().relocations, 1);
}

#[test]
fn breakpoint_calls_debugger_without_changing_timing() {
    let program: &[(u16, &[u8])] = &[(0, &[0x01, 0x05, 0x02, 0x01, 0x07])];
    let mut plain = Machine::new(program);
    plain.run(0).expect("run");

    let hits = Rc::new(RefCell::new(Vec::new()));
    let mut m = Machine::new(program);
    let seen = Rc::clone(&hits);
    m.jit.set_debugger(Box::new(move |ctx: &mut GuestContext<Regs>, pc: u32| {
        seen.borrow_mut().push((pc, ctx.regs.acc, ctx.current_cycle));
    }));
    m.jit.translate(&m.ctx, &m.bus, 0).expect("translate");
    m.jit.insert_breakpoint(&mut m.ctx, 2);
    m.run(0).expect("run");

    assert_eq!(*hits.borrow(), vec![(2, 5, 5)]);
    assert_eq!(m.ctx.current_cycle, plain.ctx.current_cycle);
    assert_eq!(m.ctx.regs.acc, 6);

    m.jit.remove_breakpoint(&mut m.ctx, &m.bus, 2);
    let entry = m.jit.lookup(&m.ctx, 2).expect("translated");
    assert_eq!(
        m.jit.cache().slot(entry),
        Some(&HostOp::Prologue { pc: 2, cycles: 3 })
    );
}

#[test]
fn breakpoint_set_before_translation_is_emitted() {
    let mut m = Machine::new(&[(0, &[0x05, 0x07])]);
    m.jit.insert_breakpoint(&mut m.ctx, 1);
    let entry = m.jit.translate(&m.ctx, &m.bus, 0).expect("translate");
    assert_eq!(
        m.jit.cache().slot(entry.add(2)),
        Some(&HostOp::Breakpoint { pc: 1, cycles: 1 })
    );
}

#[test]
fn debugger_request_stops_before_the_next_instruction() {
    let hits = Rc::new(RefCell::new(Vec::new()));
    let mut m = Machine::new(&[(0, &[0x01, 0x05, 0x02, 0x01, 0x07])]);
    let seen = Rc::clone(&hits);
    m.jit.set_debugger(Box::new(move |ctx: &mut GuestContext<Regs>, pc: u32| {
        seen.borrow_mut().push((pc, ctx.current_cycle));
    }));
    m.ctx.target_cycle = 2;
    assert_eq!(m.run(0), Ok(Stop::CycleLimit { pc: 2 }));

    m.ctx.request_debugger();
    m.ctx.target_cycle = 100;
    assert_eq!(m.run(2), Ok(Stop::CycleLimit { pc: 2 }));
    assert_eq!(*hits.borrow(), vec![(2, 2)]);
    assert!(!m.ctx.debug_requested);
    assert_eq!(m.ctx.regs.acc, 5, "nothing ran after the request");

    m.ctx.target_cycle = 100;
    assert_eq!(m.run(2), Ok(Stop::Halted { pc: 5 }));
    assert_eq!(m.ctx.regs.acc, 6);
    assert_eq!(hits.borrow().len(), 1);
}

#[test]
fn stop_requested_from_breakpoint_returns_after_that_instruction() {
    let mut m = Machine::new(&[(0, &[0x01, 0x05, 0x02, 0x01, 0x02, 0x01, 0x07])]);
    m.jit.set_debugger(Box::new(|ctx: &mut GuestContext<Regs>, _pc: u32| {
        ctx.request_stop();
    }));
    m.jit.insert_breakpoint(&mut m.ctx, 2);
    assert_eq!(m.run(0), Ok(Stop::CycleLimit { pc: 4 }));
    assert!(m.ctx.stop_requested);
    assert_eq!(m.ctx.regs.acc, 6);
    assert_eq!(m.ctx.current_cycle, 2 + 3);
}

#[test]
fn window_fetches_go_through_the_handler() {
    let mut m = Machine::banked(&[(BANK_BASE as u16, &[0x01, 0x04, 0x02, 0x03, 0x07])]);
    assert_eq!(m.run(WINDOW), Ok(Stop::Halted { pc: WINDOW + 5 }));
    assert_eq!(m.ctx.regs.acc, 7);
    assert_eq!(m.bus.fetches, (WINDOW..WINDOW + 5).collect::<Vec<_>>());
    // Prologues plus one clock per fetched byte.
    assert_eq!(m.ctx.current_cycle, 2 + 3 + 1 + 5);

    let entry = m.jit.lookup(&m.ctx, WINDOW).expect("translated");
    assert_eq!(
        m.jit.cache().slot(entry.add(1)),
        Some(&HostOp::BankedFetch {
            handler: H_WINDOW,
            pc: WINDOW,
            bytes: 2
        })
    );
}

#[test]
fn bank_switch_takes_effect_at_the_next_instruction() {
    let mut m = Machine::banked(&[
        // Bank 0: LDI 1 ; STA select ; LDI 5 ; HALT
        (BANK_BASE as u16, &[0x01, 0x01, 0x06, 0x00, 0x08, 0x01, 0x05, 0x07]),
        // Bank 1, same offset as the LDI 5: LDI 9 ; HALT
        (BANK_BASE as u16 + 0x1005, &[0x01, 0x09, 0x07]),
    ]);
    assert_eq!(m.run(WINDOW), Ok(Stop::Halted { pc: WINDOW + 8 }));
    assert_eq!(m.ctx.regs.acc, 9);
    assert_eq!(m.ctx.mem_pointers[0], bank(1));
}

#[test]
fn illegal_opcode_is_fatal_with_diagnostic() {
    let mut m = Machine::new(&[(0, &[0x01, 0x00, 0xEE])]);
    assert_eq!(
        m.run(0),
        Err(JitError::IllegalInstruction {
            cpu: "toy",
            address: 2,
            bytes: vec![0xEE],
        })
    );
}

#[test]
fn untranslatable_instruction_is_fatal_with_diagnostic() {
    // LDI 1 ; STA 0x3000
    let mut m = Machine::new(&[(0, &[0x01, 0x01, 0x06, 0x00, 0x30])]);
    assert_eq!(
        m.run(0),
        Err(JitError::IllegalInstruction {
            cpu: "toy",
            address: 2,
            bytes: vec![0x06, 0x00, 0x30],
        })
    );
    assert_eq!(m.ctx.regs.acc, 1);
}

#[test]
fn unmapped_entry_is_fatal() {
    let mut m = Machine::new(&[]);
    assert_eq!(
        m.run(0x2000),
        Err(JitError::UnmappedAddress {
            cpu: "toy",
            address: 0x2000
        })
    );
}

#[test]
fn branch_to_unmapped_code_links_live() {
    let mut m = Machine::new(&[(0, &[0x04, 0x00, 0x20, 0x07])]);
    // Accumulator is zero, so the branch is never taken.
    assert_eq!(m.run(0), Ok(Stop::Halted { pc: 4 }));
    let entry = m.jit.lookup(&m.ctx, 0).expect("translated");
    assert_eq!(m.jit.cache().slot(entry.add(2)), Some(&HostOp::GotoIf(0x2000)));
}

#[test]
fn reset_recycles_code_memory() {
    let mut m = Machine::new(&[(0, &[0x01, 0x01, 0x07])]);
    m.run(0).expect("run");
    let allocated = m.jit.cache().arena().allocated();
    m.jit.reset(&mut m.ctx);
    assert_eq!(m.jit.lookup(&m.ctx, 0), None);
    m.run(0).expect("run again");
    assert_eq!(m.jit.cache().arena().allocated(), allocated);
}

proptest! {
    #[test]
    fn accumulator_and_cycles_follow_program(ops in prop::collection::vec((any::<bool>(), any::<u8>()), 1..64)) {
        let mut code = Vec::new();
        let mut acc = 0u8;
        let mut cycles = 1;
        for &(load, n) in &ops {
            if load {
                code.extend([0x01, n]);
                acc = n;
                cycles += 2;
            } else {
                code.extend([0x02, n]);
                acc = acc.wrapping_add(n);
                cycles += 3;
            }
        }
        code.push(0x07);
        let mut m = Machine::new(&[(0, &code)]);
        prop_assert_eq!(m.run(0), Ok(Stop::Halted { pc: code.len() as u32 }));
        prop_assert_eq!(m.ctx.regs.acc, acc);
        prop_assert_eq!(m.ctx.current_cycle, cycles);
    }
}
