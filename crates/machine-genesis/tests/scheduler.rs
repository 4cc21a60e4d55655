//! Scheduler clock invariants.

mod common;

use common::*;
use emu_core::{Cycle, Peripheral};
use machine_genesis::{Genesis, GenesisConfig};
use proptest::prelude::*;

/// Z80: `loop: ld a,(0x1000); inc a; ld (0x1000),a; jr loop`
const Z80_COUNTER: [u8; 9] = [0x3A, 0x00, 0x10, 0x3C, 0x32, 0x00, 0x10, 0x18, 0xF7];

fn busy_machine(sync_interval: Cycle) -> Genesis {
    let main = program(&[
        &move_w(0x8164, VDP_CTRL),
        &move_w(0x100, Z80_RESET),
        &set_sr(0x2000),
        &inc_w(WORK_RAM + 4),
        &[0x60F8],
    ]);
    let vint = program(&[&inc_w(WORK_RAM), &[RTE]]);
    let mut config = GenesisConfig::new(rom(&main, &vint, &[]));
    config.sync_interval = sync_interval;
    let mut genesis = Genesis::new(config).expect("valid test cartridge");
    genesis.poke_z80_ram(0, &Z80_COUNTER);
    genesis
}

fn clocks(genesis: &Genesis) -> [Cycle; 5] {
    [
        genesis.m68k().current_cycle(),
        genesis.z80().current_cycle(),
        genesis.vdp().current_cycle(),
        genesis.psg().current_cycle(),
        genesis.ym().current_cycle(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn clocks_monotonic_and_within_one_quantum(
        sync_interval in 1_000u32..8_000,
        steps in prop::collection::vec(1u32..40_000, 1..12),
    ) {
        let mut genesis = busy_machine(sync_interval);
        let mut last = clocks(&genesis);
        for step in steps {
            genesis.run_cycles(step).expect("run");
            let now = clocks(&genesis);
            for (before, after) in last.iter().zip(&now) {
                prop_assert!(after >= before, "clock went back: {last:?} -> {now:?}");
            }
            let lo = now.iter().min().copied().unwrap_or_default();
            let hi = now.iter().max().copied().unwrap_or_default();
            prop_assert!(hi - lo <= sync_interval, "spread {} over {sync_interval}: {now:?}", hi - lo);
            last = now;
        }
    }
}

#[test]
fn run_cycles_reaches_stop() {
    let mut genesis = busy_machine(machine_genesis::config::DEFAULT_SYNC_INTERVAL);
    let start = genesis.m68k().current_cycle();
    genesis.run_cycles(50_000).expect("run");
    let end = genesis.m68k().current_cycle();
    assert!(end >= start + 50_000);
    // At most one 68K instruction past the stop.
    assert!(end < start + 50_000 + 200 * 7);
}

#[test]
fn both_cpus_make_progress() {
    let mut genesis = busy_machine(machine_genesis::config::DEFAULT_SYNC_INTERVAL);
    genesis.run_frame().expect("frame");
    genesis.run_frame().expect("frame");
    assert!(word_at(genesis.work_ram(), 4) > 1000, "68K main loop ran");
    assert!(genesis.z80().stats().instructions > 0, "Z80 code translated");
    assert!(genesis.z80().regs().pc < 9, "Z80 still in its loop");
    assert_eq!(word_at(genesis.work_ram(), 0), 2, "one V-int per frame");
}

#[test]
fn frames_are_one_frame_apart() {
    let mut genesis = busy_machine(machine_genesis::config::DEFAULT_SYNC_INTERVAL);
    genesis.run_frame().expect("frame");
    let first = genesis.vdp().frame();
    let at = genesis.vdp().current_cycle();
    genesis.run_frame().expect("frame");
    assert_eq!(genesis.vdp().frame(), first + 1);
    let elapsed = genesis.vdp().current_cycle() - at;
    let frame = genesis.region().frame_cycles();
    assert!(elapsed.abs_diff(frame) < sega_vdp::MCLKS_LINE, "{elapsed} vs {frame}");
}
