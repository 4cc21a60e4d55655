use emu_core::{CYCLE_NEVER, Peripheral};
use proptest::prelude::*;
use rstest::rstest;
use sega_vdp::{LINES_NTSC, LINES_PAL, MCLKS_LINE, Vdp};

#[rstest]
#[case(false, LINES_NTSC)]
#[case(true, LINES_PAL)]
fn frame_end_matches_line_count(#[case] pal: bool, #[case] lines: u16) {
    let vdp = Vdp::new(pal);
    assert_eq!(vdp.frame_end(), u32::from(lines) * MCLKS_LINE);
    assert_eq!(vdp.status() & 1, u16::from(pal));
}

#[rstest]
#[case(0, 0xFF)]
#[case(1, 0x00)]
#[case(100, 0x63)]
#[case(0xEB, 0xEA)]
#[case(0xEC, 0xE5)]
fn v_counter_values(#[case] line: u16, #[case] expected: u8) {
    assert_eq!(sega_vdp::v_counter(line), expected);
}

#[test]
fn vint_moves_to_the_next_frame_only_after_the_frame_ends() {
    let mut vdp = Vdp::new(false);
    vdp.write_control(0x8160);
    vdp.run_to(1);
    let first = vdp.next_vint();
    vdp.run_to(first + 1);
    vdp.acknowledge(6);
    assert_eq!(vdp.next_vint(), CYCLE_NEVER);
    let end = vdp.frame_end();
    vdp.run_to(end);
    assert!(vdp.take_frame_done());
    assert_eq!(vdp.next_vint(), end + first);
}

proptest! {
    #[test]
    fn clock_and_beam_agree(steps in prop::collection::vec(1u32..20_000, 1..40)) {
        let mut vdp = Vdp::new(false);
        let mut target = 0;
        let mut last = 0;
        for step in steps {
            target += step;
            vdp.run_to(target);
            prop_assert!(vdp.current_cycle() >= target);
            prop_assert!(vdp.current_cycle() >= last);
            last = vdp.current_cycle();
            let frame_len = u32::from(LINES_NTSC) * MCLKS_LINE;
            let pos = vdp.current_cycle() % frame_len;
            prop_assert_eq!(u32::from(vdp.line()), pos / MCLKS_LINE);
            prop_assert_eq!(vdp.frame(), vdp.current_cycle() / frame_len);
        }
    }

    #[test]
    fn next_event_is_never_in_the_past(target in 0u32..2_000_000, mode2 in prop::sample::select(vec![0x00u8, 0x20, 0x60])) {
        let mut vdp = Vdp::new(false);
        vdp.write_control(0x8000 | 0x10);
        vdp.write_control(0x8100 | u16::from(mode2));
        vdp.write_control(0x8A05);
        vdp.run_to(target);
        let next = vdp.next_event_cycle();
        prop_assert!(next == CYCLE_NEVER || next >= vdp.current_cycle());
    }
}
