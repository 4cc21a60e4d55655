//! Texas Instruments SN76489 Programmable Sound Generator.
//!
//! Three square-wave tone channels with 10-bit periods and one noise
//! channel driven by a 16-bit shift register. The chip is clocked from the
//! shared master clock through a fixed divider (240 on the Mega Drive) and
//! produces one mono sample per chip clock, downsampled to the configured
//! output rate.
//!
//! # Write protocol
//!
//! | Byte        | Meaning                                        |
//! |-------------|------------------------------------------------|
//! | `1 cc 1 vvvv` | Volume `v` (attenuation) for channel `c`     |
//! | `1 cc 0 llll` | Low 4 bits of tone period, latches channel   |
//! | `1 11 0 fnrr` | Noise: `f` white/periodic, `rr` rate         |
//! | `0 x hhhhhh`  | High 6 bits of the latched tone period       |

#![allow(clippy::cast_precision_loss)]

use emu_core::{CYCLE_NEVER, Cycle, Observable, Peripheral, Value};
use serde::{Deserialize, Serialize};

/// Attenuation table in 2 dB steps, normalised to 0.0-1.0. Index 15 is off.
const VOLUME_TABLE: [f32; 16] = [
    1.0000, 0.7943, 0.6310, 0.5012,
    0.3981, 0.3162, 0.2512, 0.2004,
    0.1585, 0.1259, 0.1000, 0.0794,
    0.0631, 0.0501, 0.0398, 0.0000,
];

const NOISE_CHANNEL: usize = 3;
const LFSR_RESET: u16 = 0x8000;
/// Tap for white noise.
const WHITE_NOISE_TAP: u16 = 0x40;

/// SN76489 PSG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sn76489 {
    counter_load: [u16; 4],
    counters: [u16; 4],
    output_state: [bool; 4],
    /// Attenuation per channel, 0 loudest and 15 silent.
    volume: [u8; 4],
    lfsr: u16,
    noise_out: bool,
    white_noise: bool,
    /// Noise rate follows tone channel 2.
    noise_use_tone: bool,
    /// Register selected by the last latch byte (`value & 0x70`).
    latch: u8,
    cycles: Cycle,
    /// Master clocks per chip clock.
    clock_divider: u32,

    // Downsampling state
    #[serde(skip)]
    accumulator: f32,
    #[serde(skip)]
    sample_count: u32,
    ticks_per_sample: f32,
    #[serde(skip)]
    buffer: Vec<f32>,
}

impl Sn76489 {
    /// `master_clock` in Hz, `clock_divider` master clocks per chip clock,
    /// `sample_rate` of the output buffer.
    #[must_use]
    pub fn new(master_clock: u32, clock_divider: u32, sample_rate: u32) -> Self {
        let chip_clock = master_clock as f32 / clock_divider as f32;
        Self {
            counter_load: [0; 4],
            counters: [0; 4],
            output_state: [false; 4],
            volume: [0xF; 4],
            lfsr: LFSR_RESET,
            noise_out: false,
            white_noise: false,
            noise_use_tone: false,
            latch: 0,
            cycles: 0,
            clock_divider,
            accumulator: 0.0,
            sample_count: 0,
            ticks_per_sample: chip_clock / sample_rate as f32,
            buffer: Vec::with_capacity(sample_rate as usize / 50 + 1),
        }
    }

    /// Write one byte to the chip.
    pub fn write(&mut self, value: u8) {
        if value & 0x80 != 0 {
            self.latch = value & 0x70;
            let channel = usize::from(value >> 5 & 0x3);
            if value & 0x10 != 0 {
                self.volume[channel] = value & 0xF;
            } else if channel == NOISE_CHANNEL {
                match value & 0x3 {
                    3 => {
                        self.counter_load[NOISE_CHANNEL] = self.counter_load[2];
                        self.noise_use_tone = true;
                    }
                    rate => {
                        self.counter_load[NOISE_CHANNEL] = 0x10 << rate;
                        self.noise_use_tone = false;
                    }
                }
                self.white_noise = value & 0x4 != 0;
                self.lfsr = LFSR_RESET;
                log::trace!(
                    "psg: noise {} rate {}",
                    if self.white_noise { "white" } else { "periodic" },
                    value & 0x3
                );
            } else {
                self.counter_load[channel] =
                    (self.counter_load[channel] & 0x3F0) | u16::from(value & 0xF);
                self.follow_tone_2(channel);
            }
        } else if self.latch & 0x10 == 0 {
            let channel = usize::from(self.latch >> 5 & 0x3);
            if channel != NOISE_CHANNEL {
                self.counter_load[channel] =
                    (u16::from(value) << 4 & 0x3F0) | (self.counter_load[channel] & 0xF);
                self.follow_tone_2(channel);
            }
        }
    }

    fn follow_tone_2(&mut self, channel: usize) {
        if channel == 2 && self.noise_use_tone {
            self.counter_load[NOISE_CHANNEL] = self.counter_load[2];
        }
    }

    /// Tone period of channel 0-2, or the noise reload value for channel 3.
    #[must_use]
    pub const fn period(&self, channel: usize) -> u16 {
        self.counter_load[channel]
    }

    #[must_use]
    pub const fn attenuation(&self, channel: usize) -> u8 {
        self.volume[channel]
    }

    /// Advance the chip by one chip clock.
    fn clock(&mut self) {
        for i in 0..4 {
            if self.counters[i] > 0 {
                self.counters[i] -= 1;
            }
            if self.counters[i] == 0 {
                self.counters[i] = self.counter_load[i];
                self.output_state[i] = !self.output_state[i];
                if i == NOISE_CHANNEL && self.output_state[i] {
                    self.shift_noise();
                }
            }
        }

        self.accumulator += self.mix();
        self.sample_count += 1;
        if self.sample_count as f32 >= self.ticks_per_sample {
            self.buffer.push(self.accumulator / self.sample_count as f32);
            self.accumulator = 0.0;
            self.sample_count = 0;
        }
    }

    fn shift_noise(&mut self) {
        self.noise_out = self.lfsr & 1 != 0;
        self.lfsr = self.lfsr.rotate_right(1);
        if self.white_noise && self.lfsr & WHITE_NOISE_TAP != 0 {
            self.lfsr ^= LFSR_RESET;
        }
    }

    fn mix(&self) -> f32 {
        let mut sum = 0.0;
        for ch in 0..3 {
            if self.output_state[ch] {
                sum += VOLUME_TABLE[usize::from(self.volume[ch])];
            }
        }
        if self.noise_out {
            sum += VOLUME_TABLE[usize::from(self.volume[NOISE_CHANNEL])];
        }
        sum / 4.0
    }

    /// Take the audio output buffer (drains it).
    pub fn take_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }

    /// Number of samples in the output buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Peripheral for Sn76489 {
    fn run_to(&mut self, cycle: Cycle) {
        while self.cycles < cycle {
            self.clock();
            self.cycles += self.clock_divider;
        }
    }

    fn current_cycle(&self) -> Cycle {
        self.cycles
    }

    fn next_event_cycle(&self) -> Cycle {
        CYCLE_NEVER
    }

    fn adjust_cycles(&mut self, deduction: Cycle) {
        self.cycles = self.cycles.saturating_sub(deduction);
    }
}

const QUERY_PATHS: &[&str] = &[
    "cycle", "tone0", "tone1", "tone2", "noise", "vol0", "vol1", "vol2", "vol3", "lfsr",
];

impl Observable for Sn76489 {
    fn query(&self, path: &str) -> Option<Value> {
        Some(match path {
            "cycle" => self.cycles.into(),
            "tone0" => self.counter_load[0].into(),
            "tone1" => self.counter_load[1].into(),
            "tone2" => self.counter_load[2].into(),
            "noise" => self.counter_load[3].into(),
            "vol0" => self.volume[0].into(),
            "vol1" => self.volume[1].into(),
            "vol2" => self.volume[2].into(),
            "vol3" => self.volume[3].into(),
            "lfsr" => self.lfsr.into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// NTSC Mega Drive master clock.
    const MCLK: u32 = 53_693_175;
    const DIVIDER: u32 = 240;
    const SAMPLE_RATE: u32 = 48_000;

    fn psg() -> Sn76489 {
        Sn76489::new(MCLK, DIVIDER, SAMPLE_RATE)
    }

    #[test]
    fn silent_at_power_on() {
        let mut psg = psg();
        psg.run_to(DIVIDER * 10_000);
        let buf = psg.take_buffer();
        assert!(!buf.is_empty(), "Should produce samples even when silent");
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn latch_then_data_sets_ten_bit_period() {
        let mut psg = psg();
        psg.write(0x80 | 0x0E); // channel 0, low nibble E
        psg.write(0x3F); // high six bits
        assert_eq!(psg.period(0), 0x3FE);
        psg.write(0xA0 | 0x01); // channel 1, low nibble
        psg.write(0x02);
        assert_eq!(psg.period(1), 0x021);
        assert_eq!(psg.period(0), 0x3FE);
    }

    #[test]
    fn data_byte_after_volume_latch_is_ignored() {
        let mut psg = psg();
        psg.write(0x90 | 0x03);
        psg.write(0x15);
        assert_eq!(psg.attenuation(0), 3);
        assert_eq!(psg.period(0), 0);
    }

    #[test]
    fn tone_produces_waveform() {
        let mut psg = psg();
        psg.write(0x80 | 0x0F);
        psg.write(0x0F);
        psg.write(0x90); // full volume
        psg.run_to(DIVIDER * 50_000);
        let buf = psg.take_buffer();
        assert!(buf.len() > 100, "Expected many samples");
        assert!(buf.iter().any(|&s| s > 0.2));
        assert!(buf.iter().any(|&s| s < 0.05));
    }

    #[test]
    fn noise_rate_three_follows_tone_two() {
        let mut psg = psg();
        psg.write(0xE3);
        psg.write(0xC0 | 0x05);
        psg.write(0x01);
        assert_eq!(psg.period(3), 0x015);
        psg.write(0xE1);
        assert_eq!(psg.period(3), 0x20);
    }

    #[test]
    fn white_noise_shifts_register() {
        let mut psg = psg();
        psg.write(0xE4); // white, rate 0
        psg.write(0xF0);
        psg.run_to(DIVIDER * 5_000);
        assert_ne!(psg.lfsr, LFSR_RESET);
        assert!(psg.take_buffer().iter().any(|&s| s > 0.0));
    }

    #[test]
    fn clock_runs_in_divider_steps() {
        let mut psg = psg();
        psg.run_to(1);
        assert_eq!(psg.current_cycle(), DIVIDER);
        psg.adjust_cycles(100);
        assert_eq!(psg.current_cycle(), DIVIDER - 100);
    }

    #[test]
    fn take_buffer_drains() {
        let mut psg = psg();
        psg.run_to(DIVIDER * 1_000);
        assert!(psg.buffer_len() > 0);
        let _ = psg.take_buffer();
        assert_eq!(psg.buffer_len(), 0);
    }
}
