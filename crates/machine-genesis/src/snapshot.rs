//! Savestates.
//!
//! A snapshot holds architectural state only: registers, cycle counters,
//! RAM and chip state. Translated code is never saved. Restoring compares
//! each RAM against the snapshot and invalidates translations over the
//! bytes that differ, so the cache rebuilds lazily from the restored memory.

use motorola_68000::M68kSnapshot;
use sega_vdp::VdpSnapshot;
use serde::{Deserialize, Serialize};
use ti_sn76489::Sn76489;
use yamaha_ym2612::Ym2612;
use zilog_z80::Z80Snapshot;

use crate::Genesis;
use crate::error::MachineError;
use crate::io::IoPorts;
use crate::memory::{BANK_SLOT, WORK_RAM_CHUNK, WORK_RAM_SIZE, Z80_RAM_CHUNK, Z80_RAM_SIZE};

/// Longest 68K instruction, in bytes.
const M68K_MAX_INSN: u32 = 10;
/// Longest Z80 instruction, in bytes.
const Z80_MAX_INSN: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub m68k: M68kSnapshot,
    pub z80: Z80Snapshot,
    pub vdp: VdpSnapshot,
    pub psg: Sn76489,
    pub ym: Ym2612,
    pub io: IoPorts,
    pub work_ram: Vec<u8>,
    pub z80_ram: Vec<u8>,
    pub bank: u16,
    pub busreq: bool,
    pub z80_reset: bool,
    pub refresh_counter: u32,
    pub last_sync: u32,
    pub frame: u32,
    pub z80_int_frame: Option<u32>,
}

/// Half-open byte ranges where `a` and `b` differ.
fn changed_ranges(a: &[u8], b: &[u8]) -> Vec<(u32, u32)> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        match (x != y, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                ranges.push((s as u32, i as u32));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push((s as u32, a.len().min(b.len()) as u32));
    }
    ranges
}

fn check_len(what: &'static str, found: usize, expected: usize) -> Result<(), MachineError> {
    if found == expected {
        Ok(())
    } else {
        Err(MachineError::SnapshotMismatch {
            what,
            found,
            expected,
        })
    }
}

impl Genesis {
    #[must_use]
    pub fn snapshot(&self) -> MachineSnapshot {
        let bus = &self.bus;
        MachineSnapshot {
            m68k: self.m68k.snapshot(),
            z80: bus.z80.snapshot(),
            vdp: bus.hw.vdp.snapshot(),
            psg: bus.hw.psg.clone(),
            ym: bus.hw.ym.clone(),
            io: bus.hw.io.clone(),
            work_ram: bus.hw.mem.work_ram.clone(),
            z80_ram: bus.hw.mem.z80_ram.clone(),
            bank: bus.hw.bank,
            busreq: bus.busreq,
            z80_reset: bus.z80_reset,
            refresh_counter: bus.refresh_counter,
            last_sync: bus.last_sync,
            frame: bus.frame,
            z80_int_frame: bus.z80_int_frame,
        }
    }

    /// Load `snapshot` into this machine. The cartridge is not part of the
    /// snapshot; it must be the one the snapshot was taken with.
    pub fn restore(&mut self, snapshot: &MachineSnapshot) -> Result<(), MachineError> {
        check_len("work RAM", snapshot.work_ram.len(), WORK_RAM_SIZE)?;
        check_len("Z80 RAM", snapshot.z80_ram.len(), Z80_RAM_SIZE)?;

        // An instruction starting just before a changed byte may cover it.
        let mut invalidated = 0;
        for (start, end) in changed_ranges(&self.bus.hw.mem.work_ram, &snapshot.work_ram) {
            let start = start.saturating_sub(M68K_MAX_INSN - 1);
            invalidated += self.m68k.invalidate_range(WORK_RAM_CHUNK, start, end);
        }
        for (start, end) in changed_ranges(&self.bus.hw.mem.z80_ram, &snapshot.z80_ram) {
            let start = start.saturating_sub(Z80_MAX_INSN - 1);
            invalidated += self.bus.z80.invalidate_range(Z80_RAM_CHUNK, start, end);
        }
        log::debug!("snapshot restore: {invalidated} translations invalidated");

        let bus = &mut self.bus;
        bus.hw.mem.work_ram.copy_from_slice(&snapshot.work_ram);
        bus.hw.mem.z80_ram.copy_from_slice(&snapshot.z80_ram);
        bus.hw.vdp.restore(&snapshot.vdp);
        bus.hw.psg = snapshot.psg.clone();
        bus.hw.ym = snapshot.ym.clone();
        bus.hw.io = snapshot.io.clone();
        bus.hw.bank = snapshot.bank;
        bus.busreq = snapshot.busreq;
        bus.z80_reset = snapshot.z80_reset;
        bus.refresh_counter = snapshot.refresh_counter;
        bus.last_sync = snapshot.last_sync;
        bus.frame = snapshot.frame;
        bus.z80_int_frame = snapshot.z80_int_frame;
        bus.return_requested = false;
        bus.dirty.clear();
        bus.fault = None;

        bus.z80.restore(&snapshot.z80);
        bus.z80.ctx.mem_pointers[BANK_SLOT] = bus.hw.mem.bank_view(bus.hw.bank);
        self.m68k.restore(&snapshot.m68k);
        self.bus.adjust_int_cycle(&mut self.m68k.ctx);
        Ok(())
    }
}
