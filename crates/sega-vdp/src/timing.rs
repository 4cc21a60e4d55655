//! Beam timing: line length, slot widths and counter encodings.

/// Master clocks per scanline in both horizontal modes.
pub const MCLKS_LINE: u32 = 3420;

pub const MCLKS_SLOT_H40: u32 = 16;
pub const MCLKS_SLOT_H32: u32 = 20;

pub const LINES_NTSC: u16 = 262;
pub const LINES_PAL: u16 = 313;

pub const ACTIVE_LINES_V28: u16 = 224;
pub const ACTIVE_LINES_V30: u16 = 240;

/// Slot of the vertical interrupt on the first blanking line.
const VINT_SLOT_H40: u32 = 47;
const VINT_SLOT_H32: u32 = 60;

/// Line cycle at which the horizontal blank flag drops.
const HBLANK_END_H40: u32 = (148 + 61) * 4;
const HBLANK_END_H32: u32 = 46 * 5;

/// During active display only every Nth slot is free for port traffic.
const ACCESS_EVERY_H40: u32 = 12;
const ACCESS_EVERY_H32: u32 = 11;

/// Slots used for DRAM refresh during blanking.
const REFRESH_EVERY: u32 = 32;

#[must_use]
pub const fn slot_len(h40: bool) -> u32 {
    if h40 { MCLKS_SLOT_H40 } else { MCLKS_SLOT_H32 }
}

/// Line cycle of the vertical interrupt.
#[must_use]
pub const fn vint_linecyc(h40: bool) -> u32 {
    if h40 {
        VINT_SLOT_H40 * MCLKS_SLOT_H40
    } else {
        VINT_SLOT_H32 * MCLKS_SLOT_H32
    }
}

#[must_use]
pub const fn in_hblank(h40: bool, linecyc: u32) -> bool {
    linecyc < if h40 { HBLANK_END_H40 } else { HBLANK_END_H32 }
}

/// Whether the slot starting at `linecyc` can serve the FIFO or DMA.
#[must_use]
pub const fn is_access_slot(h40: bool, active: bool, linecyc: u32) -> bool {
    let slot = linecyc / slot_len(h40);
    if active {
        slot % if h40 { ACCESS_EVERY_H40 } else { ACCESS_EVERY_H32 } == 0
    } else {
        slot % REFRESH_EVERY != REFRESH_EVERY - 1
    }
}

/// V counter as the HV port reports it.
#[must_use]
pub const fn v_counter(line: u16) -> u8 {
    if line == 0 {
        return 0xFF;
    }
    let line = line - 1;
    if line > 0xEA {
        ((line + 0xFA) & 0xFF) as u8
    } else {
        line as u8
    }
}

/// H counter as the HV port reports it.
#[must_use]
pub const fn h_counter(h40: bool, linecyc: u32) -> u8 {
    let h = if h40 {
        let h = linecyc / 8;
        let h = if h >= 86 { h - 86 } else { h + 334 };
        if h > 0x16C { h + 92 } else { h }
    } else {
        let h = linecyc / 10;
        let h = if h >= 74 { h - 74 } else { h + 268 };
        if h > 0x127 { h + 170 } else { h }
    };
    (h & 0xFF) as u8
}
