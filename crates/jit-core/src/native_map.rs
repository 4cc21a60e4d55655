//! Guest address to translated code map.
//!
//! One map covers one guest region (a fixed RAM/ROM chunk, or one bank of a
//! paged window). Entries are kept per guest unit: bytes for an 8-bit
//! guest, 16-bit words for a 16-bit one. Pages of entries are only
//! allocated once something in them is translated.

use crate::code::CodePtr;

/// Units per lazily allocated page of entries.
const PAGE_UNITS: usize = 1024;

/// State of one guest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeEntry {
    #[default]
    Untranslated,
    /// Covered by an instruction that starts at a lower address.
    MidInstruction,
    /// First unit of a translated instruction.
    At {
        ptr: CodePtr,
        guest_len: u8,
        native_len: u16,
    },
}

/// Native address map for one guest region.
#[derive(Debug, Clone)]
pub struct NativeAddressMap {
    pages: Vec<Option<Box<[NativeEntry]>>>,
    unit_shift: u32,
    units: usize,
}

impl NativeAddressMap {
    /// Map covering `size` guest bytes with `1 << unit_shift` bytes per unit.
    #[must_use]
    pub fn new(size: usize, unit_shift: u32) -> Self {
        let units = size >> unit_shift;
        Self {
            pages: vec![None; units.div_ceil(PAGE_UNITS)],
            unit_shift,
            units,
        }
    }

    fn unit(&self, offset: u32) -> Option<usize> {
        let unit = (offset >> self.unit_shift) as usize;
        (unit < self.units).then_some(unit)
    }

    fn get(&self, unit: usize) -> NativeEntry {
        self.pages[unit / PAGE_UNITS]
            .as_ref()
            .map_or(NativeEntry::Untranslated, |page| page[unit % PAGE_UNITS])
    }

    fn set(&mut self, unit: usize, entry: NativeEntry) {
        let page = self.pages[unit / PAGE_UNITS]
            .get_or_insert_with(|| vec![NativeEntry::Untranslated; PAGE_UNITS].into_boxed_slice());
        page[unit % PAGE_UNITS] = entry;
    }

    /// Raw entry for the unit containing `offset`.
    #[must_use]
    pub fn entry(&self, offset: u32) -> NativeEntry {
        self.unit(offset)
            .map_or(NativeEntry::Untranslated, |u| self.get(u))
    }

    /// Translated code for an instruction starting exactly at `offset`.
    #[must_use]
    pub fn lookup(&self, offset: u32) -> Option<CodePtr> {
        match self.entry(offset) {
            NativeEntry::At { ptr, .. } => Some(ptr),
            _ => None,
        }
    }

    /// Record a translated instruction of `guest_len` bytes starting at `offset`.
    ///
    /// The first unit gets the native pointer and every further unit the
    /// instruction spans is marked [`NativeEntry::MidInstruction`]. Units
    /// left over from a longer previous translation at the same address are
    /// cleared.
    pub fn record(&mut self, offset: u32, ptr: CodePtr, guest_len: u8, native_len: u16) {
        let Some(first) = self.unit(offset) else {
            return;
        };
        let span = (usize::from(guest_len) >> self.unit_shift).max(1);
        self.set(
            first,
            NativeEntry::At {
                ptr,
                guest_len,
                native_len,
            },
        );
        for unit in first + 1..(first + span).min(self.units) {
            self.set(unit, NativeEntry::MidInstruction);
        }
        let mut unit = first + span;
        while unit < self.units && self.get(unit) == NativeEntry::MidInstruction {
            self.set(unit, NativeEntry::Untranslated);
            unit += 1;
        }
    }

    /// Offset of the instruction covering `offset`, walking back over
    /// [`NativeEntry::MidInstruction`] units.
    ///
    /// Returns `None` if no translated instruction covers the address.
    #[must_use]
    pub fn instruction_start(&self, offset: u32) -> Option<u32> {
        let mut unit = self.unit(offset)?;
        loop {
            match self.get(unit) {
                NativeEntry::At { .. } => return Some((unit as u32) << self.unit_shift),
                NativeEntry::Untranslated => return None,
                NativeEntry::MidInstruction => unit = unit.checked_sub(1)?,
            }
        }
    }

    /// Offsets and code of every instruction starting in `start..end`.
    #[must_use]
    pub fn instruction_starts(&self, start: u32, end: u32) -> Vec<(u32, CodePtr)> {
        let first = (start >> self.unit_shift) as usize;
        let last = ((end >> self.unit_shift) as usize).min(self.units);
        (first..last)
            .filter(|&unit| self.pages[unit / PAGE_UNITS].is_some())
            .filter_map(|unit| match self.get(unit) {
                NativeEntry::At { ptr, .. } => Some(((unit as u32) << self.unit_shift, ptr)),
                _ => None,
            })
            .collect()
    }

    /// Drop every entry and release the entry pages.
    pub fn clear(&mut self) {
        self.pages.iter_mut().for_each(|p| *p = None);
    }

    /// Number of translated instruction starts.
    #[must_use]
    pub fn translated_count(&self) -> usize {
        self.pages
            .iter()
            .flatten()
            .flat_map(|page| page.iter())
            .filter(|e| matches!(e, NativeEntry::At { .. }))
            .count()
    }
}
