//! Static per-session memory map.
//!
//! The machine describes its address space once, as a list of chunks. The
//! translator resolves statically known addresses against it at translation
//! time; everything else is resolved against it at run time.

/// Index of a flat buffer owned by the machine (see [`GuestBus::buffer`](crate::GuestBus::buffer)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u16);

/// Index of a side-effecting handler pair owned by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u16);

/// Access permissions of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemFlags(u8);

impl MemFlags {
    pub const READ: Self = Self(0b001);
    pub const WRITE: Self = Self(0b010);
    /// Instructions may be fetched (and translated) from here.
    pub const CODE: Self = Self(0b100);
    pub const RW: Self = Self(0b011);
    pub const ROM: Self = Self(0b101);
    pub const RAM: Self = Self(0b111);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// What sits behind a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Plain memory: `buffer[offset + (address & mask)]`.
    Flat { buffer: BufferId, offset: u32 },
    /// A window whose backing buffer is selected at run time through
    /// `mem_pointers[slot]`. Data accesses go through `handler` when one is
    /// given (the window has side effects such as bus stalls); instruction
    /// fetches always use the current view.
    Banked {
        slot: usize,
        handler: Option<HandlerId>,
    },
    /// Every access goes through a handler.
    Dispatch(HandlerId),
}

/// One contiguous address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemMapChunk {
    pub start: u32,
    /// Exclusive.
    pub end: u32,
    pub mask: u32,
    pub flags: MemFlags,
    pub backing: Backing,
}

impl MemMapChunk {
    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }

    /// Guest bytes one native address map for this chunk has to cover.
    #[must_use]
    pub fn code_span(&self) -> usize {
        let window = (self.end - self.start) as usize;
        window.min(self.mask as usize + 1)
    }
}

/// A selectable view for a [`Backing::Banked`] chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankView {
    pub buffer: BufferId,
    /// Byte offset of the window start inside `buffer`.
    pub base: u32,
    /// Identifies the selected bank; each id gets its own address map.
    pub id: u32,
}

/// Resolution of a statically known address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Direct buffer access. `code` names the chunk when writes here must
    /// be checked for self-modifying code.
    Flat {
        buffer: BufferId,
        index: u32,
        writable: bool,
        code: Option<u16>,
    },
    /// Banked window; resolved again at run time against the current view.
    Banked {
        slot: usize,
        index: u32,
        handler: Option<HandlerId>,
    },
    Handler(HandlerId),
    Unmapped,
}

/// Where translated code for an address is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapKey {
    pub chunk: u16,
    pub bank: Option<u32>,
}

/// Code location of a guest address: map, offset inside it, and where the
/// instruction bytes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLocation {
    pub key: MapKey,
    pub offset: u32,
    pub buffer: BufferId,
    pub index: u32,
    /// Transfers into this location must use a live lookup.
    pub banked: bool,
}

/// The chunk table for one guest CPU.
#[derive(Debug, Clone, Default)]
pub struct MemMap {
    chunks: Vec<MemMapChunk>,
    address_mask: u32,
}

impl MemMap {
    #[must_use]
    pub fn new(chunks: Vec<MemMapChunk>, address_mask: u32) -> Self {
        Self {
            chunks,
            address_mask,
        }
    }

    #[must_use]
    pub fn chunks(&self) -> &[MemMapChunk] {
        &self.chunks
    }

    #[must_use]
    pub const fn address_mask(&self) -> u32 {
        self.address_mask
    }

    /// The chunk containing `address`, with its index.
    #[must_use]
    pub fn find(&self, address: u32) -> Option<(usize, &MemMapChunk)> {
        let address = address & self.address_mask;
        self.chunks
            .iter()
            .enumerate()
            .find(|(_, c)| c.contains(address))
    }

    /// Resolve an address for a data access.
    #[must_use]
    pub fn resolve(&self, address: u32) -> Access {
        let address = address & self.address_mask;
        let Some((idx, chunk)) = self.find(address) else {
            return Access::Unmapped;
        };
        match chunk.backing {
            Backing::Flat { buffer, offset } => Access::Flat {
                buffer,
                index: offset + (address & chunk.mask),
                writable: chunk.flags.contains(MemFlags::WRITE),
                code: (chunk.flags.contains(MemFlags::CODE | MemFlags::WRITE))
                    .then_some(idx as u16),
            },
            Backing::Banked { slot, handler } => Access::Banked {
                slot,
                index: address & chunk.mask,
                handler,
            },
            Backing::Dispatch(handler) => Access::Handler(handler),
        }
    }

    /// Locate the instruction bytes and address-map slot for `address`.
    ///
    /// Returns `None` for unmapped, non-executable, or unbacked addresses.
    #[must_use]
    pub fn code_location(&self, address: u32, views: &[Option<BankView>]) -> Option<CodeLocation> {
        let address = address & self.address_mask;
        let (idx, chunk) = self.find(address)?;
        if !chunk.flags.contains(MemFlags::CODE) {
            return None;
        }
        let offset = address & chunk.mask;
        match chunk.backing {
            Backing::Flat { buffer, offset: base } => Some(CodeLocation {
                key: MapKey {
                    chunk: idx as u16,
                    bank: None,
                },
                offset,
                buffer,
                index: base + offset,
                banked: false,
            }),
            Backing::Banked { slot, .. } => {
                let view = (*views.get(slot)?)?;
                Some(CodeLocation {
                    key: MapKey {
                        chunk: idx as u16,
                        bank: Some(view.id),
                    },
                    offset,
                    buffer: view.buffer,
                    index: view.base + offset,
                    banked: true,
                })
            }
            Backing::Dispatch(_) => None,
        }
    }

    /// Handler instruction fetches from `address` go through, for banked
    /// windows that have one.
    #[must_use]
    pub fn fetch_handler(&self, address: u32) -> Option<HandlerId> {
        match self.find(address)?.1.backing {
            Backing::Banked { handler, .. } => handler,
            _ => None,
        }
    }

    /// Whether transfers to `address` have to use a live lookup.
    #[must_use]
    pub fn is_banked(&self, address: u32) -> bool {
        self.find(address)
            .is_some_and(|(_, c)| matches!(c.backing, Backing::Banked { .. }))
    }
}

impl MemFlags {
    /// Combine with `|` in chunk tables.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for MemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z80_like() -> MemMap {
        MemMap::new(
            vec![
                MemMapChunk {
                    start: 0x0000,
                    end: 0x4000,
                    mask: 0x1FFF,
                    flags: MemFlags::RAM,
                    backing: Backing::Flat {
                        buffer: BufferId(0),
                        offset: 0,
                    },
                },
                MemMapChunk {
                    start: 0x4000,
                    end: 0x6000,
                    mask: 0x3,
                    flags: MemFlags::RW,
                    backing: Backing::Dispatch(HandlerId(1)),
                },
                MemMapChunk {
                    start: 0x8000,
                    end: 0x1_0000,
                    mask: 0x7FFF,
                    flags: MemFlags::RAM,
                    backing: Backing::Banked {
                        slot: 0,
                        handler: Some(HandlerId(2)),
                    },
                },
            ],
            0xFFFF,
        )
    }

    #[test]
    fn flat_ram_is_mirrored_by_mask() {
        let map = z80_like();
        assert_eq!(
            map.resolve(0x2005),
            Access::Flat {
                buffer: BufferId(0),
                index: 5,
                writable: true,
                code: Some(0)
            }
        );
    }

    #[test]
    fn handlers_and_holes() {
        let map = z80_like();
        assert_eq!(map.resolve(0x4001), Access::Handler(HandlerId(1)));
        assert_eq!(map.resolve(0x7000), Access::Unmapped);
        assert!(map.code_location(0x4001, &[]).is_none());
    }

    #[test]
    fn banked_code_needs_a_view() {
        let map = z80_like();
        assert!(map.code_location(0x8010, &[None]).is_none());
        let view = BankView {
            buffer: BufferId(3),
            base: 0x18000,
            id: 3,
        };
        let loc = map.code_location(0x8010, &[Some(view)]).expect("banked code");
        assert_eq!(loc.index, 0x18010);
        assert_eq!(loc.key.bank, Some(3));
        assert!(loc.banked);
        assert!(map.is_banked(0x9000));
        assert_eq!(map.fetch_handler(0x9000), Some(HandlerId(2)));
        assert_eq!(map.fetch_handler(0x2000), None);
    }

    #[test]
    fn flag_combinations() {
        assert!(MemFlags::RAM.contains(MemFlags::CODE | MemFlags::WRITE));
        assert!(!MemFlags::ROM.contains(MemFlags::WRITE));
        assert_eq!((MemFlags::READ | MemFlags::WRITE).bits(), MemFlags::RW.bits());
    }
}
