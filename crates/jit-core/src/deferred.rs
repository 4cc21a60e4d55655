//! Deferred link resolver.
//!
//! A branch to code that is not translated yet is emitted as an unlinked
//! jump and queued here. Once the block being translated is complete the
//! queue is drained: entries whose target now has code are patched, the
//! rest cause their target to be translated.

use crate::code::CodePtr;

/// A patch site waiting for its target to be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredAddress {
    pub target: u32,
    pub site: CodePtr,
}

/// Queue of unresolved direct transfers.
#[derive(Debug, Default)]
pub struct DeferredLinks {
    pending: Vec<DeferredAddress>,
}

impl DeferredLinks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn defer(&mut self, target: u32, site: CodePtr) {
        self.pending.push(DeferredAddress { target, site });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove every entry whose target `lookup` can resolve and return the
    /// `(site, destination)` pairs to patch.
    pub fn resolve(
        &mut self,
        mut lookup: impl FnMut(u32) -> Option<CodePtr>,
    ) -> Vec<(CodePtr, CodePtr)> {
        let mut patches = Vec::new();
        self.pending.retain(|entry| match lookup(entry.target) {
            Some(dest) => {
                patches.push((entry.site, dest));
                false
            }
            None => true,
        });
        patches
    }

    /// Oldest target still waiting for code.
    #[must_use]
    pub fn next_target(&self) -> Option<u32> {
        self.pending.first().map(|e| e.target)
    }

    /// Remove every entry for `target`, returning their sites.
    pub fn take_target(&mut self, target: u32) -> Vec<CodePtr> {
        let mut sites = Vec::new();
        self.pending.retain(|entry| {
            if entry.target == target {
                sites.push(entry.site);
                false
            } else {
                true
            }
        });
        sites
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
