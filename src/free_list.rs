//! Per-class intrusive free lists.
//!
//! A free block stores the address of the next free block of its class in
//! its own first pointer-sized word, so the lists cost nothing beyond the
//! blocks themselves. Live blocks carry no header or footer; the size the
//! caller passes back at free time is the only record of which class a
//! block belongs to.
//!
//! Debug builds additionally track every pool word in a freed-block ledger
//! and stamp freed blocks with a canary, turning double frees, foreign
//! pointers, and writes through stale pointers into panics instead of
//! silent corruption. Release builds compile all of that out.

use std::ptr::NonNull;

use crate::size_class::{NUM_SIZE_CLASSES, class_size};

#[cfg(debug_assertions)]
use crate::size_class::MIN_CLASS_SIZE;
#[cfg(debug_assertions)]
use fixedbitset::FixedBitSet;

/// Link node overlaid on the first word of every free block.
#[repr(transparent)]
struct FreeBlock {
    next: *mut FreeBlock,
}

/// Stamp written just past the link word of freed blocks with room for it,
/// verified on pop to catch writes through stale pointers.
#[cfg(debug_assertions)]
const FREE_CANARY: u64 = 0xF4EE_B10C_F4EE_B10C;

/// The 56 per-class LIFO free lists.
pub(crate) struct FreeListBank {
    heads: [*mut FreeBlock; NUM_SIZE_CLASSES],
    counts: [usize; NUM_SIZE_CLASSES],
    #[cfg(debug_assertions)]
    ledger: FreedLedger,
}

// Safety: the bank exclusively owns the blocks linked through it; moving it
// to another thread moves that ownership wholesale. The raw heads are never
// shared.
unsafe impl Send for FreeListBank {}

impl FreeListBank {
    pub(crate) fn new() -> Self {
        Self {
            heads: [std::ptr::null_mut(); NUM_SIZE_CLASSES],
            counts: [0; NUM_SIZE_CLASSES],
            #[cfg(debug_assertions)]
            ledger: FreedLedger::new(),
        }
    }

    /// Link `block` at the head of class `index`'s list.
    ///
    /// # Safety
    ///
    /// `block` must point to at least `class_size(index)` bytes of pool
    /// memory owned by this allocator, aligned for a pointer word, with no
    /// live user of those bytes and no existing position on any list.
    pub(crate) unsafe fn push(&mut self, index: usize, block: NonNull<u8>) {
        debug_assert!(index < NUM_SIZE_CLASSES);
        debug_assert!((block.as_ptr() as usize).is_multiple_of(align_of::<*mut FreeBlock>()));

        #[cfg(debug_assertions)]
        {
            self.ledger.mark_freed(block.as_ptr() as usize);
            if class_size(index) >= size_of::<*mut FreeBlock>() + size_of::<u64>() {
                // Safety: the class leaves a full word of room past the
                // link, and the block base is word-aligned.
                unsafe {
                    block
                        .as_ptr()
                        .add(size_of::<*mut FreeBlock>())
                        .cast::<u64>()
                        .write(FREE_CANARY);
                }
            }
        }

        let node = block.as_ptr().cast::<FreeBlock>();
        // Safety: the caller guarantees exclusive, writable, class-sized
        // memory at block.
        unsafe { (*node).next = self.heads[index] };
        self.heads[index] = node;
        self.counts[index] += 1;
    }

    /// Unlink and return the newest block of class `index`, if any.
    pub(crate) fn try_pop(&mut self, index: usize) -> Option<NonNull<u8>> {
        debug_assert!(index < NUM_SIZE_CLASSES);
        let head = self.heads[index];
        let block = NonNull::new(head.cast::<u8>())?;

        #[cfg(debug_assertions)]
        {
            if class_size(index) >= size_of::<*mut FreeBlock>() + size_of::<u64>() {
                // Safety: push stamped this word when the block was freed.
                let stamp = unsafe {
                    block
                        .as_ptr()
                        .add(size_of::<*mut FreeBlock>())
                        .cast::<u64>()
                        .read()
                };
                assert_eq!(
                    stamp, FREE_CANARY,
                    "Freed block at {block:p} was modified while on the free list"
                );
            }
            self.ledger.clear_freed(block.as_ptr() as usize);
        }

        // Safety: every block on a list was pushed with a valid link in its
        // first word.
        self.heads[index] = unsafe { (*head).next };
        self.counts[index] -= 1;
        Some(block)
    }

    /// Blocks currently parked on class `index`'s list.
    pub(crate) fn len(&self, index: usize) -> usize {
        self.counts[index]
    }

    /// Blocks parked across all classes.
    pub(crate) fn total_free(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Bytes parked across all classes.
    pub(crate) fn free_bytes(&self) -> usize {
        self.counts
            .iter()
            .enumerate()
            .map(|(index, count)| count * class_size(index))
            .sum()
    }

    /// Record a pool region so the debug ledger can police its blocks.
    #[cfg(debug_assertions)]
    pub(crate) fn register_region(&mut self, base: usize, len: usize) {
        self.ledger.register(base, len);
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn register_region(&mut self, _base: usize, _len: usize) {}
}

/// Debug-build record of which pool words currently sit on a free list.
///
/// One bit per [`MIN_CLASS_SIZE`] word of every registered region, keyed by
/// a block's first word: set while the block is on a list, clear while it
/// is live or still virgin bump memory.
#[cfg(debug_assertions)]
struct FreedLedger {
    regions: Vec<LedgerRegion>,
}

#[cfg(debug_assertions)]
struct LedgerRegion {
    base: usize,
    len: usize,
    freed: FixedBitSet,
}

#[cfg(debug_assertions)]
impl FreedLedger {
    fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    fn register(&mut self, base: usize, len: usize) {
        self.regions.push(LedgerRegion {
            base,
            len,
            freed: FixedBitSet::with_capacity(len / MIN_CLASS_SIZE),
        });
    }

    fn slot_mut(&mut self, addr: usize) -> Option<&mut LedgerRegion> {
        self.regions
            .iter_mut()
            .find(|region| addr >= region.base && addr < region.base + region.len)
    }

    fn mark_freed(&mut self, addr: usize) {
        let Some(region) = self.slot_mut(addr) else {
            panic!("Pointer {addr:#x} was freed into a pool that does not own it");
        };
        let slot = (addr - region.base) / MIN_CLASS_SIZE;
        assert!(
            !region.freed.put(slot),
            "Double free of pool block at {addr:#x}"
        );
    }

    fn clear_freed(&mut self, addr: usize) {
        if let Some(region) = self.slot_mut(addr) {
            let slot = (addr - region.base) / MIN_CLASS_SIZE;
            region.freed.set(slot, false);
        }
    }
}
