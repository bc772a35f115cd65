//! Pool-region management: bump carving, geometric growth, leftover
//! donation, and free-list salvage.
//!
//! The pool keeps a single active region delimited by a cursor pair;
//! carving advances the cursor in class-size steps. When the remainder can
//! no longer fit one block it is donated into smaller classes and a fresh
//! region is acquired, sized at twice the refill plus a bonus proportional
//! to everything acquired so far. When the heap source refuses to grow,
//! free blocks of larger classes are cannibalized before the failure
//! surfaces to the caller.

use std::ptr::NonNull;

use crate::allocator::PoolConfig;
use crate::free_list::FreeListBank;
use crate::heap::{AllocError, HeapSource};
use crate::size_class::{
    MAX_SMALL_SIZE, MIN_CLASS_SIZE, NUM_SIZE_CLASSES, class_index, class_size,
    largest_class_at_most, round_up,
};
use crate::stats;

/// One region acquired from the heap source, recorded for drop-time
/// release.
struct Region {
    base: NonNull<u8>,
    len: usize,
}

/// Growable backing store for the free lists.
pub(crate) struct ChunkPool {
    /// First unconsumed byte of the active region.
    start_free: *mut u8,
    /// One past the last byte of the active region.
    end_free: *mut u8,
    /// Cumulative bytes ever acquired from the heap source. Monotone; it
    /// feeds the growth bonus and survives region release.
    heap_size: usize,
    regions: Vec<Region>,
    grows: u64,
    donations: u64,
    salvages: u64,
}

// Safety: the pool exclusively owns the regions it records; sending it to
// another thread transfers that ownership wholesale.
unsafe impl Send for ChunkPool {}

impl ChunkPool {
    pub(crate) fn new() -> Self {
        Self {
            start_free: std::ptr::null_mut(),
            end_free: std::ptr::null_mut(),
            heap_size: 0,
            regions: Vec::new(),
            grows: 0,
            donations: 0,
            salvages: 0,
        }
    }

    /// Bytes left in the active region.
    pub(crate) fn available(&self) -> usize {
        self.end_free as usize - self.start_free as usize
    }

    /// Cumulative bytes acquired from the heap source.
    pub(crate) fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub(crate) fn grows(&self) -> u64 {
        self.grows
    }

    pub(crate) fn donations(&self) -> u64 {
        self.donations
    }

    pub(crate) fn salvages(&self) -> u64 {
        self.salvages
    }

    /// Carve a contiguous run of up to `want` blocks of `size` bytes,
    /// returning the run start and the number of blocks it holds (at least
    /// one). `size` must be an exact class size.
    ///
    /// A shortfall triggers, in order: donation of the unusable remainder
    /// into smaller classes, growth through `heap`, then salvage from
    /// larger classes.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] when the heap source refuses the growth
    /// request and every larger class is empty. The pool stays consistent:
    /// nothing is leaked and previously donated remainders stay reachable.
    pub(crate) fn carve<H: HeapSource>(
        &mut self,
        size: usize,
        want: usize,
        bank: &mut FreeListBank,
        heap: &mut H,
        config: &PoolConfig,
    ) -> Result<(NonNull<u8>, usize), AllocError> {
        debug_assert!((MIN_CLASS_SIZE..=MAX_SMALL_SIZE).contains(&size));
        debug_assert_eq!(size, round_up(size));
        debug_assert!(want >= 1);

        // At most two passes: a successful grow or salvage always leaves
        // room for at least one block.
        loop {
            let available = self.available();
            if available >= size {
                let got = usize::min(want, available / size);
                // Safety: available > 0 implies a non-null cursor, and
                // got * size bytes lie inside the active region.
                let run = unsafe { NonNull::new_unchecked(self.start_free) };
                // Safety: the advanced cursor stays within the region.
                self.start_free = unsafe { self.start_free.add(got * size) };
                return Ok((run, got));
            }

            // The remainder cannot fit even one block; recycle it before
            // looking for fresh memory.
            self.donate_leftover(bank);

            let request = config.grow_request(size * want, self.heap_size);
            if self.grow(request, bank, heap) {
                continue;
            }
            if self.salvage(size, bank) {
                continue;
            }
            return Err(AllocError::OutOfMemory { requested: size });
        }
    }

    /// Push the active region's remainder onto the free lists, split
    /// greedily into the largest exact class sizes it contains.
    ///
    /// The remainder is always a multiple of [`MIN_CLASS_SIZE`] (regions
    /// and carves both are), so the split is exact and nothing is
    /// stranded.
    fn donate_leftover(&mut self, bank: &mut FreeListBank) {
        let mut leftover = self.available();
        debug_assert!(leftover.is_multiple_of(MIN_CLASS_SIZE));

        while leftover >= MIN_CLASS_SIZE {
            let piece = largest_class_at_most(leftover);
            // Safety: leftover > 0 implies a non-null cursor, and piece
            // bytes of unconsumed region memory start there.
            unsafe {
                bank.push(class_index(piece), NonNull::new_unchecked(self.start_free));
                self.start_free = self.start_free.add(piece);
            }
            leftover -= piece;
            self.donations += 1;
        }
        debug_assert_eq!(self.available(), 0);
    }

    /// Acquire a fresh region of `request` bytes and make it the active
    /// one. Returns false when the heap source refuses.
    fn grow<H: HeapSource>(
        &mut self,
        request: usize,
        bank: &mut FreeListBank,
        heap: &mut H,
    ) -> bool {
        debug_assert!(request.is_multiple_of(MIN_CLASS_SIZE));
        let Some(base) = heap.acquire(request) else {
            return false;
        };
        self.regions.push(Region { base, len: request });
        self.heap_size += request;
        self.grows += 1;
        stats::POOL_HEAP_BYTES.add(request);
        bank.register_region(base.as_ptr() as usize, request);

        self.start_free = base.as_ptr();
        // Safety: the acquired region spans request bytes from base.
        self.end_free = unsafe { base.as_ptr().add(request) };
        true
    }

    /// Adopt a free block from the smallest class larger than `size` as
    /// the new active region. Returns false when every larger class is
    /// empty.
    fn salvage(&mut self, size: usize, bank: &mut FreeListBank) -> bool {
        for index in (class_index(size) + 1)..NUM_SIZE_CLASSES {
            let Some(block) = bank.try_pop(index) else {
                continue;
            };
            self.start_free = block.as_ptr();
            // Safety: every block on list `index` spans class_size(index)
            // bytes.
            self.end_free = unsafe { block.as_ptr().add(class_size(index)) };
            self.salvages += 1;
            return true;
        }
        false
    }

    /// Give every acquired region back to `heap` and disarm the cursor.
    ///
    /// Blocks carved from those regions dangle afterwards; the owning
    /// allocator's drop contract covers that.
    pub(crate) fn release_regions<H: HeapSource>(&mut self, heap: &mut H) {
        for region in self.regions.drain(..) {
            stats::POOL_HEAP_BYTES.sub(region.len);
            // Safety: base/len pairs were recorded verbatim from acquire
            // and each region is released exactly once.
            unsafe { heap.release(region.base, region.len) };
        }
        self.start_free = std::ptr::null_mut();
        self.end_free = std::ptr::null_mut();
    }
}
