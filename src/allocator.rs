//! The allocator facade: size-class dispatch, free-list recycling, and the
//! oversized bypass.

use std::ptr::NonNull;

use crate::chunk_pool::ChunkPool;
use crate::free_list::FreeListBank;
use crate::heap::{AllocError, HeapSource, SystemHeap};
use crate::size_class::{MAX_SMALL_SIZE, class_index, round_up, round_up_any};
use crate::stats;

/// Growth tunables.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Blocks requested from the pool per free-list refill. One goes to
    /// the caller, the rest are parked for reuse.
    pub batch_count: usize,
    /// Every growth request adds `heap_size >> growth_shift` bytes on top
    /// of twice the refill, so a pool that has already grown a lot grows
    /// in coarser steps.
    pub growth_shift: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            batch_count: 20,
            growth_shift: 4,
        }
    }
}

impl PoolConfig {
    /// Bytes to request from the heap source for a refill of `batch_bytes`
    /// given `heap_size` bytes acquired so far.
    #[must_use]
    pub fn grow_request(&self, batch_bytes: usize, heap_size: usize) -> usize {
        let bonus = heap_size.checked_shr(self.growth_shift).unwrap_or(0);
        2 * batch_bytes + round_up_any(bonus)
    }
}

/// Point-in-time snapshot of one allocator's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Cumulative bytes acquired from the heap source for pool regions.
    pub heap_bytes: usize,
    /// Pooled blocks currently handed out.
    pub live_small: usize,
    /// Blocks parked on free lists.
    pub free_blocks: usize,
    /// Bytes parked on free lists.
    pub free_bytes: usize,
    /// Unconsumed bytes in the pool's active region.
    pub cursor_bytes: usize,
    /// Oversized allocations currently live.
    pub oversized_live: usize,
    /// Bytes held by live oversized allocations.
    pub oversized_bytes: usize,
    /// Free-list refills performed.
    pub refills: u64,
    /// Regions acquired from the heap source.
    pub grows: u64,
    /// Leftover fragments donated to smaller classes.
    pub donations: u64,
    /// Blocks cannibalized from larger classes under memory pressure.
    pub salvages: u64,
}

/// A two-level small-object allocator.
///
/// Requests up to [`MAX_SMALL_SIZE`] bytes are served from per-class free
/// lists backed by a growable pool; larger requests go straight to the
/// heap source and come back headerless, so every free must state the
/// allocation's size.
///
/// An instance owns all of its state and is `Send` but not `Sync`: give
/// each thread its own, or share one process-wide through
/// [`GlobalPool`](crate::GlobalPool).
pub struct PoolAllocator<H: HeapSource = SystemHeap> {
    bank: FreeListBank,
    chunks: ChunkPool,
    heap: H,
    config: PoolConfig,
    live_small: usize,
    oversized_live: usize,
    oversized_bytes: usize,
    refills: u64,
}

impl PoolAllocator<SystemHeap> {
    /// Allocator over the process heap with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_heap(SystemHeap)
    }
}

impl Default for PoolAllocator<SystemHeap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HeapSource> PoolAllocator<H> {
    /// Allocator drawing from `heap` with default tuning.
    pub fn with_heap(heap: H) -> Self {
        Self::with_config(heap, PoolConfig::default())
    }

    /// Allocator drawing from `heap`, tuned by `config`.
    pub fn with_config(heap: H, config: PoolConfig) -> Self {
        debug_assert!(config.batch_count >= 1);
        Self {
            bank: FreeListBank::new(),
            chunks: ChunkPool::new(),
            heap,
            config,
            live_small: 0,
            oversized_live: 0,
            oversized_bytes: 0,
            refills: 0,
        }
    }

    /// Hand out `size` bytes.
    ///
    /// Small requests (up to [`MAX_SMALL_SIZE`]) reuse the newest freed
    /// block of their class when one exists; larger requests bypass the
    /// pool entirely. The returned memory is uninitialized.
    ///
    /// # Errors
    ///
    /// [`AllocError::ZeroSize`] for `size == 0`;
    /// [`AllocError::OutOfMemory`] when the heap source is exhausted and
    /// no larger class has a block to salvage. A failed call leaves the
    /// allocator unchanged and usable.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        if size > MAX_SMALL_SIZE {
            return self.allocate_oversized(size);
        }
        let index = class_index(size);
        let block = match self.bank.try_pop(index) {
            Some(block) => block,
            None => self.refill(round_up(size))?,
        };
        self.live_small += 1;
        Ok(block)
    }

    fn allocate_oversized(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block = self
            .heap
            .acquire(size)
            .ok_or(AllocError::OutOfMemory { requested: size })?;
        self.oversized_live += 1;
        self.oversized_bytes += size;
        stats::OVERSIZED_BYTES.add(size);
        Ok(block)
    }

    /// Grow the class's free list by one batch and peel off the first
    /// block for the caller.
    fn refill(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let want = self.config.batch_count.max(1);
        let (run, got) =
            self.chunks
                .carve(size, want, &mut self.bank, &mut self.heap, &self.config)?;
        let index = class_index(size);
        for block in 1..got {
            // Safety: the carved run spans got * size bytes, so every
            // block start is in bounds; each is class-sized pool memory
            // with no other owner and no list position.
            unsafe {
                self.bank
                    .push(index, NonNull::new_unchecked(run.as_ptr().add(block * size)));
            }
        }
        self.refills += 1;
        Ok(run)
    }

    /// Take back a block previously returned by
    /// [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for an allocation
    /// of `size` bytes (or a size rounding to the same class), must
    /// currently be live, and must not be used after this call.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size > 0);
        if size > MAX_SMALL_SIZE {
            self.oversized_live -= 1;
            self.oversized_bytes -= size;
            stats::OVERSIZED_BYTES.sub(size);
            // Safety: the caller guarantees the pair came from allocate,
            // which acquired it from the heap source.
            unsafe { self.heap.release(ptr, size) };
            return;
        }
        // Safety: the caller guarantees a live, class-sized block owned by
        // this allocator.
        unsafe { self.bank.push(class_index(size), ptr) };
        self.live_small -= 1;
    }

    /// Resize a block, preserving its contents up to the smaller of the
    /// two sizes.
    ///
    /// The returned pointer may differ from `ptr`; when it does, the old
    /// block has been freed. When the sizes share a class the original
    /// pointer comes back untouched.
    ///
    /// # Safety
    ///
    /// `ptr` and `old_size` must satisfy the
    /// [`deallocate`](Self::deallocate) contract.
    ///
    /// # Errors
    ///
    /// As [`allocate`](Self::allocate) for `new_size`. On error the old
    /// block is untouched and still owned by the caller.
    pub unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(old_size > 0);
        if new_size == 0 {
            return Err(AllocError::ZeroSize);
        }
        if old_size == new_size {
            return Ok(ptr);
        }
        if old_size <= MAX_SMALL_SIZE
            && new_size <= MAX_SMALL_SIZE
            && class_index(old_size) == class_index(new_size)
        {
            // Same class: the block already fits and contents stay put.
            return Ok(ptr);
        }
        let fresh = self.allocate(new_size)?;
        let keep = usize::min(old_size, new_size);
        // Safety: both blocks are live, at least keep bytes long, and live
        // blocks never alias.
        unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), keep) };
        // Safety: the caller's contract for ptr/old_size.
        unsafe { self.deallocate(ptr, old_size) };
        Ok(fresh)
    }

    /// Cumulative bytes acquired from the heap source for pool regions.
    /// Monotone: reuse from the free lists never moves it.
    #[must_use]
    pub fn heap_bytes(&self) -> usize {
        self.chunks.heap_size()
    }

    /// Blocks currently parked on the free list of the class serving
    /// `size`-byte requests. `size` must be in `1..=MAX_SMALL_SIZE`.
    #[must_use]
    pub fn free_blocks_for(&self, size: usize) -> usize {
        debug_assert!((1..=MAX_SMALL_SIZE).contains(&size));
        self.bank.len(class_index(size))
    }

    /// Snapshot of the allocator's bookkeeping.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            heap_bytes: self.chunks.heap_size(),
            live_small: self.live_small,
            free_blocks: self.bank.total_free(),
            free_bytes: self.bank.free_bytes(),
            cursor_bytes: self.chunks.available(),
            oversized_live: self.oversized_live,
            oversized_bytes: self.oversized_bytes,
            refills: self.refills,
            grows: self.chunks.grows(),
            donations: self.chunks.donations(),
            salvages: self.chunks.salvages(),
        }
    }
}

impl<H: HeapSource> Drop for PoolAllocator<H> {
    fn drop(&mut self) {
        // Regions cover every pooled block; oversized blocks are untracked
        // and must have been deallocated by now.
        self.chunks.release_regions(&mut self.heap);
    }
}
