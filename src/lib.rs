//! Size-class memory pool for small, frequently recycled allocations.
//!
//! Requests of up to [`MAX_SMALL_SIZE`] bytes are rounded up to one of
//! [`NUM_SIZE_CLASSES`] block sizes (8-byte steps up to 128 bytes, then
//! progressively coarser steps up to 4096) and served from a per-class
//! LIFO free list. Empty lists are refilled in batches carved from large
//! chunks acquired through a [`HeapSource`], so the underlying heap sees
//! one coarse request per refill instead of one per allocation. Anything
//! larger than [`MAX_SMALL_SIZE`] bypasses the pool entirely.
//!
//! Freed blocks are never returned to the heap source while the pool is
//! alive; they park on their class's free list and are handed back,
//! newest first, to later requests of the same class. Dropping a
//! [`PoolAllocator`] releases every chunk it acquired.
//!
//! ```
//! use binpool::PoolAllocator;
//!
//! let mut pool = PoolAllocator::new();
//! let block = pool.allocate(40)?;
//! // Safety: the block is live and at least 40 bytes long.
//! unsafe {
//!     block.as_ptr().write_bytes(0x2A, 40);
//!     pool.deallocate(block, 40);
//! }
//! # Ok::<(), binpool::AllocError>(())
//! ```
//!
//! A [`PoolAllocator`] is single-owner: it is `Send` but not `Sync`.
//! Processes that want one shared pool use [`GlobalPool`], which wraps a
//! process-wide allocator in a mutex.
//!
//! Debug builds harden the pool: every release is checked against a
//! ledger of carved regions (catching double frees and foreign
//! pointers), and parked blocks carry a canary word that detects writes
//! through stale pointers.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("binpool supports only 64-bit targets.");

mod allocator;
mod chunk_pool;
mod free_list;
mod global;
mod heap;
mod integration;
mod size_class;
mod stats;

// allocator + tuning
pub use allocator::{PoolAllocator, PoolConfig, PoolStats};
pub use global::GlobalPool;

// heap boundary
pub use heap::{AllocError, HeapSource, SystemHeap};

// size-class arithmetic
pub use size_class::{
    MAX_SMALL_SIZE, MIN_CLASS_SIZE, NUM_SIZE_CLASSES, class_index, class_size, round_up,
};

// process-wide gauges
pub use stats::{ProcessStats, snapshot};

#[cfg(test)]
pub(crate) static TEST_MUTEX: std::sync::RwLock<()> = std::sync::RwLock::new(());
