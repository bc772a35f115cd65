//! Process-wide allocator facade.
//!
//! One lock-guarded [`PoolAllocator`] for callers that want a static
//! interface instead of owning an instance. Initialized on first use and
//! never torn down: its regions live until process exit, matching the
//! classic static-pool lifecycle. Blocks may be allocated on one thread
//! and freed on another, as long as every call goes through this facade.

use std::ptr::NonNull;
use std::sync::{Mutex, OnceLock};

use crate::allocator::{PoolAllocator, PoolStats};
use crate::heap::{AllocError, SystemHeap};

static GLOBAL_POOL: OnceLock<Mutex<PoolAllocator<SystemHeap>>> = OnceLock::new();

/// The shared, process-wide pool.
pub struct GlobalPool;

impl GlobalPool {
    fn handle() -> &'static Mutex<PoolAllocator<SystemHeap>> {
        GLOBAL_POOL.get_or_init(|| Mutex::new(PoolAllocator::new()))
    }

    /// [`PoolAllocator::allocate`] on the shared pool.
    ///
    /// # Errors
    ///
    /// As [`PoolAllocator::allocate`].
    ///
    /// # Panics
    ///
    /// If a previous holder of the shared pool panicked mid-operation.
    pub fn allocate(size: usize) -> Result<NonNull<u8>, AllocError> {
        Self::handle().lock().unwrap().allocate(size)
    }

    /// [`PoolAllocator::deallocate`] on the shared pool.
    ///
    /// # Safety
    ///
    /// As [`PoolAllocator::deallocate`], with the shared pool as the
    /// owning allocator.
    ///
    /// # Panics
    ///
    /// If a previous holder of the shared pool panicked mid-operation.
    pub unsafe fn deallocate(ptr: NonNull<u8>, size: usize) {
        // Safety: forwarded caller contract.
        unsafe { Self::handle().lock().unwrap().deallocate(ptr, size) }
    }

    /// [`PoolAllocator::reallocate`] on the shared pool.
    ///
    /// # Safety
    ///
    /// As [`PoolAllocator::reallocate`], with the shared pool as the
    /// owning allocator.
    ///
    /// # Errors
    ///
    /// As [`PoolAllocator::reallocate`].
    ///
    /// # Panics
    ///
    /// If a previous holder of the shared pool panicked mid-operation.
    pub unsafe fn reallocate(
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        // Safety: forwarded caller contract.
        unsafe {
            Self::handle()
                .lock()
                .unwrap()
                .reallocate(ptr, old_size, new_size)
        }
    }

    /// Snapshot of the shared pool's bookkeeping.
    ///
    /// # Panics
    ///
    /// If a previous holder of the shared pool panicked mid-operation.
    #[must_use]
    pub fn stats() -> PoolStats {
        Self::handle().lock().unwrap().stats()
    }
}
