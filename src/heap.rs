//! The system-heap boundary.
//!
//! The pool grows by acquiring raw byte regions through a [`HeapSource`].
//! Production code uses [`SystemHeap`] (the C heap via `libc`); tests swap
//! in a budgeted source to drive growth-failure and salvage paths without
//! exhausting real memory.

use std::ptr::NonNull;

/// Errors surfaced by pool allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The heap source refused a growth request and no larger free list
    /// held a block to salvage.
    OutOfMemory {
        /// Size of the request that could not be satisfied, in bytes.
        requested: usize,
    },
    /// Zero-byte requests are rejected rather than served from class 0.
    ZeroSize,
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocError::OutOfMemory { requested } => {
                write!(f, "Heap source exhausted while requesting {requested} bytes")
            }
            AllocError::ZeroSize => write!(f, "Zero-size allocations are not supported"),
        }
    }
}

impl std::error::Error for AllocError {}

/// A raw source of backing memory.
///
/// Regions come back untyped and uninitialized. Implementations must return
/// memory aligned at least as strictly as a pointer word; the pool carves
/// regions at [`MIN_CLASS_SIZE`](crate::MIN_CLASS_SIZE) granularity and
/// stores free-list links in place, so that alignment is part of the
/// contract, not a nicety.
pub trait HeapSource {
    /// Obtain `size` bytes, or `None` when the source cannot supply them.
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Return a region previously obtained from [`acquire`](Self::acquire).
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must exactly match a prior `acquire` from this same
    /// source, and the region must not be touched again afterward.
    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize);
}

/// The process heap, via `malloc`/`free`.
///
/// `malloc` aligns for any fundamental type (16 bytes on 64-bit targets),
/// comfortably covering the pool's link-word requirement.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHeap;

impl HeapSource for SystemHeap {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        // Safety: size is non-zero; a null return maps to None.
        let raw = unsafe { libc::malloc(size) };
        NonNull::new(raw.cast::<u8>())
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, _size: usize) {
        // Safety: the caller guarantees ptr came from acquire, which is
        // malloc, so free is the matching teardown.
        unsafe { libc::free(ptr.as_ptr().cast::<libc::c_void>()) };
    }
}
