#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::ptr::NonNull;

    use crate::allocator::{PoolAllocator, PoolConfig};
    use crate::heap::AllocError;
    use crate::heap::testing::CappedHeap;
    use crate::size_class::{MAX_SMALL_SIZE, NUM_SIZE_CLASSES, class_size, round_up};

    fn unlimited_pool() -> PoolAllocator<CappedHeap> {
        PoolAllocator::with_heap(CappedHeap::unlimited())
    }

    #[test]
    fn test_free_then_allocate_returns_newest_block() {
        let mut pool = unlimited_pool();
        let first = pool.allocate(64).unwrap();
        let second = pool.allocate(64).unwrap();
        assert_ne!(first, second);

        // Safety: both blocks are live with the stated size.
        unsafe {
            pool.deallocate(first, 64);
            pool.deallocate(second, 64);
        }
        // Newest free comes back first, then the one before it.
        assert_eq!(pool.allocate(64).unwrap(), second);
        assert_eq!(pool.allocate(64).unwrap(), first);
    }

    #[test]
    fn test_live_blocks_never_overlap() {
        let mut pool = unlimited_pool();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

        // A spread of sizes, enough of each to force several refills, plus
        // a couple of oversized blocks.
        for round in 0..120usize {
            let size = match round % 6 {
                0 => 8,
                1 => 40,
                2 => 100,
                3 => 750,
                4 => 4096,
                _ => MAX_SMALL_SIZE + 100,
            };
            let block = pool.allocate(size).unwrap();
            // Safety: the block spans at least size bytes and is ours.
            unsafe { block.as_ptr().write_bytes((round % 251) as u8, size) };
            live.push((block, size));
        }

        // Every block still carries its own pattern.
        for (round, (block, size)) in live.iter().enumerate() {
            // Safety: the block is live and size bytes long.
            unsafe {
                assert_eq!(block.as_ptr().read(), (round % 251) as u8);
                assert_eq!(block.as_ptr().add(size - 1).read(), (round % 251) as u8);
            }
        }

        // And the class-sized spans are pairwise disjoint.
        let mut spans: Vec<(usize, usize)> = live
            .iter()
            .map(|(block, size)| {
                let span = if *size <= MAX_SMALL_SIZE {
                    round_up(*size)
                } else {
                    *size
                };
                (block.as_ptr() as usize, span)
            })
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(
                pair[0].0 + pair[0].1 <= pair[1].0,
                "blocks at {:#x}+{} and {:#x} overlap",
                pair[0].0,
                pair[0].1,
                pair[1].0
            );
        }

        for (block, size) in live {
            // Safety: each block is live with its stated size.
            unsafe { pool.deallocate(block, size) };
        }
        let stats = pool.stats();
        assert_eq!(stats.live_small, 0);
        assert_eq!(stats.oversized_live, 0);
        assert_eq!(stats.heap_bytes, stats.free_bytes + stats.cursor_bytes);
    }

    #[test]
    fn test_recycling_satisfies_demand_without_growth() {
        let mut pool = unlimited_pool();

        let blocks: Vec<NonNull<u8>> =
            (0..1000).map(|_| pool.allocate(40).unwrap()).collect();
        let grown = pool.heap_bytes();
        let refills = pool.stats().refills;

        // Free every other block.
        let mut freed = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            if index % 2 == 1 {
                // Safety: the block is live and 40 bytes long.
                unsafe { pool.deallocate(*block, 40) };
                freed.push(*block);
            }
        }

        // 500 more requests of the same class are served purely from the
        // freed blocks, newest first, with zero new heap traffic.
        let reused: Vec<NonNull<u8>> =
            (0..500).map(|_| pool.allocate(40).unwrap()).collect();
        assert_eq!(pool.heap_bytes(), grown);
        assert_eq!(pool.stats().refills, refills);

        freed.reverse();
        assert_eq!(reused, freed);
    }

    #[test]
    fn test_salvage_feeds_small_requests_from_larger_classes() {
        let heap = CappedHeap::unlimited();
        let state = heap.state();
        let mut pool = PoolAllocator::with_heap(heap);

        // Prime a large class, then consume the cursor with another class
        // so the pool has no bump room left.
        let big = pool.allocate(1024).unwrap();
        // Safety: big is live with the stated size.
        unsafe { pool.deallocate(big, 1024) };
        let mut mids = Vec::new();
        while pool.stats().cursor_bytes >= 2048 {
            mids.push(pool.allocate(2048).unwrap());
        }
        assert!(pool.stats().cursor_bytes < 2048);
        for block in mids {
            // Safety: each block is live and 2048 bytes long.
            unsafe { pool.deallocate(block, 2048) };
        }

        // No more heap from here on.
        {
            let mut budget = state.borrow_mut();
            budget.cap = budget.outstanding;
        }
        let heap_before = pool.heap_bytes();
        let in_1024 = pool.free_blocks_for(1024);
        assert!(in_1024 > 0);

        // A small request with an empty class and no cursor must
        // cannibalize the smallest larger class rather than fail.
        let small = pool.allocate(40).unwrap();
        assert_eq!(pool.heap_bytes(), heap_before);
        assert_eq!(pool.stats().salvages, 1);
        assert_eq!(pool.free_blocks_for(1024), in_1024 - 1);

        // A request larger than every stocked class still fails, and the
        // failure leaves the pool usable.
        let mut salvageable = 0usize;
        for index in 0..NUM_SIZE_CLASSES {
            salvageable += pool.free_blocks_for(class_size(index));
        }
        assert!(salvageable > 0);
        let err = pool.allocate(MAX_SMALL_SIZE).unwrap_err();
        assert!(matches!(err, AllocError::OutOfMemory { .. }));
        let after = pool.allocate(16).unwrap();

        // Safety: both blocks are live with their stated sizes.
        unsafe {
            pool.deallocate(small, 40);
            pool.deallocate(after, 16);
        }
    }

    #[test]
    fn test_threshold_boundary_pools_4096_delegates_4097() {
        let heap = CappedHeap::unlimited();
        let state = heap.state();
        let mut pool = PoolAllocator::with_heap(heap);

        let pooled = pool.allocate(MAX_SMALL_SIZE).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.refills, 1);
        assert_eq!(stats.free_blocks, 19);
        assert_eq!(stats.oversized_live, 0);
        let acquires_after_pooled = state.borrow().acquires;

        let delegated = pool.allocate(MAX_SMALL_SIZE + 1).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.oversized_live, 1);
        assert_eq!(stats.oversized_bytes, MAX_SMALL_SIZE + 1);
        // The delegated block hit the heap source directly and left the
        // free lists alone.
        assert_eq!(state.borrow().acquires, acquires_after_pooled + 1);
        assert_eq!(stats.free_blocks, 19);
        assert_eq!(stats.refills, 1);

        // Safety: both blocks are live with their stated sizes.
        unsafe {
            pool.deallocate(delegated, MAX_SMALL_SIZE + 1);
            pool.deallocate(pooled, MAX_SMALL_SIZE);
        }
        let stats = pool.stats();
        assert_eq!(stats.free_blocks, 20);
        assert_eq!(stats.oversized_live, 0);
    }

    #[test]
    fn test_reallocate_walks_across_classes_and_back() {
        let mut pool = unlimited_pool();
        let mut size = 1usize;
        let mut block = pool.allocate(size).unwrap();

        for &next in &[8usize, 100, 2000, MAX_SMALL_SIZE + 500, 16] {
            // Refresh the full current extent so the copy is observable.
            // Safety: block is live and size bytes long.
            unsafe {
                for offset in 0..size {
                    block.as_ptr().add(offset).write((offset % 251) as u8);
                }
            }
            // Safety: block is live with the stated size.
            block = unsafe { pool.reallocate(block, size, next).unwrap() };
            let kept = usize::min(size, next);
            // Safety: block is live and at least kept bytes long.
            unsafe {
                for offset in 0..kept {
                    assert_eq!(block.as_ptr().add(offset).read(), (offset % 251) as u8);
                }
            }
            size = next;
        }
        // Safety: block is live with the stated size.
        unsafe { pool.deallocate(block, size) };
        assert_eq!(pool.stats().live_small, 0);
        assert_eq!(pool.stats().oversized_live, 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "Double free")]
    fn test_double_free_is_detected() {
        let mut pool = unlimited_pool();
        let block = pool.allocate(48).unwrap();
        // Safety: the first free honors the contract; the second is the
        // violation under test.
        unsafe {
            pool.deallocate(block, 48);
            pool.deallocate(block, 48);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "does not own it")]
    fn test_foreign_pointer_free_is_detected() {
        let mut pool = unlimited_pool();
        // Touch the pool so it owns at least one region.
        let real = pool.allocate(48).unwrap();
        // Safety: real is live with the stated size.
        unsafe { pool.deallocate(real, 48) };

        let foreign = Box::into_raw(Box::new([0u64; 8]));
        // Safety: the span is valid memory; freeing it into a pool that
        // never carved it is the violation under test.
        unsafe { pool.deallocate(NonNull::new(foreign.cast::<u8>()).unwrap(), 64) };
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "modified while on the free list")]
    fn test_write_through_stale_pointer_is_detected() {
        let mut pool = unlimited_pool();
        let block = pool.allocate(64).unwrap();
        // Safety: block is live with the stated size.
        unsafe { pool.deallocate(block, 64) };
        // Safety: simulating a use-after-free write; the address is still
        // mapped pool memory.
        unsafe { block.as_ptr().add(9).write(0xEE) };
        let _ = pool.allocate(64);
    }

    #[test]
    fn test_allocator_moves_between_threads() {
        let mut pool = PoolAllocator::new();
        let block = pool.allocate(128).unwrap();
        // Safety: block is live and 128 bytes long.
        unsafe { block.as_ptr().write_bytes(0x7E, 128) };
        let addr = block.as_ptr() as usize;

        // The whole allocator moves, carrying its arena and the live
        // block with it.
        let handle = std::thread::spawn(move || {
            let block = NonNull::new(addr as *mut u8).unwrap();
            // Safety: the block moved with the pool and is still live.
            unsafe {
                assert_eq!(block.as_ptr().read(), 0x7E);
                assert_eq!(block.as_ptr().add(127).read(), 0x7E);
                pool.deallocate(block, 128);
            }
            assert_eq!(pool.allocate(128).unwrap(), block);
            pool.stats()
        });
        let stats = handle.join().unwrap();
        assert_eq!(stats.live_small, 1);
    }

    #[test]
    fn test_batched_config_is_tunable() {
        let mut pool = PoolAllocator::with_config(
            CappedHeap::unlimited(),
            PoolConfig {
                batch_count: 4,
                growth_shift: 4,
            },
        );
        let block = pool.allocate(500).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.free_blocks, 3);
        // Twice a four-block refill of the 512 class.
        assert_eq!(stats.heap_bytes, 2 * 4 * 512);
        // Safety: block is live with the stated size.
        unsafe { pool.deallocate(block, 500) };
    }

    #[test]
    fn test_mixed_stress_keeps_books_balanced() {
        let mut pool = unlimited_pool();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
        let mut seen = HashSet::new();

        for round in 0..600usize {
            if round % 3 == 2 && !live.is_empty() {
                let (block, size) = live.swap_remove(round % live.len());
                seen.remove(&(block.as_ptr() as usize));
                // Safety: the block is live with its stated size.
                unsafe { pool.deallocate(block, size) };
                continue;
            }
            let size = 1 + (round * 37) % (MAX_SMALL_SIZE + 512);
            let block = pool.allocate(size).unwrap();
            assert!(
                seen.insert(block.as_ptr() as usize),
                "allocator handed out an address twice"
            );
            // Safety: the block spans at least size bytes.
            unsafe { block.as_ptr().write_bytes((round % 255) as u8, size) };
            live.push((block, size));
        }

        for (block, size) in live {
            // Safety: each block is live with its stated size.
            unsafe { pool.deallocate(block, size) };
        }
        let stats = pool.stats();
        assert_eq!(stats.live_small, 0);
        assert_eq!(stats.oversized_live, 0);
        assert_eq!(stats.oversized_bytes, 0);
        assert_eq!(stats.heap_bytes, stats.free_bytes + stats.cursor_bytes);
    }
}
