use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use crate::{Arena, BlockPoolBuilder, FreeList, InitError};

/// A thread-safe memory pool of fixed-size blocks with O(1) allocation and release.
///
/// `BlockPool` preallocates a single contiguous arena of `chunk_size * block_count`
/// bytes, aligned to `chunk_size`, and hands out the blocks one at a time. Vacant
/// blocks are chained into an intrusive free list threaded through their own
/// memory, so both allocation and release are a constant-time list splice with no
/// per-block bookkeeping.
///
/// # Key features
///
/// - **Fixed capacity**: the arena never grows or shrinks; exhaustion is reported
///   as a refused allocation, never an error or a blocking wait
/// - **One size class**: every block is `chunk_size` bytes; requests must fit
/// - **O(1) operations**: allocation pops the free-list head, release pushes it
/// - **Thread-safe**: the pool is [`Send`] and [`Sync`]; all free-list mutation
///   is serialized by one internal mutex held only for the list splice
/// - **Misuse-absorbing release**: pointers that do not belong to the pool are
///   silently ignored (and counted, see [`rejected_free_count()`])
///
/// # Examples
///
/// ```rust
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::builder().chunk_size(64).block_count(8).build()?;
///
/// let block = pool.alloc(48, 8).expect("freshly built pool has free blocks");
///
/// // The block is uninitialized memory, valid for 64 bytes.
/// // SAFETY: The block is exclusively ours until we release it.
/// unsafe {
///     block.as_ptr().write_bytes(0xAA, 48);
/// }
///
/// pool.free(block);
/// # Ok::<(), block_pool::InitError>(())
/// ```
///
/// # Pointer validity
///
/// [`alloc()`](Self::alloc) returns a raw pointer, not a borrow: the pool asserts
/// no rights over the block's contents between allocation and release, and the
/// caller is responsible for not using the pointer after releasing it or after
/// dropping the pool. Releasing the same *valid* block twice corrupts the free
/// list by inserting it twice; the membership check cannot detect this, only
/// pointers that were never part of the pool.
///
/// # Thread safety
///
/// The pool may be shared freely across threads. Allocation validates its
/// arguments before taking the lock and holds it only to pop the list head,
/// so contention is limited to the O(1) splice.
///
/// [`rejected_free_count()`]: Self::rejected_free_count
#[derive(Debug)]
pub struct BlockPool {
    /// The buffer backing all blocks, plus the pointer math for it.
    arena: Arena,

    /// Free-list head and counters. Every read and mutation of this state goes
    /// through the mutex; the free-list operations themselves require the guard
    /// as proof that the lock is held.
    state: Mutex<FreeList>,
}

impl BlockPool {
    /// Creates a builder for configuring and constructing a [`BlockPool`].
    ///
    /// Both the chunk size and the block count must be specified before calling
    /// `.build()`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder().chunk_size(32).block_count(4).build()?;
    ///
    /// assert_eq!(pool.capacity(), 4);
    /// assert_eq!(pool.chunk_size(), 32);
    /// # Ok::<(), block_pool::InitError>(())
    /// ```
    #[inline]
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    /// Creates a new [`BlockPool`] with the specified configuration.
    ///
    /// This method is used internally by the builder to construct the actual pool.
    pub(crate) fn new_inner(chunk_size: usize, block_count: usize) -> Result<Self, InitError> {
        if block_count == 0 {
            return Err(InitError::ZeroBlockCount);
        }

        if !chunk_size.is_power_of_two() {
            return Err(InitError::ChunkSizeNotPowerOfTwo { chunk_size });
        }

        // The free-list link is stored in the first bytes of each vacant block,
        // so a block must be able to hold at least one link word.
        if chunk_size < size_of::<usize>() {
            return Err(InitError::ChunkSizeTooSmall {
                chunk_size,
                minimum: size_of::<usize>(),
            });
        }

        let arena = Arena::new(chunk_size, block_count)?;
        let state = Mutex::new(FreeList::new(&arena));

        Ok(Self { arena, state })
    }

    /// Size in bytes of each block.
    #[must_use]
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.arena.chunk_size()
    }

    /// Total number of blocks in the pool, fixed at construction.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.block_count()
    }

    /// Number of blocks currently available for allocation.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.state().free_count()
    }

    /// Number of blocks currently handed out to callers.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        let free = self.state().free_count();

        // Cannot wrap because the free count never exceeds the block count.
        self.arena.block_count().wrapping_sub(free)
    }

    /// Whether the free list is empty, meaning the next allocation will be refused.
    ///
    /// On a shared pool this is only a snapshot: another thread may release a
    /// block immediately after this returns `true`.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.free_count() == 0
    }

    /// Number of release attempts absorbed because the pointer did not belong to
    /// this pool.
    ///
    /// Invalid releases are deliberately silent - no panic, no state change - to
    /// favor crash-avoidance under misuse. This counter is the diagnostic window
    /// into that policy: a nonzero value means some caller freed a foreign or
    /// misaligned pointer.
    #[must_use]
    pub fn rejected_free_count(&self) -> u64 {
        self.state().rejected_frees()
    }

    /// Allocates one block, returning its address, or `None` when the request is
    /// invalid or the pool is exhausted.
    ///
    /// The request is refused (without touching the lock) when `size` is zero or
    /// larger than the chunk size, or when `align` is not a power of two or larger
    /// than the chunk size. The pool has exactly one size class; requests are not
    /// split or rounded up. Any accepted `align` is automatically satisfied
    /// because every block address is a multiple of the chunk size.
    ///
    /// Exhaustion is not an error: the caller may retry after releasing a block
    /// elsewhere, or fall back to another allocator.
    ///
    /// The returned memory is uninitialized and may contain stale free-list link
    /// bytes; the pool makes no zeroing guarantee.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder().chunk_size(32).block_count(2).build()?;
    ///
    /// // Requests beyond the size class are refused, not an error.
    /// assert!(pool.alloc(64, 8).is_none());
    ///
    /// let a = pool.alloc(16, 8).expect("two blocks are free");
    /// let b = pool.alloc(16, 8).expect("one block is free");
    /// assert!(pool.alloc(16, 8).is_none()); // Exhausted.
    ///
    /// pool.free(a);
    /// pool.free(b);
    /// # Ok::<(), block_pool::InitError>(())
    /// ```
    #[must_use]
    pub fn alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if size == 0 || size > self.arena.chunk_size() {
            return None;
        }

        if !align.is_power_of_two() || align > self.arena.chunk_size() {
            return None;
        }

        self.state().pop(&self.arena)
    }

    /// Releases a block previously returned by [`alloc()`](Self::alloc) on this
    /// same pool.
    ///
    /// The block is pushed onto the head of the free list, so an immediate
    /// re-allocation returns the same address (LIFO reuse).
    ///
    /// A pointer that does not pass the membership check - outside the arena or
    /// not block-aligned - is silently ignored; see
    /// [`rejected_free_count()`](Self::rejected_free_count). Releasing a *valid*
    /// block that is already free is caller misuse the pool cannot detect and
    /// corrupts the free list.
    pub fn free(&self, ptr: NonNull<u8>) {
        _ = self.state().push(&self.arena, ptr);
    }

    /// Releases a batch of blocks under a single lock acquisition.
    ///
    /// Equivalent to calling [`free()`](Self::free) for each pointer, but the
    /// free-list lock is taken once for the whole batch instead of once per
    /// pointer. Invalid pointers in the batch are absorbed individually, exactly
    /// as with `free()`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder().chunk_size(32).block_count(4).build()?;
    ///
    /// let blocks: Vec<_> = (0..4).map(|_| pool.alloc(8, 8).unwrap()).collect();
    /// assert!(pool.is_exhausted());
    ///
    /// pool.free_batch(blocks);
    /// assert_eq!(pool.free_count(), 4);
    /// # Ok::<(), block_pool::InitError>(())
    /// ```
    pub fn free_batch<I>(&self, ptrs: I)
    where
        I: IntoIterator<Item = NonNull<u8>>,
    {
        let mut state = self.state();

        for ptr in ptrs {
            _ = state.push(&self.arena, ptr);
        }
    }

    /// Whether `ptr` refers to a block of this pool: within the arena and aligned
    /// to a block boundary.
    ///
    /// This is a pure predicate over the pool's fixed geometry; it takes no lock
    /// and does not consult the free list, so it cannot tell an allocated block
    /// from a vacant one.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.arena.contains(ptr)
    }

    fn state(&self) -> MutexGuard<'_, FreeList> {
        self.state
            .lock()
            .expect("free-list mutex cannot be poisoned - no code panics while holding it")
    }

    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self) {
        self.state().integrity_check(&self.arena);
    }
}

// No `Drop` impl on the pool itself: the arena releases the buffer. Outstanding
// block pointers are invalidated at that point, which is the caller's problem,
// exactly as with any allocator.

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BlockPool: Send, Sync, std::fmt::Debug);

    fn pool(chunk_size: usize, block_count: usize) -> BlockPool {
        BlockPool::builder()
            .chunk_size(chunk_size)
            .block_count(block_count)
            .build()
            .unwrap()
    }

    #[test]
    fn smoke_test() {
        let pool = pool(32, 4);

        let block = pool.alloc(16, 8).unwrap();
        assert!(pool.contains(block));
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.free_count(), 3);

        // The block is writable for the full chunk size.
        unsafe {
            block.as_ptr().write_bytes(0xAA, 32);
        }

        pool.free(block);
        assert_eq!(pool.free_count(), 4);
        pool.integrity_check();
    }

    #[test]
    fn exactly_capacity_allocations_succeed() {
        let pool = pool(64, 5);

        let blocks: Vec<_> = (0..5).map(|_| pool.alloc(8, 8).unwrap()).collect();

        assert!(pool.is_exhausted());
        assert_eq!(pool.alloc(8, 8), None);

        // The handed-out addresses partition the arena: all distinct, all inside,
        // all block-aligned.
        let unique: HashSet<_> = blocks.iter().copied().collect();
        assert_eq!(unique.len(), 5);
        for block in &blocks {
            assert!(pool.contains(*block));
        }

        pool.free_batch(blocks);
        assert_eq!(pool.free_count(), 5);
        pool.integrity_check();
    }

    #[test]
    fn reuse_is_lifo() {
        let pool = pool(32, 4);

        let block = pool.alloc(16, 8).unwrap();
        pool.free(block);

        // On an otherwise idle pool, the freed block is handed out again first.
        let reused = pool.alloc(16, 8).unwrap();
        assert_eq!(reused, block);

        pool.free(reused);
    }

    #[test]
    fn exhaustion_recovers_after_free() {
        let pool = pool(32, 2);

        let a = pool.alloc(8, 8).unwrap();
        let b = pool.alloc(8, 8).unwrap();
        assert_eq!(pool.alloc(8, 8), None);

        pool.free(a);

        let c = pool.alloc(8, 8).unwrap();
        assert_eq!(c, a);

        pool.free(b);
        pool.free(c);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn invalid_requests_are_refused() {
        let pool = pool(32, 4);

        // Size out of class.
        assert_eq!(pool.alloc(64, 8), None);
        assert_eq!(pool.alloc(0, 8), None);

        // Alignment beyond the chunk size.
        assert_eq!(pool.alloc(16, 64), None);

        // Alignment that is not a power of two.
        assert_eq!(pool.alloc(16, 3), None);
        assert_eq!(pool.alloc(16, 0), None);

        // None of the refusals consumed a block.
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn size_equal_to_chunk_size_is_accepted() {
        let pool = pool(32, 1);

        let block = pool.alloc(32, 32).unwrap();
        pool.free(block);
    }

    #[test]
    fn foreign_pointer_free_is_a_no_op() {
        let pool = pool(32, 4);

        let before_head = pool.alloc(8, 8).unwrap();
        pool.free(before_head);

        let stack_local = 42_i32;
        pool.free(NonNull::from(&stack_local).cast::<u8>());

        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.rejected_free_count(), 1);

        // The head is unchanged: the same block comes back.
        let after = pool.alloc(8, 8).unwrap();
        assert_eq!(after, before_head);
        pool.free(after);
        pool.integrity_check();
    }

    #[test]
    fn misaligned_pointer_free_is_a_no_op() {
        let pool = pool(32, 4);

        let block = pool.alloc(16, 8).unwrap();

        let interior = unsafe { block.add(4) };
        pool.free(interior);

        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.rejected_free_count(), 1);

        pool.free(block);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn free_batch_returns_all_blocks_at_once() {
        let pool = pool(32, 8);

        let blocks: Vec<_> = (0..8).map(|_| pool.alloc(8, 8).unwrap()).collect();
        assert!(pool.is_exhausted());

        pool.free_batch(blocks);

        assert_eq!(pool.free_count(), 8);
        assert_eq!(pool.allocated_count(), 0);
        pool.integrity_check();
    }

    #[test]
    fn blocks_do_not_overlap_when_written() {
        let pool = pool(32, 4);

        let blocks: Vec<_> = (0..4).map(|_| pool.alloc(32, 8).unwrap()).collect();

        // Fill each block with a distinct pattern, then verify none of the
        // writes bled into a neighboring block.
        for (i, block) in blocks.iter().enumerate() {
            unsafe {
                block.as_ptr().write_bytes(i as u8, 32);
            }
        }

        for (i, block) in blocks.iter().enumerate() {
            for offset in 0..32 {
                unsafe {
                    assert_eq!(block.as_ptr().add(offset).read(), i as u8);
                }
            }
        }

        pool.free_batch(blocks);
    }

    #[test]
    fn concurrent_allocations_never_exceed_capacity() {
        let pool = Arc::new(pool(64, 4));

        // Eight threads race for four blocks; exactly four must win.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.alloc(8, 8).map(|ptr| ptr.as_ptr() as usize))
            })
            .collect();

        let winners: Vec<usize> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(winners.len(), 4);

        let unique: HashSet<_> = winners.iter().copied().collect();
        assert_eq!(unique.len(), 4);

        pool.free_batch(
            winners
                .into_iter()
                .map(|addr| NonNull::new(addr as *mut u8).unwrap()),
        );
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn concurrent_alloc_free_storm_hands_out_exclusive_blocks() {
        const THREADS: usize = 4;
        const ITERATIONS: usize = 1000;

        let pool = Arc::new(pool(64, THREADS * 2));

        let handles: Vec<_> = (0..THREADS)
            .map(|thread_index| {
                let pool = Arc::clone(&pool);

                thread::spawn(move || {
                    let marker = thread_index as u8;

                    for _ in 0..ITERATIONS {
                        let Some(block) = pool.alloc(64, 8) else {
                            continue;
                        };

                        // While we hold the block, nobody else may write to it.
                        // If the pool ever double-hands-out a block, another
                        // thread's marker shows up under our feet.
                        unsafe {
                            block.as_ptr().write_bytes(marker, 64);
                        }

                        for offset in 0..64 {
                            unsafe {
                                assert_eq!(block.as_ptr().add(offset).read(), marker);
                            }
                        }

                        pool.free(block);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.free_count(), THREADS * 2);
        assert_eq!(pool.rejected_free_count(), 0);
        pool.integrity_check();
    }

    #[test]
    fn allocations_are_aligned_to_request() {
        let pool = pool(128, 4);

        for align in [1_usize, 2, 4, 8, 16, 32, 64, 128] {
            let block = pool.alloc(64, align).unwrap();
            assert_eq!(block.as_ptr() as usize % align, 0);
            pool.free(block);
        }
    }

    #[test]
    fn pool_drop_with_outstanding_blocks_does_not_panic() {
        let pool = pool(32, 2);

        // Deliberately do not free; the arena is released wholesale.
        let _block = pool.alloc(8, 8).unwrap();

        drop(pool);
    }
}
