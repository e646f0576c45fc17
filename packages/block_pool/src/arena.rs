use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use crate::InitError;

/// Owns the contiguous buffer backing all blocks of a pool.
///
/// The arena is a single allocation of `chunk_size * block_count` bytes, aligned
/// to `chunk_size`, carved into `block_count` equal blocks. It performs the
/// pointer arithmetic for the pool (block index to address and back) but knows
/// nothing about which blocks are vacant - that is the free list's business.
///
/// # Out of band access
///
/// The arena does not create or keep references to block memory, so it is valid
/// for callers to access blocks via raw pointers even while only holding a
/// shared reference to the arena.
#[derive(Debug)]
pub(crate) struct Arena {
    /// Start of the buffer. Never changes after construction and is released
    /// exactly once, on drop.
    base: NonNull<u8>,

    /// The layout the buffer was allocated with, required again at deallocation.
    layout: Layout,

    /// Size in bytes of each block. A power of two, at least one `usize` wide.
    chunk_size: usize,

    /// Number of blocks in the buffer. Greater than zero, fixed for the lifetime
    /// of the arena.
    block_count: usize,
}

impl Arena {
    /// Allocates an arena for `block_count` blocks of `chunk_size` bytes each.
    ///
    /// The caller (the pool constructor) has already validated that `chunk_size`
    /// is a power of two no smaller than a pointer and that `block_count` is
    /// nonzero; this function is responsible for the failures only the allocator
    /// can decide: an arena too large to express and plain allocation failure.
    pub(crate) fn new(chunk_size: usize, block_count: usize) -> Result<Self, InitError> {
        debug_assert!(chunk_size.is_power_of_two());
        debug_assert!(chunk_size >= size_of::<usize>());
        debug_assert!(block_count > 0);

        let total_size = chunk_size
            .checked_mul(block_count)
            .ok_or(InitError::ArenaTooLarge {
                chunk_size,
                block_count,
            })?;

        // Aligning the whole buffer to the chunk size makes every block address a
        // multiple of the chunk size, which is what lets a single arena alignment
        // satisfy any per-allocation alignment up to the chunk size.
        let layout = match Layout::from_size_align(total_size, chunk_size) {
            Ok(layout) => layout,
            Err(_) => {
                return Err(InitError::ArenaTooLarge {
                    chunk_size,
                    block_count,
                });
            }
        };

        // SAFETY: The layout has nonzero size because both factors are nonzero
        // and the multiplication was checked above.
        let base = unsafe { alloc(layout) };

        let base = NonNull::new(base).ok_or(InitError::AllocationFailed { size: total_size })?;

        Ok(Self {
            base,
            layout,
            chunk_size,
            block_count,
        })
    }

    /// Size in bytes of each block.
    #[must_use]
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of blocks in the arena.
    #[must_use]
    pub(crate) fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the address of the block at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.block_count,
            "block index {index} out of bounds in arena of {} blocks",
            self.block_count
        );

        // Guarded by the bounds check above. This cannot overflow because that
        // would imply the arena extends beyond virtual memory.
        let offset = index.wrapping_mul(self.chunk_size);

        // SAFETY: base points to an allocation of block_count * chunk_size bytes
        // and offset is within it due to the bounds check above.
        unsafe { self.base.add(offset) }
    }

    /// Maps a candidate pointer back to its block index, or `None` if the pointer
    /// does not refer to a block of this arena.
    ///
    /// This is the membership check: it rejects pointers before the arena, at or
    /// past its end, and interior pointers that are not block-aligned. It cannot
    /// tell an allocated block from a vacant one - that distinction lives in the
    /// free list, which this check deliberately does not consult.
    #[must_use]
    pub(crate) fn index_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;

        // A pointer before the arena produces None here rather than a negative offset.
        let offset = addr.checked_sub(base)?;

        if offset >= self.layout.size() {
            return None;
        }

        #[expect(
            clippy::arithmetic_side_effects,
            reason = "chunk_size is validated nonzero at construction"
        )]
        if offset % self.chunk_size != 0 {
            return None;
        }

        #[expect(
            clippy::integer_division,
            reason = "offset was just verified to be an exact multiple of chunk_size"
        )]
        Some(offset / self.chunk_size)
    }

    /// Whether `ptr` refers to a block of this arena.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.index_of(ptr).is_some()
    }

    /// Writes the free-list link word of the block at `index`.
    ///
    /// The link occupies the first `usize`-sized bytes of the block. Blocks are
    /// chunk-size aligned and the chunk size is a power of two at least as large
    /// as `usize`, so the write is always properly aligned.
    ///
    /// # Safety
    ///
    /// The block must be vacant (not handed out to a caller) and the caller must
    /// have exclusive access to the pool's free-list state.
    pub(crate) unsafe fn write_link(&self, index: usize, next: usize) {
        let link_ptr = self.block_ptr(index).cast::<usize>();

        // SAFETY: The pointer is in bounds and aligned per the reasoning above;
        // the caller guarantees the block is vacant and access is exclusive.
        unsafe { link_ptr.write(next) }
    }

    /// Reads the free-list link word of the block at `index`.
    ///
    /// # Safety
    ///
    /// The block must be vacant with an initialized link word, and the caller
    /// must have exclusive access to the pool's free-list state.
    #[must_use]
    pub(crate) unsafe fn read_link(&self, index: usize) -> usize {
        let link_ptr = self.block_ptr(index).cast::<usize>();

        // SAFETY: The pointer is in bounds and aligned; the caller guarantees the
        // link word was initialized and access is exclusive.
        unsafe { link_ptr.read() }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base was allocated in new() with this exact layout and has not
        // been deallocated before.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

// SAFETY: The arena contains a raw pointer but it refers purely to the arena's
// own allocation, which no other thread can observe except through the pool
// that owns the arena. The pool serializes all mutation behind its mutex.
unsafe impl Send for Arena {}

// SAFETY: Shared-reference methods on the arena only perform pointer
// arithmetic; the methods that touch block memory are unsafe and require the
// caller to hold exclusive access to the free-list state.
unsafe impl Sync for Arena {}

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_spaced_by_chunk_size() {
        let arena = Arena::new(64, 4).unwrap();

        let base = arena.block_ptr(0).as_ptr() as usize;
        for index in 0..4 {
            let addr = arena.block_ptr(index).as_ptr() as usize;
            assert_eq!(addr, base + index * 64);
        }
    }

    #[test]
    fn arena_base_is_chunk_aligned() {
        let arena = Arena::new(128, 3).unwrap();

        let base = arena.block_ptr(0).as_ptr() as usize;
        assert_eq!(base % 128, 0);
    }

    #[test]
    #[should_panic]
    fn block_ptr_out_of_bounds_panics() {
        let arena = Arena::new(32, 2).unwrap();

        _ = arena.block_ptr(2);
    }

    #[test]
    fn index_of_accepts_every_block_start() {
        let arena = Arena::new(32, 4).unwrap();

        for index in 0..4 {
            assert_eq!(arena.index_of(arena.block_ptr(index)), Some(index));
        }
    }

    #[test]
    fn index_of_rejects_interior_pointers() {
        let arena = Arena::new(32, 4).unwrap();

        // One byte into a block is not a block start.
        // SAFETY: The address is within the arena allocation.
        let interior = unsafe { arena.block_ptr(1).add(1) };
        assert_eq!(arena.index_of(interior), None);
    }

    #[test]
    fn index_of_rejects_out_of_range_pointers() {
        let arena = Arena::new(32, 2).unwrap();

        // One chunk past the end of the arena. Computed without add() because the
        // address is outside the allocation.
        let past_end_addr = arena.block_ptr(0).as_ptr() as usize + 2 * 32;
        let past_end = NonNull::new(past_end_addr as *mut u8).unwrap();
        assert_eq!(arena.index_of(past_end), None);

        let stack_local = 0_u64;
        let foreign = NonNull::from(&stack_local).cast::<u8>();
        assert_eq!(arena.index_of(foreign), None);
    }

    #[test]
    fn link_words_round_trip() {
        let arena = Arena::new(32, 4).unwrap();

        // SAFETY: No blocks have been handed out and we have sole access.
        unsafe {
            arena.write_link(0, 3);
            arena.write_link(3, 4);

            assert_eq!(arena.read_link(0), 3);
            assert_eq!(arena.read_link(3), 4);
        }
    }

    #[test]
    fn overflowing_arena_is_rejected() {
        // A power-of-two chunk size near the top of the address space; the
        // product with any multi-block count overflows on every pointer width.
        const CHUNK_SIZE: usize = 1 << (usize::BITS - 8);
        const BLOCK_COUNT: usize = usize::MAX >> 4;

        let result = Arena::new(CHUNK_SIZE, BLOCK_COUNT);
        assert_eq!(
            result.unwrap_err(),
            InitError::ArenaTooLarge {
                chunk_size: CHUNK_SIZE,
                block_count: BLOCK_COUNT,
            }
        );
    }
}
