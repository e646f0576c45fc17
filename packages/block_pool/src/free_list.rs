use std::ptr::NonNull;

use crate::Arena;

/// Free-list state of a pool: which blocks are vacant and in what order they
/// will be handed out.
///
/// The list is intrusive - each vacant block stores the index of the next
/// vacant block in its first `usize`-sized bytes, so the list needs no storage
/// beyond this head. The sentinel value `block_count` marks the end of the
/// list; when `head` equals the sentinel the pool is exhausted.
///
/// This type lives inside the pool's mutex. Obtaining `&mut FreeList` is only
/// possible through the mutex guard, which is what makes the push and pop
/// operations safe to expose without their own locking: holding the exclusive
/// reference is the proof that the lock is held.
#[derive(Debug)]
pub(crate) struct FreeList {
    /// Index of the first vacant block, or the sentinel (block count) when none.
    head: usize,

    /// Number of vacant blocks. Tracked explicitly so the pool can report it
    /// without walking the list.
    free_count: usize,

    /// Number of release attempts absorbed because the pointer failed the
    /// membership check. Purely diagnostic; rejected releases mutate nothing else.
    rejected_frees: u64,
}

impl FreeList {
    /// Threads the initial free list through a freshly allocated arena.
    ///
    /// Block `i` links to block `i + 1`; the last block links to the sentinel.
    /// The head starts at block 0, so blocks are first handed out in address order.
    pub(crate) fn new(arena: &Arena) -> Self {
        let block_count = arena.block_count();

        for index in 0..block_count {
            // Cannot overflow because that would imply the arena is longer than
            // virtual memory.
            let next = index.wrapping_add(1);

            // SAFETY: No block has been handed out yet and we hold the only
            // reference to the arena during construction.
            unsafe {
                arena.write_link(index, next);
            }
        }

        let list = Self {
            head: 0,
            free_count: block_count,
            rejected_frees: 0,
        };

        #[cfg(debug_assertions)]
        list.integrity_check(arena);

        list
    }

    /// Number of vacant blocks.
    #[must_use]
    pub(crate) fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of release attempts rejected by the membership check.
    #[must_use]
    pub(crate) fn rejected_frees(&self) -> u64 {
        self.rejected_frees
    }

    /// Pops the head block off the list, returning its address, or `None` when
    /// the pool is exhausted.
    pub(crate) fn pop(&mut self, arena: &Arena) -> Option<NonNull<u8>> {
        if self.head == arena.block_count() {
            return None;
        }

        let index = self.head;

        // SAFETY: The block at `index` is vacant (it was on the free list) so its
        // link word is initialized, and &mut self proves the pool lock is held.
        self.head = unsafe { arena.read_link(index) };

        // Cannot wrap because the list was non-empty, so free_count is at least 1.
        self.free_count = self.free_count.wrapping_sub(1);

        Some(arena.block_ptr(index))
    }

    /// Pushes a block back onto the head of the list.
    ///
    /// The pointer is re-validated with the membership check even on this
    /// internal path; a pointer that is not a block of this arena is absorbed
    /// without mutating the list and `false` is returned.
    ///
    /// Pushing a block that is already on the list corrupts it (the block would
    /// appear twice); the membership check cannot detect that and preventing it
    /// is the caller's obligation, as with any double free.
    pub(crate) fn push(&mut self, arena: &Arena, ptr: NonNull<u8>) -> bool {
        let Some(index) = arena.index_of(ptr) else {
            // Cannot realistically wrap; u64 outlives any process.
            self.rejected_frees = self.rejected_frees.wrapping_add(1);
            return false;
        };

        // SAFETY: The caller has relinquished the block, making it vacant, and
        // &mut self proves the pool lock is held.
        unsafe {
            arena.write_link(index, self.head);
        }

        self.head = index;

        // Cannot overflow because at most block_count blocks can be pushed.
        self.free_count = self.free_count.wrapping_add(1);

        true
    }

    /// Walks the list and verifies it is consistent with the tracked count.
    ///
    /// This is O(free blocks); callers invoke it from debug builds and tests only.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self, arena: &Arena) {
        let block_count = arena.block_count();
        let mut observed = 0_usize;
        let mut cursor = self.head;

        while cursor != block_count {
            assert!(
                cursor < block_count,
                "free list contains out-of-bounds block index {cursor}"
            );

            // SAFETY: cursor refers to a vacant block (it is on the list) and the
            // caller holds the free-list state exclusively.
            cursor = unsafe { arena.read_link(cursor) };

            observed = observed.wrapping_add(1);

            assert!(
                observed <= block_count,
                "free list is longer than the arena, indicating a cycle"
            );
        }

        assert!(
            observed == self.free_count,
            "free list length {observed} does not match tracked free count {}",
            self.free_count
        );
    }
}

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    #[test]
    fn initial_list_hands_out_blocks_in_address_order() {
        let arena = Arena::new(32, 3).unwrap();
        let mut list = FreeList::new(&arena);

        assert_eq!(list.free_count(), 3);

        let first = list.pop(&arena).unwrap();
        let second = list.pop(&arena).unwrap();
        let third = list.pop(&arena).unwrap();

        assert_eq!(first, arena.block_ptr(0));
        assert_eq!(second, arena.block_ptr(1));
        assert_eq!(third, arena.block_ptr(2));

        assert_eq!(list.free_count(), 0);
        assert_eq!(list.pop(&arena), None);
    }

    #[test]
    fn push_is_lifo() {
        let arena = Arena::new(32, 2).unwrap();
        let mut list = FreeList::new(&arena);

        let a = list.pop(&arena).unwrap();
        let b = list.pop(&arena).unwrap();

        assert!(list.push(&arena, a));
        assert!(list.push(&arena, b));
        list.integrity_check(&arena);

        // Pushed last, handed out first.
        assert_eq!(list.pop(&arena), Some(b));
        assert_eq!(list.pop(&arena), Some(a));
    }

    #[test]
    fn foreign_pointer_is_rejected_without_mutation() {
        let arena = Arena::new(32, 2).unwrap();
        let mut list = FreeList::new(&arena);

        let stack_local = 0_u32;
        let foreign = NonNull::from(&stack_local).cast::<u8>();

        assert!(!list.push(&arena, foreign));
        assert_eq!(list.free_count(), 2);
        assert_eq!(list.rejected_frees(), 1);
        list.integrity_check(&arena);
    }

    #[test]
    fn interior_pointer_is_rejected() {
        let arena = Arena::new(64, 2).unwrap();
        let mut list = FreeList::new(&arena);

        let block = list.pop(&arena).unwrap();

        // SAFETY: The address is within the popped block.
        let interior = unsafe { block.add(8) };

        assert!(!list.push(&arena, interior));
        assert_eq!(list.free_count(), 1);
        assert_eq!(list.rejected_frees(), 1);

        assert!(list.push(&arena, block));
        assert_eq!(list.free_count(), 2);
    }
}
