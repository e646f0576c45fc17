use std::cell::Cell;
use std::marker::PhantomData;

use crate::{BlockPool, InitError};

/// Builder for creating an instance of [`BlockPool`].
///
/// [`BlockPool`] requires both the chunk size (bytes per block) and the block
/// count to be specified at construction time; there are no optional settings.
///
/// Forgetting to set one of them is a programming error and causes `.build()`
/// to panic. Setting them to *invalid* values (zero blocks, a chunk size that
/// is not a power of two or too small to hold a free-list link, an arena that
/// cannot be allocated) is reported as an [`InitError`] instead, because those
/// conditions can depend on the platform and on available memory.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::builder().chunk_size(64).block_count(16).build()?;
///
/// assert_eq!(pool.capacity(), 16);
/// # Ok::<(), block_pool::InitError>(())
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between
/// threads, allowing pool configuration to happen on a different thread than
/// where the pool is used. However, it is not thread-safe ([`Sync`]) as it
/// contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    chunk_size: Option<usize>,
    block_count: Option<usize>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            chunk_size: None,
            block_count: None,
            _not_sync: PhantomData,
        }
    }

    /// Sets the size in bytes of each block in the pool.
    ///
    /// Must be a power of two and at least as large as a pointer, so that a
    /// vacant block can hold its free-list link; violations are reported by
    /// [`build()`](Self::build).
    #[inline]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Sets the number of blocks in the pool.
    ///
    /// This is the pool's total and final capacity - the arena never grows.
    /// Must be greater than zero; violations are reported by
    /// [`build()`](Self::build).
    #[inline]
    pub fn block_count(mut self, block_count: usize) -> Self {
        self.block_count = Some(block_count);
        self
    }

    /// Builds the block pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`InitError`] when the configured values violate the pool's
    /// preconditions or when the arena cannot be allocated. Failure leaves
    /// nothing behind - no partial pool, no leaked buffer.
    ///
    /// # Panics
    ///
    /// Panics if the chunk size or the block count has not been set.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::{BlockPool, InitError};
    ///
    /// let pool = BlockPool::builder().chunk_size(32).block_count(4).build()?;
    /// assert_eq!(pool.free_count(), 4);
    ///
    /// // 48 is not a power of two.
    /// let result = BlockPool::builder().chunk_size(48).block_count(4).build();
    /// assert_eq!(
    ///     result.unwrap_err(),
    ///     InitError::ChunkSizeNotPowerOfTwo { chunk_size: 48 }
    /// );
    /// # Ok::<(), block_pool::InitError>(())
    /// ```
    pub fn build(self) -> Result<BlockPool, InitError> {
        let chunk_size = self
            .chunk_size
            .expect("chunk size must be set using .chunk_size() before calling .build()");

        let block_count = self
            .block_count
            .expect("block count must be set using .block_count() before calling .build()");

        BlockPool::new_inner(chunk_size, block_count)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    // Test trait implementations.
    assert_impl_all!(BlockPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(BlockPoolBuilder: Sync);

    #[test]
    fn new_creates_default_state() {
        let builder = BlockPoolBuilder::new();
        assert!(builder.chunk_size.is_none());
        assert!(builder.block_count.is_none());
    }

    #[test]
    fn settings_can_be_overridden() {
        let builder = BlockPoolBuilder::new()
            .chunk_size(32)
            .chunk_size(64)
            .block_count(2)
            .block_count(8);

        assert_eq!(builder.chunk_size, Some(64));
        assert_eq!(builder.block_count, Some(8));
    }

    #[test]
    fn chain_order_independence() {
        let pool1 = BlockPoolBuilder::new()
            .chunk_size(32)
            .block_count(4)
            .build()
            .unwrap();

        let pool2 = BlockPoolBuilder::new()
            .block_count(4)
            .chunk_size(32)
            .build()
            .unwrap();

        assert_eq!(pool1.chunk_size(), pool2.chunk_size());
        assert_eq!(pool1.capacity(), pool2.capacity());
    }

    #[test]
    fn build_rejects_zero_block_count() {
        let result = BlockPoolBuilder::new().chunk_size(32).block_count(0).build();
        assert_eq!(result.unwrap_err(), InitError::ZeroBlockCount);
    }

    #[test]
    fn build_rejects_non_power_of_two_chunk_size() {
        let result = BlockPoolBuilder::new().chunk_size(48).block_count(4).build();
        assert_eq!(
            result.unwrap_err(),
            InitError::ChunkSizeNotPowerOfTwo { chunk_size: 48 }
        );

        // Zero is not a power of two either.
        let result = BlockPoolBuilder::new().chunk_size(0).block_count(4).build();
        assert_eq!(
            result.unwrap_err(),
            InitError::ChunkSizeNotPowerOfTwo { chunk_size: 0 }
        );
    }

    #[test]
    fn build_rejects_chunk_size_below_link_width() {
        let result = BlockPoolBuilder::new().chunk_size(4).block_count(4).build();

        // On every supported platform a pointer is wider than 4 bytes.
        if size_of::<usize>() > 4 {
            assert_eq!(
                result.unwrap_err(),
                InitError::ChunkSizeTooSmall {
                    chunk_size: 4,
                    minimum: size_of::<usize>(),
                }
            );
        } else {
            drop(result.unwrap());
        }
    }

    #[test]
    fn build_rejects_overflowing_arena() {
        // Derived from the pointer width so the overflow occurs on every target.
        const CHUNK_SIZE: usize = 1 << (usize::BITS - 8);
        const BLOCK_COUNT: usize = usize::MAX >> 4;

        let result = BlockPoolBuilder::new()
            .chunk_size(CHUNK_SIZE)
            .block_count(BLOCK_COUNT)
            .build();

        assert_eq!(
            result.unwrap_err(),
            InitError::ArenaTooLarge {
                chunk_size: CHUNK_SIZE,
                block_count: BLOCK_COUNT,
            }
        );
    }

    #[test]
    #[should_panic]
    fn build_without_chunk_size_panics() {
        _ = BlockPoolBuilder::new().block_count(4).build();
    }

    #[test]
    #[should_panic]
    fn build_without_block_count_panics() {
        _ = BlockPoolBuilder::new().chunk_size(32).build();
    }

    #[test]
    fn builder_is_debug() {
        let builder = BlockPoolBuilder::new().chunk_size(32);
        let debug_output = format!("{builder:?}");
        assert!(debug_output.contains("BlockPoolBuilder"));
    }

    #[test]
    fn builder_send_trait() {
        // Verify builder can be moved between threads.
        let builder = BlockPoolBuilder::new().chunk_size(64).block_count(4);
        let handle = std::thread::spawn(move || builder.build());
        let _pool = handle
            .join()
            .expect("thread completed successfully")
            .unwrap();
    }
}
