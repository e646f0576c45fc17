use thiserror::Error;

/// Errors that can occur when constructing a [`BlockPool`][crate::BlockPool].
///
/// Construction either succeeds completely or fails with one of these variants,
/// leaving no resources behind. Allocation and release on an existing pool never
/// produce errors; refusal is signaled via `Option` and invalid releases are
/// silently absorbed.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum InitError {
    /// The caller requested a pool with zero blocks. A pool has a fixed capacity
    /// set at construction time, so an empty pool could never satisfy any request.
    #[error("block count must be greater than zero")]
    ZeroBlockCount,

    /// The requested chunk size is not a power of two. The arena is aligned to the
    /// chunk size, which the allocator only supports for powers of two.
    #[error("chunk size {chunk_size} is not a power of two")]
    ChunkSizeNotPowerOfTwo {
        /// The chunk size the caller requested.
        chunk_size: usize,
    },

    /// The requested chunk size cannot hold a free-list link word. Vacant blocks
    /// store the index of the next vacant block in their first bytes, so every
    /// block must be at least one `usize` wide.
    #[error("chunk size {chunk_size} is smaller than a free-list link ({minimum} bytes)")]
    ChunkSizeTooSmall {
        /// The chunk size the caller requested.
        chunk_size: usize,

        /// The smallest chunk size the pool supports on this platform.
        minimum: usize,
    },

    /// The total arena size `chunk_size * block_count` does not fit in the address
    /// space, so no allocation of that size could ever succeed.
    #[error("arena of {block_count} blocks of {chunk_size} bytes exceeds addressable memory")]
    ArenaTooLarge {
        /// The chunk size the caller requested.
        chunk_size: usize,

        /// The block count the caller requested.
        block_count: usize,
    },

    /// The system allocator could not provide the arena buffer.
    #[error("failed to allocate an arena of {size} bytes")]
    AllocationFailed {
        /// The total arena size that was requested, in bytes.
        size: usize,
    },
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(InitError: Send, Sync, Debug);

    #[test]
    fn variants_render_their_parameters() {
        let error = InitError::ChunkSizeNotPowerOfTwo { chunk_size: 48 };
        assert!(error.to_string().contains("48"));

        let error = InitError::ChunkSizeTooSmall {
            chunk_size: 4,
            minimum: 8,
        };
        assert!(error.to_string().contains('4'));
        assert!(error.to_string().contains('8'));

        let error = InitError::AllocationFailed { size: 1024 };
        assert!(error.to_string().contains("1024"));
    }

    #[test]
    fn zero_block_count_is_error() {
        let error = InitError::ZeroBlockCount;

        // Verify it can be used in a Result context.
        let result: Result<(), InitError> = Err(error);
        assert!(result.is_err());
    }
}
