//! A thread-safe memory pool of fixed-size blocks with O(1) allocation and release.
//!
//! This crate provides [`BlockPool`], a preallocated arena divided into equal-sized
//! chunks, handed out and reclaimed in constant time via an intrusive free list.
//! It serves callers that need many same-sized allocations with predictable latency
//! and no fragmentation, avoiding a general-purpose allocator's bookkeeping and
//! lock contention on hot paths.
//!
//! # Key features
//!
//! - **Fixed capacity**: one contiguous arena of `chunk_size * block_count` bytes,
//!   allocated up front; capacity never changes after construction
//! - **One size class**: every block is `chunk_size` bytes; any request that fits
//!   (size and alignment up to the chunk size) is satisfied by one whole block
//! - **O(1) allocate and release**: vacant blocks form an intrusive singly-linked
//!   list threaded through their own memory; both operations are a head splice
//! - **Thread-safe**: the pool is [`Send`] and [`Sync`] and is shared by reference;
//!   one internal mutex serializes free-list access, held only for the splice
//! - **Graceful refusal**: invalid requests and exhaustion yield `None`, invalid
//!   releases are absorbed (and counted) - no operation on a built pool can fail
//!   loudly
//!
//! # Example
//!
//! ```rust
//! use block_pool::BlockPool;
//!
//! let pool = BlockPool::builder().chunk_size(64).block_count(128).build()?;
//!
//! // Any request that fits the size class succeeds while blocks remain.
//! let block = pool.alloc(40, 8).expect("pool is not exhausted");
//!
//! // The pool hands out raw memory; what happens inside the block between
//! // alloc and free is entirely the caller's business.
//! // SAFETY: The block is exclusively ours and valid for 64 bytes.
//! unsafe {
//!     block.as_ptr().write_bytes(0, 40);
//! }
//!
//! pool.free(block);
//! # Ok::<(), block_pool::InitError>(())
//! ```
//!
//! # Relationship to general-purpose allocation
//!
//! The pool is not a general-purpose allocator; it is a narrow tool for workloads
//! that allocate many objects of one known size. Exhaustion is an expected, cheap
//! outcome (the caller may retry after a release elsewhere or fall back to the
//! global allocator), not an error condition.
//!
//! Construction is the only fallible operation, reported via [`InitError`].
//! Teardown is simply dropping the pool, which releases the arena wholesale;
//! the type system makes use-after-teardown impossible.

mod arena;
mod builder;
mod error;
mod free_list;
mod pool;

pub(crate) use arena::*;
pub use builder::*;
pub use error::*;
pub(crate) use free_list::*;
pub use pool::BlockPool;
