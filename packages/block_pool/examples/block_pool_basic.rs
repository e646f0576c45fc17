//! Demonstrates basic usage of `BlockPool`.
//!
//! This example shows pool construction, the single-size-class allocation
//! contract, LIFO reuse of released blocks, and what happens on exhaustion.

use block_pool::BlockPool;

fn main() {
    println!("Example 1: Allocation and release");
    println!("---------------------------------");

    let pool = BlockPool::builder()
        .chunk_size(64)
        .block_count(4)
        .build()
        .expect("pool parameters are valid");

    println!(
        "Built pool: {} blocks of {} bytes, {} free",
        pool.capacity(),
        pool.chunk_size(),
        pool.free_count()
    );

    let block = pool.alloc(40, 8).expect("pool has free blocks");
    println!(
        "Allocated one block at {block:p}; {} free remain",
        pool.free_count()
    );

    // The pool hands out raw, uninitialized memory.
    // SAFETY: The block is exclusively ours and valid for 64 bytes.
    unsafe {
        block.as_ptr().write_bytes(0xAB, 40);
    }

    pool.free(block);
    println!("Released it; {} free again", pool.free_count());
    println!();

    println!("Example 2: Exhaustion and LIFO reuse");
    println!("------------------------------------");

    let blocks: Vec<_> = (0..pool.capacity())
        .map(|_| pool.alloc(64, 64).expect("pool was idle"))
        .collect();

    println!("Allocated all {} blocks", blocks.len());
    println!("One more? {:?}", pool.alloc(8, 8)); // None: exhausted, not an error.

    let last = *blocks.last().expect("we allocated at least one block");
    pool.free(last);

    let reused = pool.alloc(8, 8).expect("a block was just released");
    println!("Released {last:p}, got back {reused:p} (same block, LIFO)");

    // Release everything under a single lock acquisition.
    pool.free_batch(blocks.iter().copied().filter(|block| *block != reused));
    pool.free(reused);
    println!("All released; {} free", pool.free_count());
    println!();

    println!("Example 3: Refused requests");
    println!("---------------------------");

    println!("size 0:        {:?}", pool.alloc(0, 8));
    println!("size 128 > 64: {:?}", pool.alloc(128, 8));
    println!("align 3:       {:?}", pool.alloc(8, 3));
    println!("align 128:     {:?}", pool.alloc(8, 128));
    println!(
        "Nothing was consumed by the refusals: {} free",
        pool.free_count()
    );
}
