//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use block_pool::BlockPool;
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const CHUNK_SIZE: usize = 64;
const BLOCK_COUNT: usize = 1024;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_basic");

    group.bench_function("build_and_drop", |b| {
        b.iter(|| {
            drop(black_box(
                BlockPool::builder()
                    .chunk_size(CHUNK_SIZE)
                    .block_count(BLOCK_COUNT)
                    .build()
                    .unwrap(),
            ));
        });
    });

    group.bench_function("alloc_free_cycle", |b| {
        let pool = BlockPool::builder()
            .chunk_size(CHUNK_SIZE)
            .block_count(BLOCK_COUNT)
            .build()
            .unwrap();

        b.iter(|| {
            let block = pool.alloc(48, 8).unwrap();
            pool.free(black_box(block));
        });
    });

    group.bench_function("exhaust_and_refill", |b| {
        let pool = BlockPool::builder()
            .chunk_size(CHUNK_SIZE)
            .block_count(BLOCK_COUNT)
            .build()
            .unwrap();

        let mut blocks = Vec::with_capacity(BLOCK_COUNT);

        b.iter(|| {
            for _ in 0..BLOCK_COUNT {
                blocks.push(pool.alloc(48, 8).unwrap());
            }

            pool.free_batch(blocks.drain(..));
        });
    });

    group.finish();
}
