//! Bump allocation throughput: sequential region vs lock-free shared region

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use strata_alloc::{Allocator, DeallocateAll, GeneralPurposeAllocator, Region, SharedRegion};

const CAPACITY: usize = 1 << 20;

fn bench_region(c: &mut Criterion) {
    let region = Region::new(CAPACITY).unwrap();
    c.bench_function("region/allocate_64", |b| {
        b.iter(|| {
            unsafe {
                let block = region.allocate(black_box(64)).unwrap();
                black_box(block.ptr());
                region.deallocate(block);
            };
        })
    });
}

fn bench_shared_region(c: &mut Criterion) {
    let region = SharedRegion::new(CAPACITY).unwrap();
    c.bench_function("shared_region/allocate_64", |b| {
        b.iter(|| {
            unsafe {
                let block = region.allocate(black_box(64)).unwrap();
                black_box(block.ptr());
                region.deallocate(block);
            };
        })
    });
}

fn bench_shared_region_reset_cycle(c: &mut Criterion) {
    let region = SharedRegion::new(CAPACITY).unwrap();
    c.bench_function("shared_region/fill_then_reset", |b| {
        b.iter(|| {
            unsafe {
                while let Ok(block) = region.allocate(4096) {
                    black_box(block.ptr());
                }
                region.deallocate_all();
            };
        })
    });
}

fn bench_general_purpose(c: &mut Criterion) {
    let gpa = GeneralPurposeAllocator::new().unwrap();
    c.bench_function("general_purpose/allocate_100", |b| {
        b.iter(|| {
            unsafe {
                let block = gpa.allocate(black_box(100)).unwrap();
                black_box(block.ptr());
                gpa.deallocate(block);
            };
        })
    });
}

criterion_group!(
    benches,
    bench_region,
    bench_shared_region,
    bench_shared_region_reset_cycle,
    bench_general_purpose
);
criterion_main!(benches);
