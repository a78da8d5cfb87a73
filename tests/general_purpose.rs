//! End-to-end tests for the general purpose composition

use std::sync::Arc;
use std::thread;

use rand::Rng;

use strata_alloc::{Allocator, GeneralPurposeAllocator};

#[test]
fn serves_every_size_class() {
    let gpa = GeneralPurposeAllocator::new().unwrap();

    unsafe {
        let tiny = gpa.allocate(4).unwrap();
        let small = gpa.allocate(100).unwrap();
        let medium = gpa.allocate(2000).unwrap();
        let large = gpa.allocate(100_000).unwrap();
        let huge = gpa.allocate(5_000_000).unwrap();

        for block in [&tiny, &small, &medium, &large, &huge] {
            assert!(!block.is_null());
            std::ptr::write_bytes(block.ptr(), 0x61, block.len());
        }
        assert_eq!(tiny.len(), 4);
        assert_eq!(huge.len(), 5_000_000);

        // independently deallocatable, in arbitrary order
        assert!(gpa.deallocate(medium));
        assert!(gpa.deallocate(tiny));
        assert!(gpa.deallocate(huge));
        assert!(gpa.deallocate(small));
        assert!(gpa.deallocate(large));
    }
}

#[test]
fn zero_size_returns_null_with_no_side_effects() {
    let gpa = GeneralPurposeAllocator::new().unwrap();
    unsafe {
        assert!(gpa.allocate(0).is_err());
    }
}

#[test]
fn freed_small_blocks_are_recycled() {
    let gpa = GeneralPurposeAllocator::new().unwrap();
    unsafe {
        let a = gpa.allocate(100).unwrap();
        let addr = a.addr();
        assert!(gpa.deallocate(a));

        // same size class: served from the free list again
        let b = gpa.allocate(97).unwrap();
        assert_eq!(b.addr(), addr);
        assert!(gpa.deallocate(b));
    }
}

#[test]
fn reallocate_walks_across_size_classes() {
    let gpa = GeneralPurposeAllocator::new().unwrap();
    unsafe {
        let mut block = gpa.allocate(6).unwrap();
        for i in 0..6 {
            *block.ptr().add(i) = i as u8 + 1;
        }

        for new_size in [40usize, 700, 10_000, 5_000_000] {
            assert!(gpa.reallocate(&mut block, new_size));
            assert_eq!(block.len(), new_size);
            for i in 0..6 {
                assert_eq!(*block.ptr().add(i), i as u8 + 1);
            }
        }

        assert!(gpa.reallocate(&mut block, 0));
        assert!(block.is_null());
    }
}

#[test]
fn global_returns_the_same_instance() {
    let a = GeneralPurposeAllocator::global() as *const GeneralPurposeAllocator;
    let b = GeneralPurposeAllocator::global() as *const GeneralPurposeAllocator;
    assert_eq!(a, b);

    unsafe {
        let block = GeneralPurposeAllocator::global().allocate(64).unwrap();
        assert!(GeneralPurposeAllocator::global().deallocate(block));
    }
}

#[test]
fn concurrent_mixed_size_churn() {
    let gpa = Arc::new(GeneralPurposeAllocator::new().unwrap());

    let mut handles = Vec::new();
    for seed in 0..4u8 {
        let gpa = Arc::clone(&gpa);
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut live = Vec::new();
            for _ in 0..300 {
                let size = rng.gen_range(1..=10_000usize);
                let block = unsafe { gpa.allocate(size) }.expect("allocation failed");
                unsafe {
                    *block.ptr() = seed;
                    *block.ptr().add(size - 1) = seed;
                }
                live.push(block);
                if live.len() > 16 {
                    let victim = live.swap_remove(rng.gen_range(0..live.len()));
                    assert!(unsafe { gpa.deallocate(victim) });
                }
            }
            for block in live {
                assert!(unsafe { gpa.deallocate(block) });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
