//! Size-class routing tests for the bucketizer

use proptest::prelude::*;

use strata_alloc::{
    Allocator, Bucketizer, DeallocateAll, Expand, FreeList, NativeAllocator, Owns, Ownership,
    Region, RegionConfig,
};

fn freelist_buckets(min: usize, max: usize, step: usize) -> Bucketizer<FreeList<NativeAllocator>> {
    Bucketizer::new(min, max, step, |_, hi| {
        FreeList::new(NativeAllocator::default(), 0, hi)
    })
    .expect("failed to create bucketizer")
}

/// Buckets over regions make the per-bucket pools observable by address.
fn region_buckets(min: usize, max: usize, step: usize) -> Bucketizer<Region> {
    Bucketizer::new(min, max, step, |_, hi| {
        Region::with_config(
            hi * 64,
            RegionConfig {
                alignment: 1,
                grow_downwards: false,
            },
        )
    })
    .expect("failed to create bucketizer")
}

#[test]
fn requests_round_to_their_bucket_top() {
    let b = freelist_buckets(1, 128, 16);
    assert_eq!(b.bucket_count(), 8);
    for n in 1..=16 {
        assert_eq!(b.good_alloc_size(n), 16);
    }
    assert_eq!(b.good_alloc_size(17), 32);
    assert_eq!(b.good_alloc_size(113), 128);
    assert_eq!(b.good_alloc_size(128), 128);
}

#[test]
fn same_bucket_shares_a_pool_and_buckets_never_mix() {
    let b = region_buckets(1, 96, 32);

    unsafe {
        let a1 = b.allocate(10).unwrap(); // bucket 0
        let a2 = b.allocate(30).unwrap(); // bucket 0
        let c = b.allocate(70).unwrap(); // bucket 2

        let bucket0 = &b.buckets()[0];
        let bucket2 = &b.buckets()[2];
        assert_eq!(bucket0.owns(&strata_alloc::Block::from_raw_parts(a1.ptr(), 32)), Ownership::Owned);
        assert_eq!(bucket0.owns(&strata_alloc::Block::from_raw_parts(a2.ptr(), 32)), Ownership::Owned);
        assert_eq!(bucket2.owns(&strata_alloc::Block::from_raw_parts(c.ptr(), 96)), Ownership::Owned);
        assert_eq!(bucket0.used(), 64);
        assert_eq!(bucket2.used(), 96);

        // length-derived routing returns each block to the bucket that
        // served it: c is bucket 2's tail allocation and reclaims there
        assert!(b.deallocate(c));
        assert_eq!(bucket2.used(), 0);
        assert_eq!(bucket0.used(), 64);
    }
}

#[test]
fn out_of_range_requests_fail() {
    let b = freelist_buckets(1, 128, 16);
    unsafe {
        assert!(b.allocate(0).is_err());
        assert!(b.allocate(129).is_err());
    }
    // a foreign length is never claimed
    let mut storage = [0u8; 512];
    let foreign = strata_alloc::Block::from_raw_parts(storage.as_mut_ptr(), 512);
    assert_eq!(b.owns(&foreign), Ownership::NotOwned);
    unsafe {
        assert!(!b.deallocate(foreign));
    }
}

#[test]
fn freed_blocks_are_reused_within_their_bucket() {
    let b = freelist_buckets(1, 128, 16);
    unsafe {
        let first = b.allocate(20).unwrap();
        let addr = first.addr();
        assert!(b.deallocate(first));

        // a different size from the same bucket reuses the cached node
        let second = b.allocate(30).unwrap();
        assert_eq!(second.addr(), addr);

        // a size from another bucket does not
        let third = b.allocate(50).unwrap();
        assert_ne!(third.addr(), addr);

        assert!(b.deallocate(second));
        assert!(b.deallocate(third));
    }
}

#[test]
fn expand_is_confined_to_the_bucket_slack() {
    let b = freelist_buckets(1, 128, 16);
    unsafe {
        let mut block = b.allocate(20).unwrap();
        assert!(b.expand(&mut block, 0));
        assert!(b.expand(&mut block, 12));
        assert_eq!(block.len(), 32);
        // one more byte would change buckets
        assert!(!b.expand(&mut block, 1));
        assert!(b.deallocate(block));
    }
}

#[test]
fn reallocate_within_a_bucket_stays_put() {
    let b = freelist_buckets(1, 128, 16);
    unsafe {
        let mut block = b.allocate(17).unwrap();
        let addr = block.addr();
        std::ptr::write_bytes(block.ptr(), 0x44, 17);

        assert!(b.reallocate(&mut block, 32));
        assert_eq!(block.addr(), addr);

        // crossing buckets moves and preserves contents
        assert!(b.reallocate(&mut block, 100));
        assert_ne!(block.addr(), addr);
        assert_eq!(*block.ptr().add(16), 0x44);

        assert!(b.deallocate(block));
    }
}

#[test]
fn deallocate_all_forwards_to_every_bucket() {
    let b = region_buckets(1, 96, 32);
    unsafe {
        let _ = b.allocate(10).unwrap();
        let _ = b.allocate(40).unwrap();
        let _ = b.allocate(70).unwrap();
        assert!(b.deallocate_all());
    }
    for bucket in b.buckets() {
        assert_eq!(bucket.used(), 0);
    }
}

proptest! {
    #[test]
    fn good_alloc_size_covers_the_request(n in 1usize..=3584) {
        let b = freelist_buckets(1, 3584, 16);
        prop_assert!(b.good_alloc_size(n) >= n);
    }

    #[test]
    fn good_alloc_size_is_idempotent(n in 1usize..=3584) {
        let b = freelist_buckets(1, 3584, 16);
        let g = b.good_alloc_size(n);
        prop_assert_eq!(b.good_alloc_size(g), g);
    }

    #[test]
    fn good_alloc_size_is_monotonic(n in 1usize..3584) {
        let b = freelist_buckets(1, 3584, 16);
        prop_assert!(b.good_alloc_size(n) <= b.good_alloc_size(n + 1));
    }

    #[test]
    fn allocation_length_matches_request(n in 1usize..=512) {
        let b = freelist_buckets(1, 512, 32);
        unsafe {
            let block = b.allocate(n).unwrap();
            prop_assert_eq!(block.len(), n);
            prop_assert!(b.deallocate(block));
        }
    }
}
