//! Threshold routing tests for the segregator

use strata_alloc::{
    Allocator, BorrowedRegion, DeallocateAll, Owns, Ownership, Region, RegionConfig, Segregator,
};

const CFG: RegionConfig = RegionConfig {
    alignment: 1,
    grow_downwards: false,
};

#[test]
fn threshold_routing_lands_in_the_right_backing_memory() {
    let mut small_buf = vec![0u8; 4096];
    let mut large_buf = vec![0u8; 4096];
    let small_range = {
        let base = small_buf.as_ptr() as usize;
        base..base + small_buf.len()
    };
    let large_range = {
        let base = large_buf.as_ptr() as usize;
        base..base + large_buf.len()
    };

    let router = Segregator::new(
        512,
        BorrowedRegion::with_config(&mut small_buf, CFG).unwrap(),
        BorrowedRegion::with_config(&mut large_buf, CFG).unwrap(),
    );

    unsafe {
        let at_500 = router.allocate(500).unwrap();
        let at_512 = router.allocate(512).unwrap();
        let at_513 = router.allocate(513).unwrap();

        assert!(small_range.contains(&at_500.addr()));
        assert!(small_range.contains(&at_512.addr()));
        assert!(large_range.contains(&at_513.addr()));

        // length-derived routing sends each block back to its branch
        assert!(router.deallocate(at_513));
        assert!(router.deallocate(at_512));
        assert_eq!(router.small().used(), 500);
        assert_eq!(router.large().used(), 0);
    }
}

#[test]
fn cross_branch_reallocate_moves_and_preserves_contents() {
    let mut small_buf = vec![0u8; 4096];
    let mut large_buf = vec![0u8; 4096];
    let large_base = large_buf.as_ptr() as usize;

    let router = Segregator::new(
        512,
        BorrowedRegion::with_config(&mut small_buf, CFG).unwrap(),
        BorrowedRegion::with_config(&mut large_buf, CFG).unwrap(),
    );

    unsafe {
        let mut block = router.allocate(400).unwrap();
        for i in 0..400 {
            *block.ptr().add(i) = (i % 251) as u8;
        }

        // grows across the threshold: allocate-copy-deallocate through the
        // whole router
        assert!(router.reallocate(&mut block, 600));
        assert_eq!(block.len(), 600);
        assert!(block.addr() >= large_base && block.addr() < large_base + 4096);
        for i in 0..400 {
            assert_eq!(*block.ptr().add(i), (i % 251) as u8);
        }
        // the small branch got its bytes back (the moved block was its tail)
        assert_eq!(router.small().used(), 0);

        // shrinking back across the threshold moves again
        assert!(router.reallocate(&mut block, 100));
        assert_eq!(block.len(), 100);
        assert_eq!(router.large().used(), 0);
        for i in 0..100 {
            assert_eq!(*block.ptr().add(i), (i % 251) as u8);
        }
    }
}

#[test]
fn nested_routers_form_more_than_two_branches() {
    let tiny = Region::with_config(4096, CFG).unwrap();
    let medium = Region::with_config(4096, CFG).unwrap();
    let big = Region::with_config(4096, CFG).unwrap();

    // three branches from two nested routers: <=64, 65..=512, larger
    let router = Segregator::new(64, tiny, Segregator::new(512, medium, big));

    unsafe {
        let a = router.allocate(64).unwrap();
        let b = router.allocate(65).unwrap();
        let c = router.allocate(513).unwrap();

        assert_eq!(router.small().owns(&a), Ownership::Owned);
        assert_eq!(router.large().small().owns(&b), Ownership::Owned);
        assert_eq!(router.large().large().owns(&c), Ownership::Owned);

        assert_eq!(router.owns(&a), Ownership::Owned);
        assert!(router.deallocate(c));
        assert!(router.deallocate(b));
        assert!(router.deallocate(a));
    }
}

#[test]
fn capability_gating_composes_with_regions() {
    let router = Segregator::new(
        64,
        Region::with_config(4096, CFG).unwrap(),
        Region::with_config(4096, CFG).unwrap(),
    );

    unsafe {
        let _ = router.allocate(10).unwrap();
        let _ = router.allocate(100).unwrap();
        assert!(router.deallocate_all());
    }
    assert_eq!(router.small().used(), 0);
    assert_eq!(router.large().used(), 0);
}

#[test]
fn good_alloc_size_routes_like_allocate() {
    let router = Segregator::new(
        64,
        Region::with_config(
            4096,
            RegionConfig {
                alignment: 16,
                grow_downwards: false,
            },
        )
        .unwrap(),
        Region::with_config(
            4096,
            RegionConfig {
                alignment: 64,
                grow_downwards: false,
            },
        )
        .unwrap(),
    );

    // small branch rounds to 16, large branch to 64
    assert_eq!(router.good_alloc_size(10), 16);
    assert_eq!(router.good_alloc_size(100), 128);
    assert_eq!(router.alignment(), 16);
}
