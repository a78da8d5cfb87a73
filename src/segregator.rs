//! Threshold router over two allocators
//!
//! Binary dispatch on request size: `size <= threshold` goes to the small
//! branch, everything else to the large branch. Either branch may itself be
//! a `Segregator`, so more than two branches compose by nesting; arranging
//! the nest as a balanced binary tree keeps routing depth at O(log k) for k
//! thresholds, which is how [`GeneralPurposeAllocator`] builds its
//! size-class table.
//!
//! Routing back is length-derived, like the rest of the framework: a
//! block's recorded length decides which branch sees `deallocate`, `owns`
//! and `expand`. Capabilities are exposed only when both branches implement
//! them, resolved entirely by trait bounds.
//!
//! [`GeneralPurposeAllocator`]: crate::GeneralPurposeAllocator

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::traits::{
    AlignedAllocator, Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move,
};

/// Size router: requests at or below the threshold go to `small`, the rest
/// to `large`
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, Region, Segregator};
///
/// let router = Segregator::new(512, Region::new(4096)?, Region::new(65536)?);
/// unsafe {
///     let a = router.allocate(512)?; // small branch
///     let b = router.allocate(513)?; // large branch
///     assert!(router.deallocate(b));
///     assert!(router.deallocate(a));
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct Segregator<S: Allocator, L: Allocator> {
    threshold: usize,
    small: S,
    large: L,
}

impl<S: Allocator, L: Allocator> Segregator<S, L> {
    /// Creates a router splitting requests at `threshold`
    pub fn new(threshold: usize, small: S, large: L) -> Self {
        Self {
            threshold,
            small,
            large,
        }
    }

    /// The size threshold separating the branches
    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The branch serving sizes at or below the threshold
    #[inline]
    pub fn small(&self) -> &S {
        &self.small
    }

    /// The branch serving sizes above the threshold
    #[inline]
    pub fn large(&self) -> &L {
        &self.large
    }

    #[inline]
    fn is_small(&self, size: usize) -> bool {
        size <= self.threshold
    }
}

// SAFETY: every operation routes on the same size the original allocation
// routed on (the recorded length), so blocks always return to the branch
// that issued them.
unsafe impl<S: Allocator, L: Allocator> Allocator for Segregator<S, L> {
    #[inline]
    fn alignment(&self) -> usize {
        self.small.alignment().min(self.large.alignment())
    }

    fn good_alloc_size(&self, size: usize) -> usize {
        if self.is_small(size) {
            self.small.good_alloc_size(size)
        } else {
            self.large.good_alloc_size(size)
        }
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        if self.is_small(size) {
            unsafe { self.small.allocate(size) }
        } else {
            unsafe { self.large.allocate(size) }
        }
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        if self.is_small(block.len()) {
            unsafe { self.small.deallocate(block) }
        } else {
            unsafe { self.large.deallocate(block) }
        }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        if !block.is_null() && new_size != 0 {
            let old_small = self.is_small(block.len());
            let new_small = self.is_small(new_size);
            if old_small && new_small {
                return unsafe { self.small.reallocate(block, new_size) };
            }
            if !old_small && !new_small {
                return unsafe { self.large.reallocate(block, new_size) };
            }
            // the sizes straddle the threshold: move across the router,
            // never assuming in-place behavior across the boundary
        }
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

// SAFETY: routes on the request size like allocate; alignment guarantees
// come from the branch that serves the request.
unsafe impl<S: AlignedAllocator, L: AlignedAllocator> AlignedAllocator for Segregator<S, L> {
    unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        if self.is_small(size) {
            unsafe { self.small.aligned_allocate(size, align) }
        } else {
            unsafe { self.large.aligned_allocate(size, align) }
        }
    }
}

// SAFETY: growth that would carry the length across the threshold is
// refused outright: the grown block would re-route to the other branch on
// its next operation.
unsafe impl<S: Expand, L: Expand> Expand for Segregator<S, L> {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        if block.is_null() {
            return false;
        }
        let Some(new_len) = block.len().checked_add(delta) else {
            return false;
        };
        if self.is_small(block.len()) {
            if !self.is_small(new_len) {
                return false;
            }
            unsafe { self.small.expand(block, delta) }
        } else {
            unsafe { self.large.expand(block, delta) }
        }
    }
}

// SAFETY: forwards to both branches; together they cover every block this
// router ever issued.
unsafe impl<S: DeallocateAll, L: DeallocateAll> DeallocateAll for Segregator<S, L> {
    unsafe fn deallocate_all(&self) -> bool {
        let small = unsafe { self.small.deallocate_all() };
        let large = unsafe { self.large.deallocate_all() };
        small && large
    }
}

impl<S: Allocator + Owns, L: Allocator + Owns> Owns for Segregator<S, L> {
    fn owns(&self, block: &Block) -> Ownership {
        if block.is_null() {
            return Ownership::NotOwned;
        }
        if self.is_small(block.len()) {
            self.small.owns(block)
        } else {
            self.large.owns(block)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Region, RegionConfig};

    fn region(capacity: usize) -> Region {
        Region::with_config(
            capacity,
            RegionConfig {
                alignment: 8,
                grow_downwards: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn alignment_is_branch_minimum() {
        let router = Segregator::new(
            64,
            Region::with_config(
                1024,
                RegionConfig {
                    alignment: 8,
                    grow_downwards: false,
                },
            )
            .unwrap(),
            Region::with_config(
                1024,
                RegionConfig {
                    alignment: 32,
                    grow_downwards: false,
                },
            )
            .unwrap(),
        );
        assert_eq!(router.alignment(), 8);
    }

    #[test]
    fn threshold_crossing_expand_is_refused() {
        let router = Segregator::new(64, region(1024), region(1024));
        unsafe {
            let mut block = router.allocate(60).unwrap();
            assert!(!router.expand(&mut block, 10));
            assert_eq!(block.len(), 60);
            assert!(router.expand(&mut block, 4));
            assert_eq!(block.len(), 64);
            assert!(router.deallocate(block));
        }
    }

    #[test]
    fn zero_size_is_rejected_before_routing() {
        let router = Segregator::new(64, region(1024), region(1024));
        unsafe {
            assert!(matches!(router.allocate(0), Err(AllocError::ZeroSize)));
        }
        assert_eq!(router.small().used(), 0);
        assert_eq!(router.large().used(), 0);
    }
}
