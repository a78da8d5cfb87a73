//! Fixed-width size-class router
//!
//! Splits the size interval `[min, max]` into `(max - min + 1) / step`
//! buckets, each served by an independent sub-allocator instance. Two
//! requests landing in one bucket share a pool while different buckets
//! never contend. Requests outside the interval fail.
//!
//! Routing back is length-derived: `deallocate`, `owns` and `expand`
//! re-derive the bucket index from the block's recorded length, which is
//! why that length must exactly match the one the allocation recorded.

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::traits::{
    Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move,
};
use crate::utils::round_up_to_multiple;

/// Size-class router over `(max - min + 1) / step` independent buckets
///
/// Bucket `k` serves sizes in `[min + k*step, min - 1 + (k+1)*step]`, all
/// rounded up to the bucket's upper bound.
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, Bucketizer, FreeList, NativeAllocator};
///
/// let buckets = Bucketizer::new(1, 128, 16, |_, hi| {
///     FreeList::new(NativeAllocator::default(), 0, hi)
/// })?;
/// assert_eq!(buckets.bucket_count(), 8);
/// assert_eq!(buckets.good_alloc_size(20), 32);
/// unsafe {
///     let block = buckets.allocate(20)?;
///     assert_eq!(block.len(), 20);
///     assert!(buckets.deallocate(block));
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct Bucketizer<A: Allocator> {
    min: usize,
    max: usize,
    step: usize,
    buckets: Box<[A]>,
}

impl<A: Allocator> Bucketizer<A> {
    /// Creates a bucketizer over `[min, max]` with bucket width `step`.
    ///
    /// The factory is called once per bucket with the bucket's size bounds
    /// and produces that bucket's sub-allocator. Construction validates
    /// `(max - (min - 1)) % step == 0` so the interval divides evenly.
    pub fn new<F>(min: usize, max: usize, step: usize, mut factory: F) -> AllocResult<Self>
    where
        F: FnMut(usize, usize) -> AllocResult<A>,
    {
        if min == 0 {
            return Err(AllocError::invalid_config("min must be at least 1"));
        }
        if step == 0 {
            return Err(AllocError::invalid_config("step must be at least 1"));
        }
        if max < min {
            return Err(AllocError::invalid_config("max below min"));
        }
        if (max - (min - 1)) % step != 0 {
            return Err(AllocError::invalid_config(
                "interval [min, max] does not divide into step-sized buckets",
            ));
        }
        let count = (max - min + 1) / step;
        let mut buckets = Vec::with_capacity(count);
        for k in 0..count {
            let lo = min + k * step;
            let hi = min - 1 + (k + 1) * step;
            buckets.push(factory(lo, hi)?);
        }
        Ok(Self {
            min,
            max,
            step,
            buckets: buckets.into_boxed_slice(),
        })
    }

    /// Lower bound of the served interval
    #[inline]
    pub fn min(&self) -> usize {
        self.min
    }

    /// Upper bound of the served interval
    #[inline]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Bucket width
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of buckets
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The per-bucket sub-allocators, lowest size class first
    #[inline]
    pub fn buckets(&self) -> &[A] {
        &self.buckets
    }

    #[inline]
    fn in_range(&self, size: usize) -> bool {
        size >= self.min && size <= self.max
    }

    #[inline]
    fn index(&self, size: usize) -> usize {
        (size - self.min) / self.step
    }
}

// SAFETY: every in-range request reserves good_alloc_size(n) bytes from its
// bucket, so the length-derived route back lands in the bucket that issued
// the reservation.
unsafe impl<A: Allocator> Allocator for Bucketizer<A> {
    #[inline]
    fn alignment(&self) -> usize {
        self.buckets[0].alignment()
    }

    fn good_alloc_size(&self, size: usize) -> usize {
        if self.in_range(size) {
            (self.min - 1) + round_up_to_multiple(size - (self.min - 1), self.step)
        } else {
            size
        }
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        if !self.in_range(size) {
            return Err(AllocError::out_of_bounds(size, self.min, self.max));
        }
        let rounded = self.good_alloc_size(size);
        let block = unsafe { self.buckets[self.index(size)].allocate(rounded)? };
        Ok(Block::from_raw_parts(block.ptr(), size))
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        if !self.in_range(block.len()) {
            return false;
        }
        let rounded = self.good_alloc_size(block.len());
        let bucket = &self.buckets[self.index(block.len())];
        unsafe { bucket.deallocate(Block::from_raw_parts(block.ptr(), rounded)) }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        if !block.is_null()
            && new_size != 0
            && self.in_range(block.len())
            && self.in_range(new_size)
            && self.good_alloc_size(block.len()) == self.good_alloc_size(new_size)
        {
            // same bucket: the reservation already covers the new length
            block.set_len(new_size);
            return true;
        }
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

// SAFETY: growth is confined to the slack of the block's current bucket, so
// the reservation is untouched and future length-derived routing still
// lands in the same bucket.
unsafe impl<A: Allocator> Expand for Bucketizer<A> {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        if block.is_null() || !self.in_range(block.len()) {
            return false;
        }
        let Some(new_len) = block.len().checked_add(delta) else {
            return false;
        };
        if new_len > self.max {
            return false;
        }
        if self.good_alloc_size(new_len) != self.good_alloc_size(block.len()) {
            return false;
        }
        block.set_len(new_len);
        true
    }
}

// SAFETY: forwards to every bucket; a block from any bucket is invalidated
// by its own bucket's release.
unsafe impl<A: DeallocateAll> DeallocateAll for Bucketizer<A> {
    unsafe fn deallocate_all(&self) -> bool {
        let mut all = true;
        for bucket in &self.buckets {
            all &= unsafe { bucket.deallocate_all() };
        }
        all
    }
}

impl<A: Allocator + Owns> Owns for Bucketizer<A> {
    fn owns(&self, block: &Block) -> Ownership {
        if block.is_null() || !self.in_range(block.len()) {
            return Ownership::NotOwned;
        }
        let rounded = self.good_alloc_size(block.len());
        self.buckets[self.index(block.len())]
            .owns(&Block::from_raw_parts(block.ptr(), rounded))
    }
}
