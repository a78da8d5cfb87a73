//! Growable pool of bump regions
//!
//! Serves medium-large requests from a set of fixed-size [`Region`]s,
//! growing the set when no existing region can satisfy a request. Each
//! region's live-allocation count is tracked; a region whose count returns
//! to zero is rewound wholesale, and surplus empty regions are released
//! back to the parent once at least two sit empty, always keeping one
//! spare for the next burst.
//!
//! The list is guarded by a mutex held only for cursor and list
//! bookkeeping, never across a parent allocation, so the parent call that
//! creates a new region happens outside the critical section.

use parking_lot::Mutex;

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::native::NativeAllocator;
use crate::region::{Region, RegionConfig};
use crate::traits::{
    Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move,
};

struct RegionEntry<A: Allocator> {
    region: Region<A>,
    live: usize,
}

impl<A: Allocator> RegionEntry<A> {
    #[inline]
    fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Pool of fixed-size bump regions drawn from a parent allocator
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, NativeAllocator, RegionList};
///
/// let pool = RegionList::new(NativeAllocator::default(), 1 << 20)?;
/// unsafe {
///     let block = pool.allocate(100_000)?;
///     assert_eq!(pool.region_count(), 1);
///     assert!(pool.deallocate(block));
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct RegionList<A: Allocator + Clone = NativeAllocator> {
    parent: A,
    region_size: usize,
    config: RegionConfig,
    regions: Mutex<Vec<RegionEntry<A>>>,
}

impl<A: Allocator + Clone> RegionList<A> {
    /// Creates an empty pool of `region_size`-byte regions over `parent`
    pub fn new(parent: A, region_size: usize) -> AllocResult<Self> {
        Self::with_config(parent, region_size, RegionConfig::default())
    }

    /// Creates an empty pool with explicit region configuration
    pub fn with_config(
        parent: A,
        region_size: usize,
        config: RegionConfig,
    ) -> AllocResult<Self> {
        if region_size == 0 {
            return Err(AllocError::invalid_config("region size must be non-zero"));
        }
        if !config.alignment.is_power_of_two() {
            return Err(AllocError::invalid_alignment(config.alignment));
        }
        Ok(Self {
            parent,
            region_size,
            config,
            regions: Mutex::new(Vec::new()),
        })
    }

    /// Size of each region's span
    #[inline]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Number of regions currently held (including the empty spare)
    pub fn region_count(&self) -> usize {
        self.regions.lock().len()
    }

    /// Releases surplus empty regions, keeping one spare. Caller holds the
    /// lock.
    fn recycle(&self, regions: &mut Vec<RegionEntry<A>>) {
        let mut empty = regions.iter().filter(|e| e.is_empty()).count();
        if empty < 2 {
            return;
        }
        regions.retain(|entry| {
            if empty > 1 && entry.is_empty() {
                empty -= 1;
                false
            } else {
                true
            }
        });
        #[cfg(feature = "logging")]
        tracing::debug!(kept = regions.len(), "released surplus empty regions");
    }
}

// SAFETY: every block is issued by exactly one region; the address-derived
// route back (owns) finds that region again, and the live counts only ever
// reach zero when every block of a region has been returned.
unsafe impl<A: Allocator + Clone> Allocator for RegionList<A> {
    #[inline]
    fn alignment(&self) -> usize {
        self.config.alignment
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        {
            let mut regions = self.regions.lock();
            for entry in regions.iter_mut() {
                if let Ok(block) = unsafe { entry.region.allocate(size) } {
                    entry.live += 1;
                    return Ok(block);
                }
            }
        }

        // no region can satisfy the request: grow, drawing the new span
        // outside the lock; twice the alignment covers bound rounding on
        // both ends
        let span = size
            .checked_add(self.config.alignment.saturating_mul(2))
            .ok_or(AllocError::SizeOverflow)?
            .max(self.region_size);
        let region = Region::with_parent(self.parent.clone(), span, self.config)?;
        let block = unsafe { region.allocate(size)? };
        #[cfg(feature = "logging")]
        tracing::debug!(span, "opened new region");

        let mut regions = self.regions.lock();
        regions.push(RegionEntry { region, live: 1 });
        Ok(block)
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        let mut regions = self.regions.lock();
        let Some(entry) = regions
            .iter_mut()
            .find(|entry| entry.region.owns(&block).is_owned())
        else {
            return false;
        };
        // tail blocks are reclaimed immediately; interior blocks only come
        // back when the whole region empties
        unsafe { entry.region.deallocate(block) };
        entry.live = entry.live.saturating_sub(1);
        if entry.is_empty() {
            unsafe { entry.region.deallocate_all() };
            self.recycle(&mut regions);
        }
        true
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        if !block.is_null() && new_size != 0 {
            let mut regions = self.regions.lock();
            if let Some(entry) = regions
                .iter_mut()
                .find(|entry| entry.region.owns(block).is_owned())
            {
                if new_size > block.len() {
                    if unsafe { entry.region.expand(block, new_size - block.len()) } {
                        return true;
                    }
                } else if unsafe { entry.region.reallocate(block, new_size) } {
                    return true;
                }
            }
        }
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

// SAFETY: in-place growth happens inside the region that issued the block.
unsafe impl<A: Allocator + Clone> Expand for RegionList<A> {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        if block.is_null() {
            return false;
        }
        let mut regions = self.regions.lock();
        match regions
            .iter_mut()
            .find(|entry| entry.region.owns(block).is_owned())
        {
            Some(entry) => unsafe { entry.region.expand(block, delta) },
            None => false,
        }
    }
}

// SAFETY: dropping the regions returns every span to the parent and
// invalidates all outstanding blocks at once.
unsafe impl<A: Allocator + Clone> DeallocateAll for RegionList<A> {
    unsafe fn deallocate_all(&self) -> bool {
        self.regions.lock().clear();
        true
    }
}

impl<A: Allocator + Clone> Owns for RegionList<A> {
    fn owns(&self, block: &Block) -> Ownership {
        let regions = self.regions.lock();
        if regions
            .iter()
            .any(|entry| entry.region.owns(block).is_owned())
        {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }
}
