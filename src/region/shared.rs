//! Lock-free bump region
//!
//! Concurrency-safe twin of [`Region`](super::Region): the cursor is an
//! atomic word and every operation is safe to call concurrently without an
//! external lock, so one thread may allocate while another frees.
//!
//! Three synchronization disciplines, by operation:
//! - the common unaligned upward-growth `allocate` is a single
//!   fetch-and-add, linearizing concurrent allocations with disjoint
//!   results at hardware-instruction cost; an overshoot past the span end
//!   is compensated with a fetch-and-subtract and reported as exhaustion
//! - `aligned_allocate` and downward growth use a compare-and-swap retry
//!   loop, because the advance amount depends on the value read (alignment
//!   padding, or subtraction from a moving target); the loop re-reads the
//!   cursor from the failed CAS rather than reusing a stale snapshot
//! - `deallocate` is a single compare-and-swap on the tail; a failed CAS
//!   means another thread already claimed the tail, so the deallocation
//!   correctly does nothing
//!
//! In-place growth is not offered for this variant: `Expand` is
//! deliberately unimplemented.
//!
//! ## Memory ordering
//!
//! - Acquire on cursor loads (see prior writes before reusing space)
//! - AcqRel on successful CAS and on fetch-and-add
//! - failed CAS reloads with Acquire

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::native::NativeAllocator;
use crate::traits::{AlignedAllocator, Allocator, DeallocateAll, Owns, Ownership};
use crate::utils::{Backoff, align_down, align_up};

use super::RegionConfig;

/// Lock-free bump region owning a span drawn from a parent allocator
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use strata_alloc::{Allocator, SharedRegion};
///
/// let region = Arc::new(SharedRegion::new(1 << 16)?);
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let region = Arc::clone(&region);
///         std::thread::spawn(move || unsafe { region.allocate(64).is_ok() })
///     })
///     .collect();
/// for handle in handles {
///     assert!(handle.join().unwrap());
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct SharedRegion<A: Allocator = NativeAllocator> {
    parent: A,
    store: Block,
    begin: usize,
    end: usize,
    current: AtomicUsize,
    grow_downwards: bool,
    alignment: usize,
}

impl SharedRegion<NativeAllocator> {
    /// Creates a shared region of `capacity` bytes over the native allocator
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, RegionConfig::default())
    }

    /// Creates a shared region over the native allocator with explicit
    /// configuration
    pub fn with_config(capacity: usize, config: RegionConfig) -> AllocResult<Self> {
        Self::with_parent(NativeAllocator::default(), capacity, config)
    }
}

impl<A: Allocator> SharedRegion<A> {
    /// Creates a shared region whose span is drawn from `parent`
    pub fn with_parent(parent: A, capacity: usize, config: RegionConfig) -> AllocResult<Self> {
        if !config.alignment.is_power_of_two() {
            return Err(AllocError::invalid_alignment(config.alignment));
        }
        let store = unsafe { parent.allocate(capacity)? };
        let begin = align_up(store.addr(), config.alignment);
        let end = align_down(store.addr() + capacity, config.alignment);
        if begin > end {
            unsafe { parent.deallocate(store) };
            return Err(AllocError::invalid_config(
                "span too small for the configured alignment",
            ));
        }
        let start = if config.grow_downwards { end } else { begin };
        Ok(Self {
            parent,
            store,
            begin,
            end,
            current: AtomicUsize::new(start),
            grow_downwards: config.grow_downwards,
            alignment: config.alignment,
        })
    }

    /// Span capacity after alignment rounding
    #[inline]
    pub fn capacity(&self) -> usize {
        self.end - self.begin
    }

    /// Bytes currently reserved.
    ///
    /// Under contention the value is a snapshot; a concurrent failed
    /// fetch-and-add may transiently push the cursor past the span end, so
    /// the count is clamped to the capacity.
    #[inline]
    pub fn used(&self) -> usize {
        let cur = self.current.load(Ordering::Acquire);
        if self.grow_downwards {
            self.end.saturating_sub(cur.max(self.begin))
        } else {
            cur.clamp(self.begin, self.end) - self.begin
        }
    }

    /// Bytes still available
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Whether the region grows from the top of the span downward
    #[inline]
    pub fn grows_downwards(&self) -> bool {
        self.grow_downwards
    }

    #[inline]
    fn rounded(&self, size: usize) -> AllocResult<usize> {
        size.checked_add(self.alignment - 1)
            .map(|v| v & !(self.alignment - 1))
            .ok_or(AllocError::SizeOverflow)
    }

    fn allocate_up(&self, size: usize, rounded: usize) -> AllocResult<Block> {
        let old = self.current.fetch_add(rounded, Ordering::AcqRel);
        match old.checked_add(rounded) {
            Some(new) if new <= self.end => Ok(Block::from_raw_parts(old as *mut u8, size)),
            _ => {
                // overshoot: give the reservation back and report exhaustion
                self.current.fetch_sub(rounded, Ordering::AcqRel);
                Err(AllocError::out_of_memory_with_available(
                    size,
                    self.available(),
                ))
            }
        }
    }

    fn allocate_down(&self, size: usize, rounded: usize) -> AllocResult<Block> {
        let mut backoff = Backoff::new();
        let mut cur = self.current.load(Ordering::Acquire);
        loop {
            if rounded > cur.saturating_sub(self.begin) {
                return Err(AllocError::out_of_memory_with_available(
                    size,
                    self.available(),
                ));
            }
            let new = cur - rounded;
            match self
                .current
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Block::from_raw_parts(new as *mut u8, size)),
                Err(actual) => {
                    cur = actual;
                    backoff.spin();
                }
            }
        }
    }
}

impl<A: Allocator> Drop for SharedRegion<A> {
    fn drop(&mut self) {
        // SAFETY: the span block is exactly what the parent issued at
        // construction and nothing references it past this point.
        unsafe {
            self.parent.deallocate(self.store);
        }
    }
}

// SAFETY: fetch-and-add totally orders concurrent allocations along the
// cursor, so reserved ranges are disjoint; the CAS paths re-read the cursor
// on every retry; deallocate mutates state only on CAS success.
unsafe impl<A: Allocator> Allocator for SharedRegion<A> {
    #[inline]
    fn alignment(&self) -> usize {
        self.alignment
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        let rounded = self.rounded(size)?;
        if self.grow_downwards {
            self.allocate_down(size, rounded)
        } else {
            self.allocate_up(size, rounded)
        }
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        let rounded = align_up(block.len(), self.alignment);
        let (expected, new) = if self.grow_downwards {
            (block.addr(), block.addr() + rounded)
        } else {
            (block.addr() + rounded, block.addr())
        };
        // a losing race means another thread claimed the tail first; not
        // reclaiming is the correct outcome
        self.current
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// SAFETY: the CAS loop recomputes padding from the freshly read cursor on
// every attempt, so the reserved range is always derived from the value the
// CAS then protects.
unsafe impl<A: Allocator> AlignedAllocator for SharedRegion<A> {
    unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
        if !align.is_power_of_two() {
            return Err(AllocError::invalid_alignment(align));
        }
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        let rounded = self.rounded(size)?;
        let mut backoff = Backoff::new();
        let mut cur = self.current.load(Ordering::Acquire);
        loop {
            let (start, new) = if self.grow_downwards {
                let tmp = cur.saturating_sub(rounded);
                let start = align_down(tmp, align);
                if rounded > cur.saturating_sub(self.begin) || start < self.begin {
                    return Err(AllocError::out_of_memory_with_available(
                        size,
                        self.available(),
                    ));
                }
                (start, start)
            } else {
                let start = cur
                    .checked_add(align - 1)
                    .map(|v| v & !(align - 1))
                    .ok_or(AllocError::SizeOverflow)?;
                let new = start
                    .checked_add(rounded)
                    .ok_or(AllocError::SizeOverflow)?;
                if new > self.end {
                    return Err(AllocError::out_of_memory_with_available(
                        size,
                        self.available(),
                    ));
                }
                (start, new)
            };
            match self
                .current
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Block::from_raw_parts(start as *mut u8, size)),
                Err(actual) => {
                    cur = actual;
                    backoff.spin();
                }
            }
        }
    }
}

// SAFETY: rewinding the cursor invalidates all outstanding blocks; callers
// must guarantee none is used afterwards, exactly as in the sequential
// variant.
unsafe impl<A: Allocator> DeallocateAll for SharedRegion<A> {
    unsafe fn deallocate_all(&self) -> bool {
        let start = if self.grow_downwards {
            self.end
        } else {
            self.begin
        };
        self.current.store(start, Ordering::Release);
        true
    }
}

impl<A: Allocator> Owns for SharedRegion<A> {
    fn owns(&self, block: &Block) -> Ownership {
        if !block.is_null() && block.addr() >= self.begin && block.addr() < self.end {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }
}

// SAFETY: the span is an exclusive allocation reached only through the
// atomic cursor; the parent is only touched at drop.
unsafe impl<A: Allocator + Send> Send for SharedRegion<A> {}
// SAFETY: all shared-state mutation goes through the atomic cursor; CAS and
// fetch-and-add hand out disjoint ranges to different threads.
unsafe impl<A: Allocator + Sync> Sync for SharedRegion<A> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reuse_after_tail_free() {
        let region = SharedRegion::new(4096).unwrap();
        unsafe {
            let a = region.allocate(32).unwrap();
            let b = region.allocate(32).unwrap();

            // not the tail: no-op
            assert!(!region.deallocate(a));
            let used = region.used();

            // the tail reclaims, a second attempt loses the race with the
            // cursor having moved on
            assert!(region.deallocate(b));
            assert_eq!(region.used(), used - region.good_alloc_size(32));
            assert!(!region.deallocate(b));
        }
    }

    #[test]
    fn aligned_allocation_skips_padding() {
        let region = SharedRegion::new(4096).unwrap();
        unsafe {
            let _ = region.allocate(8).unwrap();
            let block = region.aligned_allocate(64, 256).unwrap();
            assert_eq!(block.addr() % 256, 0);
        }
    }

    #[test]
    fn downward_shared_region_descends() {
        let region = SharedRegion::with_config(
            4096,
            RegionConfig {
                alignment: 8,
                grow_downwards: true,
            },
        )
        .unwrap();
        unsafe {
            let a = region.allocate(16).unwrap();
            let b = region.allocate(16).unwrap();
            assert!(b.addr() < a.addr());
            assert!(region.deallocate(b));
        }
    }

    #[test]
    fn exhaustion_restores_cursor() {
        let region = SharedRegion::with_config(
            64,
            RegionConfig {
                alignment: 1,
                grow_downwards: false,
            },
        )
        .unwrap();
        unsafe {
            let _ = region.allocate(48).unwrap();
            assert!(region.allocate(32).is_err());
            // the failed attempt must not leak reserved space
            assert_eq!(region.available(), 16);
            let _ = region.allocate(16).unwrap();
        }
    }
}
