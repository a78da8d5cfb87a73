//! Size-class free list over a parent allocator
//!
//! Caches freed blocks of one size interval `[min, max]` on an intrusive
//! lock-free stack and serves later in-range allocations from the cache
//! before falling through to the parent. Requests outside the interval pass
//! through untouched. Every in-range request reserves `max` bytes, so any
//! cached node can satisfy any in-range size.
//!
//! # Safety
//!
//! - free nodes store the next pointer in their first word (intrusive
//!   list), which is why `max` must hold at least a pointer
//! - the head is an `AtomicPtr`; push and pop are CAS loops with backoff,
//!   so the list is safe to share across threads
//! - cached nodes are returned to the parent when the list is dropped
//!
//! ## Invariants
//!
//! - the list only ever contains blocks obtained from the parent with
//!   length `max`
//! - an in-range block's recorded length re-derives its reservation:
//!   `good_alloc_size` of any in-range size is `max`

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move};
use crate::utils::Backoff;

/// Node in the free list, overlaid on the first word of a freed block
#[repr(C)]
struct FreeNode {
    next: *mut FreeNode,
}

/// Unbounded free list caching blocks of sizes in `[min, max]`
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, FreeList, NativeAllocator};
///
/// let list = FreeList::new(NativeAllocator::default(), 0, 64)?;
/// unsafe {
///     let block = list.allocate(48)?;
///     let addr = block.addr();
///     list.deallocate(block);
///     // the cached node is reused
///     assert_eq!(list.allocate(32)?.addr(), addr);
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct FreeList<A: Allocator> {
    parent: A,
    min: usize,
    max: usize,
    head: AtomicPtr<FreeNode>,
}

impl<A: Allocator> FreeList<A> {
    /// Creates a free list caching blocks of sizes in `[min, max]`
    pub fn new(parent: A, min: usize, max: usize) -> AllocResult<Self> {
        if min > max {
            return Err(AllocError::invalid_config("min exceeds max"));
        }
        if max < size_of::<*mut u8>() {
            return Err(AllocError::invalid_config(
                "max too small to hold a free-list node",
            ));
        }
        Ok(Self {
            parent,
            min,
            max,
            head: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Lower bound of the cached interval
    #[inline]
    pub fn min(&self) -> usize {
        self.min
    }

    /// Upper bound of the cached interval
    #[inline]
    pub fn max(&self) -> usize {
        self.max
    }

    /// The parent allocator
    #[inline]
    pub fn parent(&self) -> &A {
        &self.parent
    }

    #[inline]
    fn in_range(&self, size: usize) -> bool {
        size >= self.min && size <= self.max
    }

    fn pop(&self) -> Option<*mut u8> {
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: a non-null head is a node previously pushed by
            // deallocate; its first word is a valid next pointer.
            let next = unsafe { (*head).next };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(head.cast::<u8>());
            }
            backoff.spin();
        }
    }

    fn push(&self, node: *mut u8) {
        let node = node.cast::<FreeNode>();
        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: the node is a freed in-range block of max bytes, which
            // is large enough for the next pointer (checked at construction);
            // the write happens before the CAS publishes the node.
            unsafe {
                (*node).next = head;
            }
            if self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    /// Drains the cache, returning every cached node to the parent.
    ///
    /// Returns the number of nodes released. Outstanding (live) blocks are
    /// unaffected.
    pub fn release_cached(&self) -> usize {
        let mut released = 0;
        while let Some(node) = self.pop() {
            // SAFETY: every cached node was obtained from the parent with
            // length max.
            unsafe {
                self.parent.deallocate(Block::from_raw_parts(node, self.max));
            }
            released += 1;
        }
        released
    }
}

impl<A: Allocator> Drop for FreeList<A> {
    fn drop(&mut self) {
        self.release_cached();
    }
}

// SAFETY: in-range requests are served either from a cached node (obtained
// from the parent with max bytes reserved) or from the parent directly, so
// every block has max bytes behind it; out-of-range requests delegate.
unsafe impl<A: Allocator> Allocator for FreeList<A> {
    #[inline]
    fn alignment(&self) -> usize {
        self.parent.alignment()
    }

    fn good_alloc_size(&self, size: usize) -> usize {
        if self.in_range(size) {
            self.max
        } else {
            self.parent.good_alloc_size(size)
        }
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        if !self.in_range(size) {
            return unsafe { self.parent.allocate(size) };
        }
        if let Some(node) = self.pop() {
            return Ok(Block::from_raw_parts(node, size));
        }
        let block = unsafe { self.parent.allocate(self.max)? };
        Ok(Block::from_raw_parts(block.ptr(), size))
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        if self.in_range(block.len()) {
            self.push(block.ptr());
            true
        } else {
            unsafe { self.parent.deallocate(block) }
        }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        // two in-range sizes share one reservation of max bytes
        if !block.is_null()
            && new_size != 0
            && self.in_range(block.len())
            && self.in_range(new_size)
        {
            block.set_len(new_size);
            return true;
        }
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

// SAFETY: growth is confined to the slack of the fixed max-byte
// reservation every in-range block carries.
unsafe impl<A: Allocator> Expand for FreeList<A> {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        if block.is_null() || !self.in_range(block.len()) {
            return false;
        }
        match block.len().checked_add(delta) {
            Some(new_len) if self.in_range(new_len) => {
                block.set_len(new_len);
                true
            }
            _ => false,
        }
    }
}

// SAFETY: clearing the cache first keeps the parent's bulk release from
// double-freeing cached nodes.
unsafe impl<A: DeallocateAll> DeallocateAll for FreeList<A> {
    unsafe fn deallocate_all(&self) -> bool {
        self.head.store(ptr::null_mut(), Ordering::Release);
        unsafe { self.parent.deallocate_all() }
    }
}

impl<A: Allocator + Owns> Owns for FreeList<A> {
    fn owns(&self, block: &Block) -> Ownership {
        self.parent.owns(block)
    }
}
