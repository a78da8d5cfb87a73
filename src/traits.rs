//! Allocator capability traits
//!
//! The capability set is split across one core trait and several optional
//! traits, resolved by generic bounds at composition time. A composite
//! exposes an optional operation only when every child the operation needs
//! implements it, so unsupported operations are compile errors rather than
//! runtime failures. Absent capabilities cost nothing.
//!
//! # Safety
//!
//! The allocation traits are `unsafe` to implement. Implementors must ensure:
//! - `allocate` returns blocks of exactly the requested length, aligned to
//!   `alignment()`, disjoint from every other live block
//! - `deallocate`/`reallocate`/`expand` trust the block's recorded length;
//!   callers must pass the length the allocator last associated with the
//!   pointer, and a mismatch is undefined behavior
//! - no operation panics; exhaustion and misuse are reported through return
//!   values only

use core::ptr;

use crate::block::Block;
use crate::error::AllocResult;
use crate::utils::align_up;

/// Tri-state answer to "does this allocator own that block?"
///
/// `Unknown` is permitted where a cheap determination is impossible (the
/// native allocator cannot tell), but an implementation must never answer
/// `Owned` for a block it did not issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The block was issued by this allocator and is still live
    Owned,
    /// The block was definitely not issued by this allocator
    NotOwned,
    /// This allocator cannot cheaply decide
    Unknown,
}

impl Ownership {
    /// Whether the answer is a definitive yes
    #[inline]
    pub fn is_owned(self) -> bool {
        matches!(self, Ownership::Owned)
    }
}

/// Core allocation capability
///
/// # Safety
/// See the module-level contract. Beyond it, `good_alloc_size` must be
/// monotonic and idempotent, and must report the number of bytes actually
/// reserved for a request; routing components rely on it to re-derive
/// routing decisions from a block's recorded length.
pub unsafe trait Allocator {
    /// Guaranteed alignment of every returned block
    fn alignment(&self) -> usize;

    /// Rounds a request up to what will actually be reserved
    #[inline]
    fn good_alloc_size(&self, size: usize) -> usize {
        align_up(size, self.alignment())
    }

    /// Allocates exactly `size` bytes.
    ///
    /// Fails for `size == 0` and on exhaustion; never panics.
    ///
    /// # Safety
    /// The returned memory is uninitialized. The block must be returned to
    /// this allocator (or an ancestor composite that routed to it) with its
    /// recorded length intact, and must not be used after `deallocate_all`
    /// or drop of the allocator.
    unsafe fn allocate(&self, size: usize) -> AllocResult<Block>;

    /// Returns a block to the allocator.
    ///
    /// The null block is always a no-op success. Allocators with restricted
    /// reclamation (bump regions reclaim only the most recent block) return
    /// `false` without side effects when the block cannot be reclaimed.
    ///
    /// # Safety
    /// `block` must have been issued by this allocator with this exact
    /// length, and must not be used afterwards.
    unsafe fn deallocate(&self, block: Block) -> bool;

    /// Resizes `block` to `new_size`, moving it if necessary.
    ///
    /// Prefers in-place growth or shrink where the implementation supports
    /// it, falling back to allocate-copy-deallocate. On success the handle
    /// is updated (a `new_size` of zero deallocates and leaves the null
    /// block); on failure the handle and its memory are untouched.
    ///
    /// # Safety
    /// Same contract as [`deallocate`](Allocator::deallocate) for the
    /// incoming block.
    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

/// Allocate-copy-deallocate fallback shared by `reallocate` implementations.
///
/// Composites reuse this for the cross-bucket and cross-branch cases, where
/// in-place behavior across a routing boundary must never be assumed.
///
/// # Safety
/// Same contract as [`Allocator::reallocate`].
pub unsafe fn reallocate_by_move<A: Allocator + ?Sized>(
    allocator: &A,
    block: &mut Block,
    new_size: usize,
) -> bool {
    if new_size == block.len() && !block.is_null() {
        return true;
    }
    if new_size == 0 {
        let old = block.take();
        unsafe { allocator.deallocate(old) };
        return true;
    }
    let new_block = match unsafe { allocator.allocate(new_size) } {
        Ok(b) => b,
        Err(_) => return false,
    };
    if !block.is_null() {
        let copy_len = block.len().min(new_size);
        unsafe {
            ptr::copy_nonoverlapping(block.ptr(), new_block.ptr(), copy_len);
            allocator.deallocate(*block);
        }
    }
    *block = new_block;
    true
}

/// Allocation at a caller-chosen alignment
///
/// # Safety
/// Same contract as [`Allocator`]; the returned pointer is additionally
/// aligned to the requested power-of-two alignment.
pub unsafe trait AlignedAllocator: Allocator {
    /// Allocates exactly `size` bytes aligned to `align`.
    ///
    /// `align` must be a power of two; other values fail with
    /// `InvalidAlignment`.
    ///
    /// # Safety
    /// Same contract as [`Allocator::allocate`].
    unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block>;
}

/// In-place growth without moving the block
///
/// # Safety
/// On success the block's memory is extended in place and its recorded
/// length grows by `delta`; on failure there is no partial effect.
pub unsafe trait Expand: Allocator {
    /// Grows `block` by `delta` bytes in place.
    ///
    /// Succeeds only while the block is still eligible (e.g. it is the tail
    /// allocation of a bump region, or the growth fits the slack of its size
    /// class).
    ///
    /// # Safety
    /// Same contract as [`Allocator::deallocate`] for the incoming block.
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool;
}

/// Release of everything ever issued
///
/// # Safety
/// After a successful call every outstanding block from this allocator is
/// invalid.
pub unsafe trait DeallocateAll: Allocator {
    /// Releases every outstanding allocation at once. Idempotent.
    ///
    /// # Safety
    /// The caller must guarantee no outstanding block is used afterwards.
    unsafe fn deallocate_all(&self) -> bool;
}

/// Cheap ownership query
pub trait Owns {
    /// Whether `block` was issued by this allocator
    fn owns(&self, block: &Block) -> Ownership;
}

// ============================================================================
// Blanket implementations for references
// ============================================================================

// SAFETY: forwards every call to the underlying allocator; contracts are
// preserved through delegation.
unsafe impl<T: Allocator + ?Sized> Allocator for &T {
    fn alignment(&self) -> usize {
        (**self).alignment()
    }

    fn good_alloc_size(&self, size: usize) -> usize {
        (**self).good_alloc_size(size)
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        unsafe { (**self).allocate(size) }
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        unsafe { (**self).deallocate(block) }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        unsafe { (**self).reallocate(block, new_size) }
    }
}

// SAFETY: pure delegation, as above.
unsafe impl<T: AlignedAllocator + ?Sized> AlignedAllocator for &T {
    unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
        unsafe { (**self).aligned_allocate(size, align) }
    }
}

// SAFETY: pure delegation, as above.
unsafe impl<T: Expand + ?Sized> Expand for &T {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        unsafe { (**self).expand(block, delta) }
    }
}

// SAFETY: pure delegation, as above.
unsafe impl<T: DeallocateAll + ?Sized> DeallocateAll for &T {
    unsafe fn deallocate_all(&self) -> bool {
        unsafe { (**self).deallocate_all() }
    }
}

impl<T: Owns + ?Sized> Owns for &T {
    fn owns(&self, block: &Block) -> Ownership {
        (**self).owns(block)
    }
}
