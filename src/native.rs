//! Native allocator adapter
//!
//! Wraps three externally supplied C-malloc-shaped functions, letting the
//! framework run over any native allocator without hard-coding one. The
//! default instance captures `libc`'s `malloc`/`free`/`realloc`.
//!
//! The adapter keeps no bookkeeping beyond the captured function
//! identities, so it is `Copy` and inherently thread-safe: the wrapped
//! functions are required to be callable concurrently, which every
//! C-runtime allocator guarantees.

use core::ffi::c_void;
use core::ptr;

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Owns, Ownership};

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        /// Alignment the wrapped allocator guarantees (`max_align_t`)
        const NATIVE_ALIGNMENT: usize = 16;
    } else {
        /// Alignment the wrapped allocator guarantees (`max_align_t`)
        const NATIVE_ALIGNMENT: usize = 8;
    }
}

/// `malloc`-shaped allocation function
pub type NativeAllocFn = unsafe extern "C" fn(usize) -> *mut c_void;
/// `free`-shaped release function
pub type NativeFreeFn = unsafe extern "C" fn(*mut c_void);
/// `realloc`-shaped resize function
pub type NativeResizeFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// Adapter over externally supplied allocate/free/resize primitives
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, NativeAllocator};
///
/// let native = NativeAllocator::default();
/// unsafe {
///     let block = native.allocate(64)?;
///     assert_eq!(block.len(), 64);
///     assert!(native.deallocate(block));
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
#[derive(Clone, Copy)]
pub struct NativeAllocator {
    alloc: NativeAllocFn,
    free: NativeFreeFn,
    resize: NativeResizeFn,
}

impl NativeAllocator {
    /// Creates an adapter over the given allocate/free/resize functions.
    ///
    /// The functions must behave like `malloc`/`free`/`realloc`: thread-safe,
    /// returning null on failure, with `resize` preserving contents up to the
    /// smaller of the old and new sizes.
    pub fn new(alloc: NativeAllocFn, free: NativeFreeFn, resize: NativeResizeFn) -> Self {
        Self { alloc, free, resize }
    }

    /// Adapter over the C runtime's `malloc` family
    pub fn malloc() -> Self {
        Self::new(libc::malloc, libc::free, libc::realloc)
    }

    /// Allocates `size` zero-initialized bytes.
    ///
    /// # Safety
    /// Same contract as [`Allocator::allocate`].
    pub unsafe fn allocate_zeroed(&self, size: usize) -> AllocResult<Block> {
        let block = unsafe { self.allocate(size)? };
        unsafe {
            ptr::write_bytes(block.ptr(), 0, size);
        }
        Ok(block)
    }
}

impl Default for NativeAllocator {
    fn default() -> Self {
        Self::malloc()
    }
}

impl core::fmt::Debug for NativeAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeAllocator")
            .field("alloc", &(self.alloc as *const ()))
            .field("free", &(self.free as *const ()))
            .field("resize", &(self.resize as *const ()))
            .finish()
    }
}

// SAFETY: delegates to the captured malloc-shaped functions, which return
// blocks aligned to NATIVE_ALIGNMENT and disjoint from all live blocks.
unsafe impl Allocator for NativeAllocator {
    #[inline]
    fn alignment(&self) -> usize {
        NATIVE_ALIGNMENT
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        let ptr = unsafe { (self.alloc)(size) };
        if ptr.is_null() {
            Err(AllocError::out_of_memory(size))
        } else {
            Ok(Block::from_raw_parts(ptr.cast::<u8>(), size))
        }
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        unsafe { (self.free)(block.ptr().cast::<c_void>()) };
        true
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        // resizing to size zero is treated as deallocation
        if new_size == 0 {
            let old = block.take();
            unsafe { self.deallocate(old) };
            return true;
        }
        if block.is_null() {
            return match unsafe { self.allocate(new_size) } {
                Ok(b) => {
                    *block = b;
                    true
                }
                Err(_) => false,
            };
        }
        let ptr = unsafe { (self.resize)(block.ptr().cast::<c_void>(), new_size) };
        if ptr.is_null() {
            // realloc failure leaves the original allocation intact
            return false;
        }
        *block = Block::from_raw_parts(ptr.cast::<u8>(), new_size);
        true
    }
}

impl Owns for NativeAllocator {
    /// The native allocator keeps no records, so it can never answer
    /// definitively, but it also never falsely claims a block.
    fn owns(&self, _block: &Block) -> Ownership {
        Ownership::Unknown
    }
}

// SAFETY: the adapter holds only function pointers required to be callable
// from any thread.
unsafe impl Send for NativeAllocator {}
unsafe impl Sync for NativeAllocator {}
