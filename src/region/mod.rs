//! Bump-pointer regions over one contiguous span
//!
//! A region maintains a cursor advancing monotonically through its span,
//! from the bottom up or, when configured with `grow_downwards`, from the
//! top down. Allocation is cursor arithmetic; individual deallocation is
//! offered only as a LIFO unwind of the tail block, anything else is a
//! silent no-op. `deallocate_all` rewinds the cursor and invalidates every
//! outstanding block.
//!
//! Three sequential variants share the cursor logic:
//! - [`Region`] draws its span from a parent allocator and returns it on
//!   drop
//! - [`BorrowedRegion`] runs over a caller-provided span it never owns
//! - [`InSituRegion`] embeds the span inside itself and activates it on
//!   first use
//!
//! The concurrency-safe twin lives in [`SharedRegion`].
//!
//! ## Invariants
//!
//! - `begin` and `end` are rounded to the configured alignment, so every
//!   cursor position stays aligned (all advances are alignment multiples)
//! - the cursor never leaves `[begin, end]`
//! - a block is reclaimable only while it still abuts the cursor

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::mem::MaybeUninit;

use crate::block::Block;
use crate::error::{AllocError, AllocResult};
use crate::native::NativeAllocator;
use crate::traits::{
    AlignedAllocator, Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move,
};
use crate::utils::{PLATFORM_ALIGNMENT, align_down, align_up};

mod shared;

pub use shared::SharedRegion;

/// Region configuration, fixed at construction
#[derive(Debug, Clone, Copy)]
pub struct RegionConfig {
    /// Alignment of every returned block; span bounds are rounded to it
    pub alignment: usize,
    /// Grow from the top of the span toward the bottom
    pub grow_downwards: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            alignment: PLATFORM_ALIGNMENT,
            grow_downwards: false,
        }
    }
}

impl RegionConfig {
    fn validate(&self) -> AllocResult<()> {
        if !self.alignment.is_power_of_two() {
            return Err(AllocError::invalid_alignment(self.alignment));
        }
        Ok(())
    }
}

/// Cursor state and arithmetic shared by the sequential region variants
pub(crate) struct RawRegion {
    begin: usize,
    end: usize,
    current: Cell<usize>,
    grow_downwards: bool,
    alignment: usize,
}

impl RawRegion {
    fn new(base: usize, len: usize, config: RegionConfig) -> AllocResult<Self> {
        config.validate()?;
        let begin = align_up(base, config.alignment);
        let end = align_down(base + len, config.alignment);
        if begin > end {
            return Err(AllocError::invalid_config(
                "span too small for the configured alignment",
            ));
        }
        let start = if config.grow_downwards { end } else { begin };
        Ok(Self {
            begin,
            end,
            current: Cell::new(start),
            grow_downwards: config.grow_downwards,
            alignment: config.alignment,
        })
    }

    #[inline]
    fn rounded(&self, size: usize) -> AllocResult<usize> {
        size.checked_add(self.alignment - 1)
            .map(|v| v & !(self.alignment - 1))
            .ok_or(AllocError::SizeOverflow)
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    fn used(&self) -> usize {
        if self.grow_downwards {
            self.end - self.current.get()
        } else {
            self.current.get() - self.begin
        }
    }

    #[inline]
    fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        let rounded = self.rounded(size)?;
        let cur = self.current.get();
        if self.grow_downwards {
            if rounded > cur - self.begin {
                return Err(AllocError::out_of_memory_with_available(
                    size,
                    self.available(),
                ));
            }
            let new = cur - rounded;
            self.current.set(new);
            Ok(Block::from_raw_parts(new as *mut u8, size))
        } else {
            let new = cur
                .checked_add(rounded)
                .ok_or(AllocError::SizeOverflow)?;
            if new > self.end {
                return Err(AllocError::out_of_memory_with_available(
                    size,
                    self.available(),
                ));
            }
            self.current.set(new);
            Ok(Block::from_raw_parts(cur as *mut u8, size))
        }
    }

    fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
        if !align.is_power_of_two() {
            return Err(AllocError::invalid_alignment(align));
        }
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        let rounded = self.rounded(size)?;
        let cur = self.current.get();
        if self.grow_downwards {
            let tmp = cur.checked_sub(rounded).ok_or_else(|| {
                AllocError::out_of_memory_with_available(size, self.available())
            })?;
            let start = align_down(tmp, align);
            if start < self.begin {
                return Err(AllocError::out_of_memory_with_available(
                    size,
                    self.available(),
                ));
            }
            self.current.set(start);
            Ok(Block::from_raw_parts(start as *mut u8, size))
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
            self.current.set(new);
            Ok(Block::from_raw_parts(start as *mut u8, size))
        }
    }

    fn deallocate(&self, block: Block) -> bool {
        if block.is_null() {
            return true;
        }
        // align_up cannot overflow here: the block lies inside the span
        let rounded = align_up(block.len(), self.alignment);
        if self.grow_downwards {
            if block.addr() == self.current.get() {
                self.current.set(block.addr() + rounded);
                return true;
            }
        } else if block.addr() + rounded == self.current.get() {
            self.current.set(block.addr());
            return true;
        }
        false
    }

    fn expand(&self, block: &mut Block, delta: usize) -> bool {
        if delta == 0 {
            return true;
        }
        if block.is_null() {
            return false;
        }
        let Some(new_len) = block.len().checked_add(delta) else {
            return false;
        };
        let old_rounded = align_up(block.len(), self.alignment);
        let Some(new_rounded) = self.rounded(new_len).ok() else {
            return false;
        };
        if new_rounded == old_rounded {
            // growth fits the rounding slack of the existing reservation
            block.set_len(new_len);
            return true;
        }
        if self.grow_downwards {
            return false;
        }
        let cur = self.current.get();
        if block.addr() + old_rounded != cur {
            return false;
        }
        let Some(new_cur) = block.addr().checked_add(new_rounded) else {
            return false;
        };
        if new_cur > self.end {
            return false;
        }
        self.current.set(new_cur);
        block.set_len(new_len);
        true
    }

    fn reallocate(&self, block: &mut Block, new_size: usize) -> Option<bool> {
        if block.is_null() || new_size == 0 {
            return None;
        }
        if new_size == block.len() {
            return Some(true);
        }
        if new_size > block.len() {
            if self.expand(block, new_size - block.len()) {
                return Some(true);
            }
            return None;
        }
        // shrink: stay in place when the reservation does not change, or
        // give the difference back when the block is the tail
        let old_rounded = align_up(block.len(), self.alignment);
        let new_rounded = align_up(new_size, self.alignment);
        if new_rounded == old_rounded {
            block.set_len(new_size);
            return Some(true);
        }
        if !self.grow_downwards && block.addr() + old_rounded == self.current.get() {
            self.current.set(block.addr() + new_rounded);
            block.set_len(new_size);
            return Some(true);
        }
        None
    }

    fn deallocate_all(&self) {
        let start = if self.grow_downwards {
            self.end
        } else {
            self.begin
        };
        self.current.set(start);
    }

    fn owns(&self, block: &Block) -> Ownership {
        if !block.is_null() && block.addr() >= self.begin && block.addr() < self.end {
            Ownership::Owned
        } else {
            Ownership::NotOwned
        }
    }
}

/// Delegates the capability traits of a region variant to its `RawRegion`.
macro_rules! impl_region_traits {
    (<$g:ident : $b:ident> $ty:ty, |$self_:ident| $raw:expr) => {
        impl_region_traits!(@impl (<$g: $b>) $ty, |$self_| $raw);
    };
    ($ty:ty, |$self_:ident| $raw:expr) => {
        impl_region_traits!(@impl () $ty, |$self_| $raw);
    };
    (@impl ($($g:tt)*) $ty:ty, |$self_:ident| $raw:expr) => {
        // SAFETY: cursor arithmetic reserves disjoint, aligned ranges inside
        // the span; deallocate only unwinds the tail block.
        unsafe impl$($g)* Allocator for $ty {
            #[inline]
            fn alignment(&self) -> usize {
                let $self_ = self;
                $raw.alignment
            }

            unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
                let $self_ = self;
                $raw.allocate(size)
            }

            unsafe fn deallocate(&self, block: Block) -> bool {
                let $self_ = self;
                $raw.deallocate(block)
            }

            unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
                {
                    let $self_ = self;
                    if let Some(done) = $raw.reallocate(block, new_size) {
                        return done;
                    }
                }
                unsafe { reallocate_by_move(self, block, new_size) }
            }
        }

        // SAFETY: the start address is rounded up before reserving, possibly
        // skipping bytes; the reservation stays inside the span.
        unsafe impl$($g)* AlignedAllocator for $ty {
            unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
                let $self_ = self;
                $raw.aligned_allocate(size, align)
            }
        }

        // SAFETY: expansion only ever extends the tail reservation or uses
        // rounding slack; failure has no effect.
        unsafe impl$($g)* Expand for $ty {
            unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
                let $self_ = self;
                $raw.expand(block, delta)
            }
        }

        // SAFETY: rewinding the cursor invalidates all outstanding blocks,
        // which is exactly the advertised contract.
        unsafe impl$($g)* DeallocateAll for $ty {
            unsafe fn deallocate_all(&self) -> bool {
                let $self_ = self;
                $raw.deallocate_all();
                true
            }
        }

        impl$($g)* Owns for $ty {
            fn owns(&self, block: &Block) -> Ownership {
                let $self_ = self;
                $raw.owns(block)
            }
        }
    };
}

// ============================================================================
// Region: owns its span, drawn from a parent allocator
// ============================================================================

/// Bump region owning a span drawn from a parent allocator
///
/// The span is returned to the parent when the region is dropped.
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, Region};
///
/// let region = Region::new(4096)?;
/// unsafe {
///     let a = region.allocate(100)?;
///     let b = region.allocate(200)?;
///     assert_ne!(a.addr(), b.addr());
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct Region<A: Allocator = NativeAllocator> {
    parent: A,
    store: Block,
    raw: RawRegion,
}

impl Region<NativeAllocator> {
    /// Creates a region of `capacity` bytes over the native allocator
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, RegionConfig::default())
    }

    /// Creates a region over the native allocator with explicit configuration
    pub fn with_config(capacity: usize, config: RegionConfig) -> AllocResult<Self> {
        Self::with_parent(NativeAllocator::default(), capacity, config)
    }
}

impl<A: Allocator> Region<A> {
    /// Creates a region whose span is drawn from `parent`
    pub fn with_parent(parent: A, capacity: usize, config: RegionConfig) -> AllocResult<Self> {
        config.validate()?;
        let store = unsafe { parent.allocate(capacity)? };
        match RawRegion::new(store.addr(), capacity, config) {
            Ok(raw) => Ok(Self { parent, store, raw }),
            Err(err) => {
                unsafe { parent.deallocate(store) };
                Err(err)
            }
        }
    }

    /// Span capacity after alignment rounding
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Bytes currently reserved
    #[inline]
    pub fn used(&self) -> usize {
        self.raw.used()
    }

    /// Bytes still available
    #[inline]
    pub fn available(&self) -> usize {
        self.raw.available()
    }

    /// Whether the region grows from the top of the span downward
    #[inline]
    pub fn grows_downwards(&self) -> bool {
        self.raw.grow_downwards
    }
}

impl<A: Allocator> Drop for Region<A> {
    fn drop(&mut self) {
        // SAFETY: the span block is exactly what the parent issued at
        // construction and nothing references it past this point.
        unsafe {
            self.parent.deallocate(self.store);
        }
    }
}

impl_region_traits!(<A: Allocator> Region<A>, |this| this.raw);

// SAFETY: the span is an exclusive allocation; sending the region moves
// exclusive ownership of it along with the parent handle.
unsafe impl<A: Allocator + Send> Send for Region<A> {}

// ============================================================================
// BorrowedRegion: runs over a caller-provided span
// ============================================================================

/// Bump region over a borrowed span it never owns
///
/// The caller keeps ownership of the underlying buffer; the region only
/// hands out disjoint pieces of it for its own lifetime.
pub struct BorrowedRegion<'a> {
    raw: RawRegion,
    _span: PhantomData<&'a mut [u8]>,
}

impl<'a> BorrowedRegion<'a> {
    /// Creates a region over `span` with the default configuration
    pub fn new(span: &'a mut [u8]) -> AllocResult<Self> {
        Self::with_config(span, RegionConfig::default())
    }

    /// Creates a region over `span` with explicit configuration
    pub fn with_config(span: &'a mut [u8], config: RegionConfig) -> AllocResult<Self> {
        if span.is_empty() {
            return Err(AllocError::invalid_config("span is empty"));
        }
        let raw = RawRegion::new(span.as_mut_ptr() as usize, span.len(), config)?;
        Ok(Self {
            raw,
            _span: PhantomData,
        })
    }

    /// Span capacity after alignment rounding
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Bytes currently reserved
    #[inline]
    pub fn used(&self) -> usize {
        self.raw.used()
    }

    /// Bytes still available
    #[inline]
    pub fn available(&self) -> usize {
        self.raw.available()
    }
}

impl_region_traits!(BorrowedRegion<'_>, |this| this.raw);

// ============================================================================
// InSituRegion: embeds its span, activates lazily
// ============================================================================

/// Bump region embedding its span inside itself
///
/// The span is activated on first use, so an unused instance costs nothing
/// beyond its storage. Because outstanding blocks point into the embedded
/// buffer, the region must not be moved once the first allocation has been
/// made.
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, InSituRegion};
///
/// let region: InSituRegion<1024> = InSituRegion::new();
/// assert_eq!(region.used(), 0);
/// unsafe {
///     let block = region.allocate(64)?;
///     assert_eq!(block.len(), 64);
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct InSituRegion<const N: usize> {
    buffer: UnsafeCell<MaybeUninit<[u8; N]>>,
    raw: once_cell::unsync::OnceCell<RawRegion>,
    alignment: usize,
}

impl<const N: usize> InSituRegion<N> {
    /// Creates an inactive region with the platform alignment
    pub fn new() -> Self {
        Self {
            buffer: UnsafeCell::new(MaybeUninit::uninit()),
            raw: once_cell::unsync::OnceCell::new(),
            alignment: PLATFORM_ALIGNMENT,
        }
    }

    /// Creates an inactive region with an explicit alignment
    pub fn with_alignment(alignment: usize) -> AllocResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(AllocError::invalid_alignment(alignment));
        }
        Ok(Self {
            buffer: UnsafeCell::new(MaybeUninit::uninit()),
            raw: once_cell::unsync::OnceCell::new(),
            alignment,
        })
    }

    fn region(&self) -> AllocResult<&RawRegion> {
        self.raw.get_or_try_init(|| {
            RawRegion::new(
                self.buffer.get() as usize,
                N,
                RegionConfig {
                    alignment: self.alignment,
                    grow_downwards: false,
                },
            )
        })
    }

    /// Whether the span has been activated by a first use
    #[inline]
    pub fn is_active(&self) -> bool {
        self.raw.get().is_some()
    }

    /// Span capacity after alignment rounding (activates the span)
    pub fn capacity(&self) -> usize {
        self.region().map_or(0, RawRegion::capacity)
    }

    /// Bytes currently reserved; zero while inactive
    pub fn used(&self) -> usize {
        self.raw.get().map_or(0, RawRegion::used)
    }

    /// Bytes still available (activates the span)
    pub fn available(&self) -> usize {
        self.region().map_or(0, RawRegion::available)
    }
}

impl<const N: usize> Default for InSituRegion<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: allocation activates the embedded span on first use, then behaves
// exactly like the other sequential regions.
unsafe impl<const N: usize> Allocator for InSituRegion<N> {
    #[inline]
    fn alignment(&self) -> usize {
        self.alignment
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        self.region()?.allocate(size)
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        match self.raw.get() {
            Some(raw) => raw.deallocate(block),
            None => block.is_null(),
        }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        if let Ok(raw) = self.region() {
            if let Some(done) = raw.reallocate(block, new_size) {
                return done;
            }
        }
        unsafe { reallocate_by_move(self, block, new_size) }
    }
}

// SAFETY: same contract as the other sequential regions.
unsafe impl<const N: usize> AlignedAllocator for InSituRegion<N> {
    unsafe fn aligned_allocate(&self, size: usize, align: usize) -> AllocResult<Block> {
        self.region()?.aligned_allocate(size, align)
    }
}

// SAFETY: slack or tail extension inside the embedded span.
unsafe impl<const N: usize> Expand for InSituRegion<N> {
    unsafe fn expand(&self, block: &mut Block, delta: usize) -> bool {
        match self.raw.get() {
            Some(raw) => raw.expand(block, delta),
            None => false,
        }
    }
}

// SAFETY: rewinds the cursor, invalidating all outstanding blocks.
unsafe impl<const N: usize> DeallocateAll for InSituRegion<N> {
    unsafe fn deallocate_all(&self) -> bool {
        if let Some(raw) = self.raw.get() {
            raw.deallocate_all();
        }
        true
    }
}

impl<const N: usize> Owns for InSituRegion<N> {
    fn owns(&self, block: &Block) -> Ownership {
        match self.raw.get() {
            Some(raw) => raw.owns(block),
            None => Ownership::NotOwned,
        }
    }
}
