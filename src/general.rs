//! General purpose allocator
//!
//! One fixed composition of the building blocks, modeled on a jemalloc-like
//! size-class table:
//!
//! | request size        | served by                                       |
//! |---------------------|-------------------------------------------------|
//! | 1–8 bytes           | one free list of 8-byte nodes                   |
//! | 9–128, step 16      | bucketized free lists                           |
//! | 129–256, step 32    | bucketized free lists                           |
//! | 257–512, step 64    | bucketized free lists                           |
//! | 513–1024, step 128  | bucketized free lists                           |
//! | 1025–2048, step 256 | bucketized free lists                           |
//! | 2049–3584, step 512 | bucketized free lists                           |
//! | 3585–4072 KiB       | pool of 4 MiB bump regions                      |
//! | larger              | straight to the native allocator                |
//!
//! The routers are nested as a balanced binary tree, so any request is
//! routed in at most four comparisons. Every tier is thread-safe (atomic
//! free lists, stateless routers, a mutex-guarded region pool, the native
//! leaf), so the composition is `Send + Sync` and doubles as the
//! process-wide default via [`GeneralPurposeAllocator::global`].

use once_cell::sync::Lazy;

use crate::block::Block;
use crate::bucketizer::Bucketizer;
use crate::error::{AllocError, AllocResult};
use crate::freelist::FreeList;
use crate::native::NativeAllocator;
use crate::region_list::RegionList;
use crate::segregator::Segregator;
use crate::traits::{Allocator, Owns, Ownership};

/// Largest size served by the dedicated small-object free list
const SMALL_LIMIT: usize = 8;
/// Largest size served by the bucketized tiers
const BUCKET_LIMIT: usize = 3584;
/// Largest size served by the region pool; beyond this the native
/// allocator is hit directly
const REGION_LIMIT: usize = 4072 * 1024;
/// Span size of each pooled region
const REGION_SIZE: usize = 4 * 1024 * 1024;

type List = FreeList<NativeAllocator>;
type Tier = Bucketizer<List>;
type Regions = RegionList<NativeAllocator>;

type Root = Segregator<
    Segregator<Segregator<List, Tier>, Segregator<Tier, Tier>>,
    Segregator<Segregator<Tier, Tier>, Segregator<Tier, Segregator<Regions, NativeAllocator>>>,
>;

/// The process-default allocator composition
///
/// # Examples
/// ```
/// use strata_alloc::{Allocator, GeneralPurposeAllocator};
///
/// let gpa = GeneralPurposeAllocator::new()?;
/// unsafe {
///     let small = gpa.allocate(4)?;
///     let medium = gpa.allocate(100)?;
///     let huge = gpa.allocate(5_000_000)?;
///     assert!(gpa.deallocate(medium));
///     assert!(gpa.deallocate(huge));
///     assert!(gpa.deallocate(small));
/// }
/// # Ok::<(), strata_alloc::AllocError>(())
/// ```
pub struct GeneralPurposeAllocator {
    root: Root,
}

static GLOBAL: Lazy<GeneralPurposeAllocator> = Lazy::new(|| {
    #[cfg(feature = "logging")]
    tracing::info!("initializing process-wide general purpose allocator");
    GeneralPurposeAllocator::new().expect("default size-class table is statically valid")
});

fn tier(native: NativeAllocator, min: usize, max: usize, step: usize) -> AllocResult<Tier> {
    Bucketizer::new(min, max, step, |_, hi| FreeList::new(native, 0, hi))
}

impl GeneralPurposeAllocator {
    /// Creates a fresh instance of the composition
    pub fn new() -> AllocResult<Self> {
        let native = NativeAllocator::default();
        let root = Segregator::new(
            512,
            Segregator::new(
                128,
                Segregator::new(
                    SMALL_LIMIT,
                    FreeList::new(native, 0, SMALL_LIMIT)?,
                    tier(native, 1, 128, 16)?,
                ),
                Segregator::new(256, tier(native, 129, 256, 32)?, tier(native, 257, 512, 64)?),
            ),
            Segregator::new(
                2048,
                Segregator::new(
                    1024,
                    tier(native, 513, 1024, 128)?,
                    tier(native, 1025, 2048, 256)?,
                ),
                Segregator::new(
                    BUCKET_LIMIT,
                    tier(native, 2049, BUCKET_LIMIT, 512)?,
                    Segregator::new(
                        REGION_LIMIT,
                        RegionList::new(native, REGION_SIZE)?,
                        native,
                    ),
                ),
            ),
        );
        Ok(Self { root })
    }

    /// The process-wide instance, materialized on first use and never torn
    /// down.
    ///
    /// Prefer passing an allocator explicitly at API boundaries; the
    /// singleton exists for code paths that cannot thread one through.
    pub fn global() -> &'static GeneralPurposeAllocator {
        &GLOBAL
    }
}

// SAFETY: pure delegation to the router tree; the composition's contracts
// are the routers' contracts.
unsafe impl Allocator for GeneralPurposeAllocator {
    #[inline]
    fn alignment(&self) -> usize {
        self.root.alignment()
    }

    #[inline]
    fn good_alloc_size(&self, size: usize) -> usize {
        self.root.good_alloc_size(size)
    }

    unsafe fn allocate(&self, size: usize) -> AllocResult<Block> {
        if size == 0 {
            return Err(AllocError::zero_size());
        }
        unsafe { self.root.allocate(size) }
    }

    unsafe fn deallocate(&self, block: Block) -> bool {
        unsafe { self.root.deallocate(block) }
    }

    unsafe fn reallocate(&self, block: &mut Block, new_size: usize) -> bool {
        unsafe { self.root.reallocate(block, new_size) }
    }
}

impl Owns for GeneralPurposeAllocator {
    fn owns(&self, block: &Block) -> Ownership {
        self.root.owns(block)
    }
}
