//! Composable building blocks for memory allocators
//!
//! This crate provides small allocator components that nest and combine
//! into custom allocators in the style of size-class-segregated
//! (jemalloc-like) designs:
//!
//! - Leaf allocators: [`NativeAllocator`], the bump regions ([`Region`],
//!   [`BorrowedRegion`], [`InSituRegion`]) and the lock-free
//!   [`SharedRegion`]
//! - Composites: [`FreeList`], [`Bucketizer`], [`Segregator`] and
//!   [`RegionList`], each wrapping any allocator that exposes the
//!   capabilities it needs
//! - [`GeneralPurposeAllocator`]: one fixed composition of the above,
//!   usable as the process-wide default
//!
//! Composition is structural: a wrapper requires only the trait
//! capabilities it uses ([`Allocator`], [`AlignedAllocator`], [`Expand`],
//! [`DeallocateAll`], [`Owns`]), resolved at compile time, so absent
//! capabilities cost nothing and unsupported operations do not exist.
//!
//! # Features
//!
//! - `logging` (default): cold-path `tracing` events (construction, region
//!   pool growth, global initialization); never on the allocation fast path
//!
//! # Example
//!
//! ```
//! use strata_alloc::{Allocator, Bucketizer, FreeList, NativeAllocator, Segregator};
//!
//! // small sizes through bucketized free lists, the rest straight to malloc
//! let native = NativeAllocator::default();
//! let allocator = Segregator::new(
//!     256,
//!     Bucketizer::new(1, 256, 32, |_, hi| FreeList::new(native, 0, hi))?,
//!     native,
//! );
//!
//! unsafe {
//!     let block = allocator.allocate(100)?;
//!     assert_eq!(block.len(), 100);
//!     assert!(allocator.deallocate(block));
//! }
//! # Ok::<(), strata_alloc::AllocError>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod block;
mod bucketizer;
mod freelist;
mod general;
mod native;
mod region;
mod region_list;
mod segregator;

pub mod error;
pub mod traits;
pub mod utils;

pub use block::Block;
pub use bucketizer::Bucketizer;
pub use error::{AllocError, AllocResult};
pub use freelist::FreeList;
pub use general::GeneralPurposeAllocator;
pub use native::{NativeAllocFn, NativeAllocator, NativeFreeFn, NativeResizeFn};
pub use region::{BorrowedRegion, InSituRegion, Region, RegionConfig, SharedRegion};
pub use region_list::RegionList;
pub use segregator::Segregator;
pub use traits::{
    AlignedAllocator, Allocator, DeallocateAll, Expand, Owns, Ownership, reallocate_by_move,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
