//! # `buddyheap` - Embeddable Binary Buddy Allocator
//!
//! Manages a single caller-provided, power-of-two-sized memory region and
//! services variable-sized requests by repeatedly halving and coalescing
//! power-of-two blocks. Built for freestanding and resource-constrained
//! environments where no underlying heap exists and where deterministic
//! fragmentation behavior and low metadata overhead matter more than raw
//! allocation throughput.
//!
//! ## Key Features
//!
//! - **Caller-owned memory**: the allocator never maps, grows, or frees the
//!   region; you hand it memory and, optionally, separate metadata storage
//! - **Self-hosting**: [`BuddyAllocator::create`] keeps all metadata inside
//!   the managed region by treating the metadata prefix as a permanent
//!   allocation
//! - **Compact bookkeeping**: a single bit array holds a split bit and a
//!   free-xor bit per node pair, so "is my buddy free?" is one toggle
//! - **Size-inferring free**: blocks can be released without their size;
//!   the split map recovers the allocation level in O(log n)
//!
//! ## Example
//!
//! ```rust
//! use buddyheap::{BuddyAllocator, Region};
//!
//! let region = Region::new_aligned(4096).unwrap();
//! let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), region.len()) };
//!
//! let before = heap.available();
//! let block = heap.alloc(100).expect("region exhausted");
//! // Requests round up to the next power-of-two block.
//! assert_eq!(heap.available(), before - 128);
//!
//! unsafe { heap.free(block.as_ptr()) };
//! assert_eq!(heap.available(), before);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod bits;
mod buddy;
mod geometry;
mod list;
pub mod region;
pub mod report;

pub use buddy::BuddyAllocator;
pub use geometry::MIN_LEAF;
pub use region::{Region, RegionError};
pub use report::{AllocatorInfo, Dump};

// Compile-time assertions pinning the layout the allocator is built on.
const _: () = {
    use core::mem;

    // The minimum leaf is exactly one embedded list node: two native
    // pointers, so any free block can hold its own links.
    assert!(MIN_LEAF == 2 * mem::size_of::<*mut u8>());
    assert!(MIN_LEAF == mem::size_of::<list::BlockLink>());

    // Leaf blocks (and therefore all blocks) can host a link node.
    assert!(mem::align_of::<list::BlockLink>() <= MIN_LEAF);
    assert!(MIN_LEAF % mem::align_of::<list::BlockLink>() == 0);

    // The metadata bitmap is addressed in whole words.
    assert!(bits::WORD_BITS.is_power_of_two());
};
