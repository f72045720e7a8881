//! Occupancy snapshots and diagnostic state dumps.

use core::fmt;

use serde::Serialize;

use crate::bits;
use crate::buddy::BuddyAllocator;
use crate::geometry::MIN_LEAF;
use crate::list::BlockLink;

/// Point-in-time summary of an allocator's geometry and occupancy.
#[derive(Clone, Debug, Serialize)]
pub struct AllocatorInfo {
    /// Base address of the managed region.
    pub address: usize,
    /// Total region size in bytes.
    pub size: usize,
    /// `log2` of the region size.
    pub total_levels: u32,
    /// Index of the deepest (leaf) level.
    pub max_level: u32,
    /// Smallest allocatable block size.
    pub min_allocation: usize,
    /// Node count of the block tree, as sized for the bitmap.
    pub max_indexes: usize,
    /// Total free bytes.
    pub available: usize,
    /// Total used bytes.
    pub used: usize,
    /// Largest single allocation currently possible.
    pub largest_available: usize,
}

impl BuddyAllocator {
    /// Captures an occupancy summary.
    #[must_use]
    pub fn info(&self) -> AllocatorInfo {
        let available = self.available();
        AllocatorInfo {
            address: self.address.as_ptr() as usize,
            size: self.geometry.size,
            total_levels: self.geometry.total_levels,
            max_level: self.geometry.max_level,
            min_allocation: MIN_LEAF,
            max_indexes: self.geometry.max_indexes,
            available,
            used: self.geometry.size - available,
            largest_available: self.largest_available(),
        }
    }

    /// Renders the free lists and both bitmap halves, level by level.
    ///
    /// Block positions print as offsets from the region base, so the
    /// output is a pure function of allocator state: two dumps compare
    /// equal exactly when the states match, which is what the test suite
    /// leans on for post-state comparison.
    #[must_use]
    pub fn dump(&self) -> Dump<'_> {
        Dump { allocator: self }
    }
}

/// Displayable state dump borrowed from [`BuddyAllocator::dump`].
pub struct Dump<'a> {
    allocator: &'a BuddyAllocator,
}

/// First tree index of `level`.
fn first_of(level: u32) -> usize {
    (1 << level) - 1
}

/// One past the last tree index of `level`.
fn last_of(level: u32) -> usize {
    (1 << (level + 1)) - 1
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.allocator;
        let geometry = &a.geometry;

        writeln!(f, "free blocks:")?;
        for level in 0..=geometry.max_level {
            write!(f, "  {:>6}: ", geometry.block_size(level))?;
            unsafe {
                let sentinel = a.sentinel(level);
                let mut cursor = BlockLink::next(sentinel);
                while cursor != sentinel {
                    let offset = a.offset_of(cursor.cast());
                    write!(f, "{}({}) ", offset, geometry.index_of(offset, level))?;
                    cursor = BlockLink::next(cursor);
                }
            }
            writeln!(f)?;
        }

        writeln!(f, "split index:")?;
        for level in 0..geometry.max_level {
            write!(
                f,
                "  {:>6} - {:>4}:{:<4}: ",
                geometry.block_size(level),
                first_of(level),
                last_of(level) - 1
            )?;
            for index in first_of(level)..last_of(level) {
                let set =
                    unsafe { bits::test(a.block_index.as_ptr(), geometry.split_index(index)) };
                f.write_str(if set { "1" } else { "0" })?;
            }
            writeln!(f)?;
        }

        writeln!(f, "free index:")?;
        for level in 0..geometry.max_level {
            write!(
                f,
                "  {:>6} - {:>4}:{:<4}: ",
                geometry.block_size(level + 1),
                first_of(level + 1),
                last_of(level + 1) - 1
            )?;
            // One xor bit per sibling pair, keyed by the parent index.
            for index in first_of(level)..last_of(level) {
                let set = unsafe { bits::test(a.block_index.as_ptr(), index) };
                f.write_str(if set { "1" } else { "0" })?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
