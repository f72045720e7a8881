//! The allocator core: split-on-demand allocation and toggle-and-test
//! coalescing over a caller-provided power-of-two region.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::bits;
use crate::geometry::{Geometry, MetadataLayout, MIN_LEAF};
use crate::list::BlockLink;

/// A binary buddy allocator over one power-of-two-sized memory region.
///
/// The value is a handle: the per-level free-list sentinels and the
/// split/free bitmap live in separate metadata storage, either supplied by
/// the caller ([`init`]) or carved out of the head of the managed region
/// itself ([`create`]). Free blocks store their own list links, so the
/// smallest serviceable request is [`MIN_LEAF`] bytes and the allocator
/// needs no heap of its own.
///
/// Out-of-memory is not an error condition: [`alloc`] returns `None` and
/// the allocator stays fully usable.
///
/// No internal synchronization is performed. A caller sharing the
/// allocator between threads must serialize every call; a single `Mutex`
/// around the whole allocator is sufficient.
///
/// [`init`]: Self::init
/// [`create`]: Self::create
/// [`alloc`]: Self::alloc
pub struct BuddyAllocator {
    pub(crate) address: NonNull<u8>,
    pub(crate) geometry: Geometry,
    pub(crate) free_blocks: NonNull<BlockLink>,
    pub(crate) block_index: NonNull<usize>,
    /// Set while [`Self::create`] bootstraps its metadata from the region
    /// tail; bootstrap allocations are permanent and must never be
    /// released.
    pub(crate) bootstrap: bool,
}

// The allocator exclusively owns its metadata and the free portion of its
// region; moving it to another thread is sound as long as calls stay
// serialized.
unsafe impl Send for BuddyAllocator {}

impl BuddyAllocator {
    /// Bytes of metadata storage required for a region of `region_size`
    /// bytes: the allocator header, one list sentinel per level, and the
    /// split/free bitmap.
    ///
    /// `region_size` must be a power of two at least `2 * MIN_LEAF`.
    #[must_use]
    pub const fn metadata_size(region_size: usize) -> usize {
        MetadataLayout::for_size(region_size).total_size
    }

    /// Initializes an allocator for the `size` bytes at `region`, with
    /// metadata in caller-supplied storage at `metadata`. The whole region
    /// starts out free.
    ///
    /// # Panics
    /// If `size` is not a power of two holding at least two leaf blocks.
    ///
    /// # Safety
    /// - `region` must be valid for reads and writes of `size` bytes,
    ///   aligned to at least [`MIN_LEAF`], and must stay valid for as long
    ///   as the allocator or any block from it is in use.
    /// - `metadata` must be valid for reads and writes of
    ///   [`metadata_size(size)`](Self::metadata_size) bytes, aligned to a
    ///   `usize`, disjoint from the region, and must stay valid for the
    ///   allocator's lifetime.
    pub unsafe fn init(region: NonNull<u8>, size: usize, metadata: NonNull<u8>) -> Self {
        assert!(size.is_power_of_two(), "region size must be a power of two");
        assert!(
            size >= 2 * MIN_LEAF,
            "region must hold at least two leaf blocks"
        );
        debug_assert_eq!(region.as_ptr() as usize % MIN_LEAF, 0);
        debug_assert_eq!(metadata.as_ptr() as usize % core::mem::align_of::<usize>(), 0);

        let geometry = Geometry::new(size);
        let layout = MetadataLayout::for_size(size);
        let allocator = Self {
            address: region,
            geometry,
            free_blocks: NonNull::new_unchecked(metadata.as_ptr().add(layout.sentinel_offset))
                .cast(),
            block_index: NonNull::new_unchecked(metadata.as_ptr().add(layout.bitmap_offset))
                .cast(),
            bootstrap: false,
        };

        for level in 0..=geometry.max_level {
            BlockLink::init(allocator.sentinel(level));
        }
        for word in 0..bits::words_for(geometry.max_indexes) {
            *allocator.block_index.as_ptr().add(word) = 0;
        }

        // The region enters as a single level-0 block.
        BlockLink::push_back(allocator.sentinel(0), region.cast());
        allocator
    }

    /// Initializes an allocator whose metadata lives inside the managed
    /// region itself.
    ///
    /// Construction runs in two phases. A bootstrap allocator is laid out
    /// at the region's tail and sees the whole region as free; it then
    /// allocates enough leaf blocks to cover the metadata footprint at the
    /// head. Those allocations are never freed — the bitmap itself records
    /// the reservation, with no separate "reserved" concept. Finally the
    /// metadata is recomputed at the head: the bitmap is copied
    /// word-for-word and each non-empty free chain is spliced onto its new
    /// sentinel, since the chain nodes live in region memory and are
    /// already in place.
    ///
    /// # Panics
    /// If `size` is not a power of two holding at least two leaf blocks,
    /// or is too small to self-host its own metadata.
    ///
    /// # Safety
    /// `region` must be valid for reads and writes of `size` bytes,
    /// aligned to at least [`MIN_LEAF`], and must stay valid for as long
    /// as the allocator or any block from it is in use.
    pub unsafe fn create(region: NonNull<u8>, size: usize) -> Self {
        let layout = MetadataLayout::for_size(size);
        let reserved_blocks = layout.total_size.div_ceil(MIN_LEAF);
        assert!(
            reserved_blocks * MIN_LEAF <= size / 2,
            "region too small to self-host its metadata"
        );

        let tail = NonNull::new_unchecked(region.as_ptr().add(size - layout.total_size));
        let mut staging = Self::init(region, size, tail);
        staging.bootstrap = true;

        for _ in 0..reserved_blocks {
            let block = staging.alloc_from_level(staging.geometry.max_level);
            debug_assert!(block.is_some());
        }

        // Same layout, placed at the head. The ghost allocations above
        // cover exactly this footprint, rounded up to leaf granularity.
        let allocator = Self {
            address: region,
            geometry: staging.geometry,
            free_blocks: NonNull::new_unchecked(region.as_ptr().add(layout.sentinel_offset))
                .cast(),
            block_index: NonNull::new_unchecked(region.as_ptr().add(layout.bitmap_offset))
                .cast(),
            bootstrap: false,
        };
        debug_assert!(layout.total_size <= reserved_blocks * MIN_LEAF);

        for word in 0..bits::words_for(allocator.geometry.max_indexes) {
            *allocator.block_index.as_ptr().add(word) = *staging.block_index.as_ptr().add(word);
        }
        for level in 0..=allocator.geometry.max_level {
            BlockLink::adopt(staging.sentinel(level), allocator.sentinel(level));
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            size,
            metadata = layout.total_size,
            reserved_blocks,
            "created self-hosted allocator"
        );

        allocator
    }

    /// Allocates a block of at least `size` bytes — in practice the
    /// smallest power-of-two block that fits, never less than
    /// [`MIN_LEAF`]. Returns `None` when no level can supply the request,
    /// including any request larger than the region.
    ///
    /// A zero-sized request returns a [`MIN_LEAF`] block.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.geometry.size {
            return None;
        }
        self.alloc_from_level(self.geometry.size_to_level(size))
    }

    /// Allocates for `layout`, requesting `max(size, align)` bytes.
    ///
    /// Blocks are aligned to their own size relative to the region base,
    /// so any alignment up to the block size is honored provided the
    /// region base itself is aligned at least that much.
    pub fn alloc_layout(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.alloc(layout.size().max(layout.align()))
    }

    /// Returns `ptr` to the allocator. `size` must equal the size passed
    /// to the matching [`alloc`](Self::alloc). A null `ptr` is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null, or a block obtained from this allocator and not
    /// released since, with `size` equal to the original request. Anything
    /// else silently corrupts the free lists and the bitmap.
    pub unsafe fn release(&mut self, ptr: *mut u8, size: usize) {
        let Some(ptr) = NonNull::new(ptr) else { return };
        debug_assert!(size <= self.geometry.size);
        self.release_at_level(ptr, self.geometry.size_to_level(size));
    }

    /// Returns `ptr` to the allocator without its size; the allocation
    /// level is recovered from the split bitmap by walking the block's
    /// ancestors. A null `ptr` is a no-op.
    ///
    /// Costs O(log(size / MIN_LEAF)) on top of [`release`](Self::release).
    ///
    /// # Safety
    /// `ptr` must be null, or a block obtained from this allocator and not
    /// released since.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else { return };
        debug_assert!(self.offset_of(ptr) < self.geometry.size);

        // Walk upward from the leaf view of `ptr`; the first split
        // ancestor pins the level the block was allocated at.
        let mut index = self.index_of_ptr(ptr, self.geometry.max_level);
        for level in (1..=self.geometry.max_level).rev() {
            index = (index - 1) >> 1;
            if bits::test(self.block_index.as_ptr(), self.geometry.split_index(index)) {
                self.release_at_level(ptr, level);
                return;
            }
        }

        // No split ancestor: the whole region was this one allocation.
        self.release_at_level(ptr, 0);
    }

    /// Size of the largest block currently allocable in one call, or 0
    /// when the region is exhausted.
    #[must_use]
    pub fn largest_available(&self) -> usize {
        for level in 0..=self.geometry.max_level {
            if unsafe { !BlockLink::is_empty(self.sentinel(level)) } {
                return self.geometry.block_size(level);
            }
        }
        0
    }

    /// Total free bytes, summed over every level's free list.
    #[must_use]
    pub fn available(&self) -> usize {
        let mut total = 0;
        for level in 0..=self.geometry.max_level {
            let mut blocks = 0;
            unsafe {
                let sentinel = self.sentinel(level);
                let mut cursor = BlockLink::next(sentinel);
                while cursor != sentinel {
                    blocks += 1;
                    cursor = BlockLink::next(cursor);
                }
            }
            total += blocks * self.geometry.block_size(level);
        }
        total
    }

    /// Total bytes currently held by callers (and, for a self-hosted
    /// allocator, by its own metadata).
    #[must_use]
    pub fn used(&self) -> usize {
        self.geometry.size - self.available()
    }

    /// Pops the first free block at `level` or above, splitting downward
    /// until a block of the requested level is in hand.
    fn alloc_from_level(&mut self, level: u32) -> Option<NonNull<u8>> {
        // Search backwards up the levels for a free block.
        let (block, mut at) = (0..=level).rev().find_map(|l| {
            unsafe { BlockLink::pop_front(self.sentinel(l)) }.map(|b| (b.cast::<u8>(), l))
        })?;
        let mut index = self.index_of_ptr(block, at);

        // Split until the block is the requested size. Each split marks
        // the node, flips the free-xor bit its parent keys (one toggle
        // accounts for both halves), and hands the right half to the next
        // level's free list.
        while at < level {
            unsafe {
                bits::set(self.block_index.as_ptr(), self.geometry.split_index(index));
                if at > 0 {
                    bits::toggle(self.block_index.as_ptr(), Geometry::free_index(index));
                }
                let buddy = self.buddy_of(block, at + 1);
                BlockLink::push_back(self.sentinel(at + 1), buddy.cast());
            }
            index = (index << 1) + 1;
            at += 1;
        }

        // Level 0 has no parent and therefore no free-xor bit; its state
        // is implicit in the level-0 list.
        if level > 0 {
            unsafe {
                bits::toggle(self.block_index.as_ptr(), Geometry::free_index(index));
            }
        }

        #[cfg(feature = "tracing")]
        if !self.bootstrap {
            tracing::trace!(level, offset = self.offset_of(block), "allocated block");
        }

        Some(block)
    }

    /// Releases the block at `ptr`, known to be allocated at `level`,
    /// coalescing with its buddy as far up as both halves are free.
    unsafe fn release_at_level(&mut self, mut ptr: NonNull<u8>, mut level: u32) {
        debug_assert!(!self.bootstrap);
        debug_assert!(self.offset_of(ptr) < self.geometry.size);

        let mut buddy = self.buddy_of(ptr, level);
        let mut index = self.index_of_ptr(ptr, level);

        if level > 0 {
            bits::toggle(self.block_index.as_ptr(), Geometry::free_index(index));
        }

        // The toggle left the parent-keyed bit clear exactly when both
        // children are now free, so a clear bit means: coalesce.
        while level > 0 && !bits::test(self.block_index.as_ptr(), Geometry::free_index(index)) {
            self.clear_split(index, level);
            BlockLink::remove(buddy.cast());

            index = (index - 1) >> 1;
            level -= 1;

            // Continue from the left half of the pair.
            if buddy < ptr {
                ptr = buddy;
            }
            buddy = self.buddy_of(ptr, level);

            if level > 0 {
                bits::toggle(self.block_index.as_ptr(), Geometry::free_index(index));
            }
        }

        self.clear_split(index, level);
        BlockLink::push_back(self.sentinel(level), ptr.cast());

        #[cfg(feature = "tracing")]
        tracing::trace!(
            level,
            offset = self.offset_of(ptr),
            size = self.geometry.block_size(level),
            "released block"
        );
    }

    /// Clears `index`'s split bit. Leaves store no split bit, so at the
    /// deepest level this is the defensive no-op the release path relies
    /// on.
    #[inline]
    unsafe fn clear_split(&mut self, index: usize, level: u32) {
        if level < self.geometry.max_level {
            bits::clear(self.block_index.as_ptr(), self.geometry.split_index(index));
        }
    }

    /// Sentinel of `level`'s free list.
    #[inline]
    pub(crate) fn sentinel(&self, level: u32) -> NonNull<BlockLink> {
        debug_assert!(level <= self.geometry.max_level);
        unsafe { NonNull::new_unchecked(self.free_blocks.as_ptr().add(level as usize)) }
    }

    /// Byte offset of `ptr` from the region base.
    #[inline]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - self.address.as_ptr() as usize
    }

    #[inline]
    fn index_of_ptr(&self, ptr: NonNull<u8>, level: u32) -> usize {
        self.geometry.index_of(self.offset_of(ptr), level)
    }

    /// Buddy of the block at `ptr`, at `level`. With the `aligned-regions`
    /// feature this is a pure address XOR, valid because such regions are
    /// aligned to their own size; the general path XORs the offset from
    /// the region base instead.
    #[inline]
    fn buddy_of(&self, ptr: NonNull<u8>, level: u32) -> NonNull<u8> {
        if cfg!(feature = "aligned-regions") {
            let addr = ptr.as_ptr() as usize ^ self.geometry.block_size(level);
            unsafe { NonNull::new_unchecked(addr as *mut u8) }
        } else {
            let offset = self.geometry.buddy_offset(self.offset_of(ptr), level);
            unsafe { NonNull::new_unchecked(self.address.as_ptr().add(offset)) }
        }
    }
}
