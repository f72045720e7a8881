//! Walkthrough of both metadata placement modes.
//!
//! Run with `cargo run --example basic_usage`.

use core::mem;
use core::ptr::NonNull;

use anyhow::Result;
use buddyheap::{BuddyAllocator, Region};

const DEMO_REGION_SIZE: usize = 512;

fn main() -> Result<()> {
    println!("external metadata allocator");
    println!("===========================");
    let region = Region::new_aligned(DEMO_REGION_SIZE)?;
    let mut metadata = vec![
        0usize;
        BuddyAllocator::metadata_size(DEMO_REGION_SIZE).div_ceil(mem::size_of::<usize>())
    ];
    let mut heap = unsafe {
        BuddyAllocator::init(
            region.as_non_null(),
            DEMO_REGION_SIZE,
            NonNull::new(metadata.as_mut_ptr().cast()).unwrap(),
        )
    };

    println!("starting state");
    println!("{}", heap.dump());

    let p1 = heap.alloc(32);
    let p2 = heap.alloc(31);
    let p3 = heap.alloc(33);
    let p4 = heap.alloc(8);

    println!("outstanding blocks");
    println!("{}", heap.dump());

    // Freeing without the size walks the split map instead.
    for ptr in [p3, p2, p1, p4] {
        unsafe { heap.free(ptr.map_or(core::ptr::null_mut(), NonNull::as_ptr)) };
    }
    println!("terminating state");
    println!("{}", heap.dump());

    println!("self-hosted metadata allocator");
    println!("==============================");
    let region = Region::new(DEMO_REGION_SIZE)?;
    let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), DEMO_REGION_SIZE) };

    println!("{}", serde_json::to_string_pretty(&heap.info())?);

    // Releasing with the known size skips the split-map walk.
    let ptr = heap.alloc(100).expect("region exhausted");
    unsafe { heap.release(ptr.as_ptr(), 100) };

    let ptr = heap.alloc(100).expect("region exhausted");
    unsafe { heap.free(ptr.as_ptr()) };

    println!("after round trips");
    println!("{}", heap.dump());
    Ok(())
}
