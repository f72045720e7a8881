//! Stochastic allocate/expire workload over a self-hosted region.
//!
//! Every allocation is stamped and parked in a delay bucket; when its turn
//! comes back around the stamp is verified and the block freed without its
//! size. After the run drains, occupancy must return to the
//! post-construction baseline.

use core::ptr::NonNull;

use buddyheap::{BuddyAllocator, Region, MIN_LEAF};

const SIM_MEMORY_SIZE: usize = 1 << 20;
const SIM_MAX_ALLOC_SIZE: usize = 100 * 1024;
const SIM_MAX_DELAY: usize = 5;
const SIM_SEED: u64 = 0x0137_1730;

/// Deterministic xorshift64 so failures reproduce.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn run_simulation(steps: usize) {
    let region = Region::new(SIM_MEMORY_SIZE).unwrap();
    let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), SIM_MEMORY_SIZE) };
    let baseline_used = heap.used();

    let mut rng = XorShift(SIM_SEED);
    let mut buckets: Vec<Vec<(NonNull<u8>, u64)>> = vec![Vec::new(); SIM_MAX_DELAY];
    let mut outstanding = 0usize;
    let mut failures = 0usize;

    for mark in 0..steps {
        let size = 1 + rng.below(SIM_MAX_ALLOC_SIZE);
        let delay = rng.below(SIM_MAX_DELAY);
        let slot = mark % SIM_MAX_DELAY;

        match heap.alloc(size) {
            Some(ptr) => {
                // The block is caller memory now; stamp it to catch any
                // overlap with allocator bookkeeping.
                unsafe { ptr.as_ptr().cast::<u64>().write(mark as u64) };
                buckets[(slot + delay) % SIM_MAX_DELAY].push((ptr, mark as u64));
                outstanding += 1;
            }
            None => {
                let block = size.max(MIN_LEAF).next_power_of_two();
                assert!(heap.largest_available() < block);
                failures += 1;
            }
        }

        for (ptr, stamp) in buckets[slot].split_off(0) {
            assert_eq!(unsafe { ptr.as_ptr().cast::<u64>().read() }, stamp);
            unsafe { heap.free(ptr.as_ptr()) };
            outstanding -= 1;
        }
    }

    for bucket in &mut buckets {
        for (ptr, stamp) in bucket.split_off(0) {
            assert_eq!(unsafe { ptr.as_ptr().cast::<u64>().read() }, stamp);
            unsafe { heap.free(ptr.as_ptr()) };
            outstanding -= 1;
        }
    }

    assert_eq!(outstanding, 0);
    assert_eq!(heap.used(), baseline_used, "bytes lost after {failures} failed requests");
    assert_eq!(heap.available() + heap.used(), SIM_MEMORY_SIZE);
}

#[test]
fn short_stochastic_workload_drains_clean() {
    run_simulation(100_000);
}

#[test]
#[ignore = "ten-million-step soak run"]
fn full_stochastic_workload_drains_clean() {
    run_simulation(10_000_000);
}
