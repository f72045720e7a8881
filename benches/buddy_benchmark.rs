use buddyheap::{BuddyAllocator, Region, MIN_LEAF};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_fixed_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("Fixed-Size Churn");

    {
        let region = Region::new_aligned(1 << 20).unwrap();
        let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), region.len()) };
        group.bench_function("alloc+release 64B", |b| {
            b.iter(|| {
                let ptr = heap.alloc(black_box(64)).unwrap();
                unsafe { heap.release(ptr.as_ptr(), 64) };
            });
        });
    }

    {
        let region = Region::new_aligned(1 << 20).unwrap();
        let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), region.len()) };
        group.bench_function("alloc+free 64B", |b| {
            b.iter(|| {
                let ptr = heap.alloc(black_box(64)).unwrap();
                unsafe { heap.free(ptr.as_ptr()) };
            });
        });
    }

    group.bench_function("Box::new([u8; 64]) baseline", |b| {
        b.iter(|| {
            black_box(Box::new([0u8; 64]));
        });
    });

    group.finish();
}

fn bench_varied_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Varied-Size Cycle");
    const REQUESTS: [usize; 6] = [24, 100, 512, 4000, 96, 17];

    let region = Region::new_aligned(1 << 20).unwrap();
    let mut heap = unsafe { BuddyAllocator::create(region.as_non_null(), region.len()) };

    group.bench_function("alloc 6 sizes, release all", |b| {
        b.iter(|| {
            let mut blocks = [core::ptr::NonNull::<u8>::dangling(); REQUESTS.len()];
            for (slot, &request) in blocks.iter_mut().zip(REQUESTS.iter()) {
                *slot = heap.alloc(request).unwrap();
            }
            for (block, &request) in blocks.iter().zip(REQUESTS.iter()) {
                unsafe { heap.release(block.as_ptr(), request) };
            }
        });
    });

    group.finish();
}

fn bench_deep_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("Deep Split");

    // Worst case: every cycle splits from the root down to a leaf and
    // coalesces all the way back up.
    let region = Region::new_aligned(1 << 20).unwrap();
    let size = region.len();
    let mut metadata =
        vec![0usize; BuddyAllocator::metadata_size(size).div_ceil(core::mem::size_of::<usize>())];
    let mut heap = unsafe {
        BuddyAllocator::init(
            region.as_non_null(),
            size,
            core::ptr::NonNull::new(metadata.as_mut_ptr().cast()).unwrap(),
        )
    };

    group.bench_function("leaf from pristine 1MiB", |b| {
        b.iter(|| {
            let ptr = heap.alloc(black_box(MIN_LEAF)).unwrap();
            unsafe { heap.release(ptr.as_ptr(), MIN_LEAF) };
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_churn,
    bench_varied_cycle,
    bench_deep_split
);
criterion_main!(benches);
