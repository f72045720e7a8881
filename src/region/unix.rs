#![cfg(unix)]

use core::ptr::NonNull;
use std::ptr;

use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

/// Maps `size` bytes of zeroed, writable memory.
///
/// # Safety
/// Plain syscall wrapper; the returned mapping must eventually be passed
/// to [`unmap_region`] with the same size.
pub(super) unsafe fn map_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        NonNull::new(ptr.cast::<u8>())
    }
}

/// # Safety
/// `ptr` must be a mapping obtained from [`map_region`] with this `size`.
pub(super) unsafe fn unmap_region(ptr: *mut u8, size: usize) {
    munmap(ptr.cast::<c_void>(), size);
}
