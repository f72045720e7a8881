#![cfg(windows)]

use core::ptr::NonNull;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};

/// Reserves and commits `size` bytes of zeroed, writable memory.
///
/// # Safety
/// Plain syscall wrapper; the returned region must eventually be passed to
/// [`unmap_region`].
pub(super) unsafe fn map_region(size: usize) -> Option<NonNull<u8>> {
    let ptr = VirtualAlloc(ptr::null(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    NonNull::new(ptr.cast::<u8>())
}

/// # Safety
/// `ptr` must be a region obtained from [`map_region`].
pub(super) unsafe fn unmap_region(ptr: *mut u8, _size: usize) {
    // MEM_RELEASE frees the entire reservation; the size must be zero.
    VirtualFree(ptr.cast(), 0, MEM_RELEASE);
}
