//! Kernel heap bring-up.
//!
//! A single `linked_list_allocator::LockedHeap` backs every `alloc::*`
//! allocation the kernel makes (process table entries, pipe buffers,
//! filesystem path strings, ...). No slab layer: this kernel's
//! allocation volume is low enough that a first-fit free list is plenty,
//! and the teacher's slab allocator pulled in per-CPU-cache machinery
//! this single-CPU kernel has no use for.

pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Initialize the global allocator over `[heap_start, heap_start +
/// HEAP_SIZE)`. The caller must have already mapped that range
/// read/write in the kernel's address space.
///
/// # Safety
/// Must be called exactly once, after paging is enabled and before any
/// `alloc::*` type is used.
pub unsafe fn init(heap_start: usize) {
    // SAFETY: delegated to the caller's contract above.
    unsafe {
        crate::ALLOCATOR.lock().init(heap_start as *mut u8, HEAP_SIZE);
    }
}
