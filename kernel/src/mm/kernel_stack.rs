//! Kernel-stack allocator (component C).
//!
//! Grounded in the original kernel's `kernel_stack_bitmap` design: a
//! fixed region of `KERNEL_STACK_SLOTS` two-page slots, each with its
//! low page left unmapped as a guard page so a kernel-stack overflow
//! faults instead of corrupting the adjacent stack. A process's stack
//! cannot be freed out from under a context switch that is still
//! executing on it, so frees are deferred into a small fixed array and
//! flushed by the scheduler on the next switch, after the outgoing
//! process's own stack is no longer live.

use crate::mm::frame_allocator::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};
use crate::mm::page_table::PageFlags;
use crate::mm::AddressSpace;
use spin::Mutex;

pub const KERNEL_STACK_SLOTS: usize = 128;
pub const KERNEL_STACK_SLOT_SIZE: usize = 2 * FRAME_SIZE;
pub const KERNEL_STACK_BASE: usize = 0xF000_0000;
const DEFERRED_CAPACITY: usize = 8;

struct Inner {
    used: [bool; KERNEL_STACK_SLOTS],
    deferred: [Option<usize>; DEFERRED_CAPACITY],
    deferred_count: usize,
}

static STACKS: Mutex<Inner> = Mutex::new(Inner {
    used: [false; KERNEL_STACK_SLOTS],
    deferred: [None; DEFERRED_CAPACITY],
    deferred_count: 0,
});

pub fn init() {
    log::info!("[mm::kernel_stack] {} slots available", KERNEL_STACK_SLOTS);
}

fn slot_base(slot: usize) -> usize {
    KERNEL_STACK_BASE + slot * KERNEL_STACK_SLOT_SIZE
}

/// Allocate a kernel stack slot mapped into `address_space`. Returns
/// `(base, top)` where `top` is the initial stack pointer (the high end,
/// growing down) and `base` is the slot's low address (guard page sits
/// one page below `base`, intentionally left unmapped).
pub fn alloc(address_space: &AddressSpace) -> Option<(usize, usize)> {
    let mut inner = STACKS.lock();
    let slot = inner.used.iter().position(|&used| !used)?;
    inner.used[slot] = true;
    drop(inner);

    let base = slot_base(slot);
    let frame = match FRAME_ALLOCATOR.alloc() {
        Ok(f) => f,
        Err(_) => {
            STACKS.lock().used[slot] = false;
            return None;
        }
    };
    if address_space
        .map(base, frame, PageFlags::PRESENT | PageFlags::WRITABLE)
        .is_err()
    {
        FRAME_ALLOCATOR.free(frame);
        STACKS.lock().used[slot] = false;
        return None;
    }
    // The page at `base - FRAME_SIZE` (the slot's "low page") is
    // deliberately left unmapped as a guard page.
    Some((base, base + FRAME_SIZE))
}

fn slot_of(base: usize) -> usize {
    (base - KERNEL_STACK_BASE) / KERNEL_STACK_SLOT_SIZE
}

/// Defer freeing the stack at `base`: it may still be the stack the
/// caller is executing on, so the actual unmap happens in
/// `flush_deferred` once the scheduler has switched off of it.
pub fn free_deferred(base: usize) {
    let mut inner = STACKS.lock();
    if inner.deferred_count < DEFERRED_CAPACITY {
        inner.deferred[inner.deferred_count] = Some(base);
        inner.deferred_count += 1;
    }
}

/// Actually unmap and release every deferred stack. Called by the
/// scheduler immediately after a context switch completes, when none of
/// the deferred stacks can possibly be the current one.
pub fn flush_deferred(address_space: &AddressSpace) {
    let mut inner = STACKS.lock();
    let count = inner.deferred_count;
    inner.deferred_count = 0;
    let bases: [Option<usize>; DEFERRED_CAPACITY] = inner.deferred;
    drop(inner);

    for base in bases.into_iter().take(count).flatten() {
        let _ = address_space.unmap(base);
        STACKS.lock().used[slot_of(base)] = false;
    }
}

pub fn is_current(base: usize, current_esp: usize) -> bool {
    current_esp >= base && current_esp < base + FRAME_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_base_is_page_aligned() {
        assert_eq!(slot_base(0) % FRAME_SIZE, 0);
        assert_eq!(slot_base(1) - slot_base(0), KERNEL_STACK_SLOT_SIZE);
    }

    #[test]
    fn slot_of_inverts_slot_base() {
        assert_eq!(slot_of(slot_base(5)), 5);
    }
}
