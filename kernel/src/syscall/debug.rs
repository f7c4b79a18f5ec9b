//! Introspection syscalls (component F): a single `HEAP_STATS` call
//! reporting physical frame usage. There is no embedded-application
//! loader in this kernel, so `INSTALL_EMBEDDED` has nothing to back it
//! and is not implemented.

use super::user;
use crate::error::KernelError;
use crate::mm::frame_allocator::FRAME_ALLOCATOR;

/// `heap_stats(out_ptr)`: writes `(total_frames: u32, free_frames: u32,
/// used_frames: u32)`. Returns 0.
pub fn heap_stats(out_ptr: u32) -> Result<i32, KernelError> {
    let stats = FRAME_ALLOCATOR.stats();
    let mut record = [0u8; 12];
    record[0..4].copy_from_slice(&(stats.total_frames as u32).to_ne_bytes());
    record[4..8].copy_from_slice(&(stats.free_frames as u32).to_ne_bytes());
    record[8..12].copy_from_slice(&(stats.used_frames as u32).to_ne_bytes());
    user::copy_to_user(out_ptr, &record)?;
    Ok(0)
}
