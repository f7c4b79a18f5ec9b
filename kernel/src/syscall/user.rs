//! Helpers for moving syscall arguments to and from user memory.
//!
//! Every syscall argument that is a pointer must go through
//! [`crate::mm::page_directory::AddressSpace::copy_from_user`]/`copy_to_user`
//! rather than being dereferenced directly -- these wrappers look the
//! calling process up in the process table so callers never touch a
//! raw pointer themselves.

use crate::error::{KernelError, SyscallError};
use crate::process::table;
use alloc::string::String;
use alloc::vec::Vec;

/// Longest path this kernel will read out of user memory in one go.
pub const PATH_MAX: usize = 256;

fn current_pid() -> Result<u32, KernelError> {
    table::current_pid().ok_or(KernelError::SyscallError(SyscallError::NoSuchProcess))
}

pub fn copy_from_user(ptr: u32, buf: &mut [u8]) -> Result<(), KernelError> {
    let pid = current_pid()?;
    table::with(pid, |p| p.page_directory.copy_from_user(ptr as usize, buf))
        .ok_or(KernelError::ProcessNotFound { pid })?
}

pub fn copy_to_user(ptr: u32, data: &[u8]) -> Result<(), KernelError> {
    let pid = current_pid()?;
    table::with(pid, |p| p.page_directory.copy_to_user(ptr as usize, data))
        .ok_or(KernelError::ProcessNotFound { pid })?
}

/// Read a NUL-terminated path string out of user memory, one chunk at
/// a time, capped at [`PATH_MAX`].
pub fn read_path(ptr: u32) -> Result<String, KernelError> {
    let mut bytes = Vec::with_capacity(64);
    let mut chunk = [0u8; 32];
    loop {
        copy_from_user(ptr + bytes.len() as u32, &mut chunk)?;
        for &b in &chunk {
            if b == 0 {
                return String::from_utf8(bytes)
                    .map_err(|_| KernelError::InvalidArgument { name: "path", value: "not_utf8" });
            }
            bytes.push(b);
            if bytes.len() >= PATH_MAX {
                return Err(KernelError::InvalidArgument { name: "path", value: "too_long" });
            }
        }
    }
}
