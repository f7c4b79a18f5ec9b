//! Pipe-descriptor syscalls (component F over component E): creating a
//! pipe's fd pair and duplicating a descriptor.

use super::user;
use crate::error::KernelError;
use crate::process::table;

/// `pipe(out_ptr)`: create a pipe and write `(read_fd: u32, write_fd:
/// u32)` to `out_ptr`.
pub fn pipe(pid: u32, out_ptr: u32) -> Result<i32, KernelError> {
    let (read_fd, write_fd) = table::with(pid, |p| p.fds.pipe())
        .ok_or(KernelError::ProcessNotFound { pid })?
        .map_err(KernelError::from)?;
    let mut record = [0u8; 8];
    record[0..4].copy_from_slice(&(read_fd as u32).to_ne_bytes());
    record[4..8].copy_from_slice(&(write_fd as u32).to_ne_bytes());
    user::copy_to_user(out_ptr, &record)?;
    Ok(0)
}

/// `dup2(old_fd, new_fd)`: point `new_fd` at whatever `old_fd` refers
/// to, closing whatever `new_fd` previously held.
pub fn dup2(pid: u32, old_fd: u32, new_fd: u32) -> Result<i32, KernelError> {
    table::with(pid, |p| -> Result<(), KernelError> {
        let source = p.fds.get(old_fd as usize).map_err(KernelError::from)?;
        let _ = p.fds.close(new_fd as usize);
        match source {
            crate::fs::FileDescriptor::PipeRead(id) => crate::fs::pipe::add_reader(id),
            crate::fs::FileDescriptor::PipeWrite(id) => crate::fs::pipe::add_writer(id),
            _ => {}
        }
        p.fds.install(new_fd as usize, source).map_err(KernelError::from)
    })
    .ok_or(KernelError::ProcessNotFound { pid })??;
    Ok(new_fd as i32)
}
