//! Process management syscalls (component F over component D): fork,
//! exec, wait, spawn, kill, brk, and the small getpid/getppid/getargs/
//! process-listing introspection calls.

use super::user;
use crate::arch::x86::context::TrapFrame;
use crate::error::{KernelError, SyscallError};
use crate::process::{lifecycle, table, ProcessState};
use alloc::string::String;
use alloc::vec::Vec;

pub fn exit(pid: u32, code: i32) -> Result<i32, KernelError> {
    lifecycle::exit(pid, code);
    Ok(0)
}

pub fn fork(pid: u32) -> Result<i32, KernelError> {
    lifecycle::fork(pid).map(|child| child as i32)
}

/// `exec(path_ptr, args_ptr, args_len)`: read the path, load the file,
/// and replace the caller's image in place. `args_ptr`/`args_len` name
/// a raw byte buffer (not necessarily NUL-terminated); passing a null
/// pointer or zero length execs with no arguments.
pub fn exec(pid: u32, path_ptr: u32, args_ptr: u32, args_len: u32) -> Result<i32, KernelError> {
    let path = user::read_path(path_ptr)?;
    let (inode, fs_inode) = crate::fs::stat(&path)?;
    let mut buf = alloc::vec![0u8; fs_inode.size as usize];
    crate::fs::blockfs::BLOCK_FS.read(inode, 0, &mut buf)?;
    let args = read_args(args_ptr, args_len)?;
    lifecycle::exec(pid, &buf, args)?;
    Ok(0)
}

/// Read `args_len` raw bytes from `args_ptr` and hand them back as a
/// single-element argv so `getargs` can reconstruct the exact bytes
/// passed to `exec` rather than a reformatted, space-joined copy.
fn read_args(args_ptr: u32, args_len: u32) -> Result<Vec<String>, KernelError> {
    if args_ptr == 0 || args_len == 0 {
        return Ok(Vec::new());
    }
    let mut raw = alloc::vec![0u8; args_len as usize];
    user::copy_from_user(args_ptr, &mut raw)?;
    let joined =
        String::from_utf8(raw).map_err(|_| KernelError::InvalidArgument { name: "args", value: "not_utf8" })?;
    Ok(alloc::vec![joined])
}

/// `spawn(path_ptr)`: fork, then exec the new binary in the child.
/// Returns the child's pid to the parent; the child never returns here
/// (`exec` replaces its trap frame before control ever comes back to
/// user space).
pub fn spawn(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = user::read_path(path_ptr)?;
    let child_pid = lifecycle::fork(pid)?;
    let (inode, fs_inode) = crate::fs::stat(&path)?;
    let mut buf = alloc::vec![0u8; fs_inode.size as usize];
    crate::fs::blockfs::BLOCK_FS.read(inode, 0, &mut buf)?;
    lifecycle::exec(child_pid, &buf, Vec::new())?;
    Ok(child_pid as i32)
}

/// `wait(wanted_pid, status_ptr)`: reap a zombie child if one is
/// already available, writing its exit code to `status_ptr` (ignored
/// if null). Otherwise block until `exit()` wakes us.
pub fn wait(frame: &mut TrapFrame, pid: u32, wanted: i32, status_ptr: u32) -> Result<i32, KernelError> {
    let wanted = if wanted < 0 { None } else { Some(wanted as u32) };

    if let Some((child_pid, exit_code)) = lifecycle::try_reap(pid, wanted) {
        if status_ptr != 0 {
            user::copy_to_user(status_ptr, &exit_code.to_ne_bytes())?;
        }
        return Ok(child_pid as i32);
    }

    if !table::has_child(pid, wanted) {
        return Err(KernelError::SyscallError(SyscallError::NoSuchProcess));
    }

    super::park(frame, ProcessState::BlockedOnWait { child: wanted });
    Err(KernelError::WouldBlock)
}

pub fn kill(pid: u32, code: i32) -> Result<i32, KernelError> {
    lifecycle::kill(pid, code).map(|()| 0)
}

pub fn brk(pid: u32, requested_end: u32) -> Result<i32, KernelError> {
    lifecycle::brk(pid, requested_end as usize).map(|end| end as i32)
}

pub fn getpid(pid: u32) -> Result<i32, KernelError> {
    Ok(pid as i32)
}

pub fn getppid(pid: u32) -> Result<i32, KernelError> {
    table::with(pid, |p| p.parent.map(|pp| pp as i32).unwrap_or(-1))
        .ok_or(KernelError::ProcessNotFound { pid })
}

/// `getargs(buf_ptr, buf_len)`: join this process's argv with spaces
/// and copy as many bytes as fit; returns the number of bytes written.
pub fn getargs(pid: u32, buf_ptr: u32, buf_len: u32) -> Result<i32, KernelError> {
    let joined = table::with(pid, |p| p.args.join(" ")).ok_or(KernelError::ProcessNotFound { pid })?;
    let n = joined.len().min(buf_len as usize);
    if n > 0 {
        user::copy_to_user(buf_ptr, &joined.as_bytes()[..n])?;
    }
    Ok(n as i32)
}

pub fn process_count() -> Result<i32, KernelError> {
    Ok(table::count(|_| true) as i32)
}

/// `process_list(buf_ptr, max)`: copy up to `max` live pids into
/// `buf_ptr` as consecutive little-endian u32s. Returns the number
/// written.
pub fn process_list(buf_ptr: u32, max: u32) -> Result<i32, KernelError> {
    let mut pids: Vec<u32> = Vec::new();
    table::for_each_runnable(|pid, _| pids.push(pid));
    let n = pids.len().min(max as usize);
    for (i, pid) in pids.iter().take(n).enumerate() {
        user::copy_to_user(buf_ptr + (i * 4) as u32, &pid.to_ne_bytes())?;
    }
    Ok(n as i32)
}
