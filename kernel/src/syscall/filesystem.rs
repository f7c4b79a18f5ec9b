//! Filesystem and file-descriptor syscalls (component F over component
//! G): open/close/read/write/seek/stat/listdir plus the namespace
//! operations (mkdir/rm/touch/rename) and cwd bookkeeping.

use super::user;
use crate::arch::x86::context::TrapFrame;
use crate::error::{FsError, KernelError};
use crate::process::{table, ProcessState};
use alloc::string::{String, ToString};

const INODE_TYPE_DIR: u8 = 2;

/// Resolve a possibly-relative path against `pid`'s cwd.
fn resolve(pid: u32, raw: &str) -> Result<String, KernelError> {
    if raw.starts_with('/') {
        return Ok(raw.to_string());
    }
    let cwd = table::with(pid, |p| p.cwd.clone()).ok_or(KernelError::ProcessNotFound { pid })?;
    Ok(if cwd == "/" {
        alloc::format!("/{}", raw)
    } else {
        alloc::format!("{}/{}", cwd, raw)
    })
}

fn split_parent(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some(("", name)) => (String::from("/"), name.to_string()),
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (String::from("/"), path.to_string()),
    }
}

pub fn open(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    table::with(pid, |p| p.fds.open(&path))
        .ok_or(KernelError::ProcessNotFound { pid })?
        .map(|fd| fd as i32)
        .map_err(KernelError::from)
}

pub fn close(pid: u32, fd: u32) -> Result<i32, KernelError> {
    table::with(pid, |p| p.fds.close(fd as usize))
        .ok_or(KernelError::ProcessNotFound { pid })?
        .map(|()| 0)
        .map_err(KernelError::from)
}

/// `read(fd, buf_ptr, len)`. A pipe with no data yet and at least one
/// writer left blocks: rewind the syscall instruction and park on the
/// pipe rather than spinning.
pub fn read(frame: &mut TrapFrame, pid: u32, fd: u32, buf_ptr: u32, len: u32) -> Result<i32, KernelError> {
    let mut buf = alloc::vec![0u8; len as usize];
    let result = table::with(pid, |p| p.fds.read(fd as usize, &mut buf)).ok_or(KernelError::ProcessNotFound { pid })?;
    match result {
        Ok(n) => {
            if n > 0 {
                user::copy_to_user(buf_ptr, &buf[..n])?;
            }
            Ok(n as i32)
        }
        Err(FsError::WouldBlock) => {
            let pipe_id = table::with(pid, |p| p.fds.get(fd as usize))
                .ok_or(KernelError::ProcessNotFound { pid })?
                .ok()
                .and_then(|d| match d {
                    crate::fs::FileDescriptor::PipeRead(id) => Some(id),
                    _ => None,
                });
            let Some(pipe_id) = pipe_id else {
                return Err(KernelError::FsError(FsError::BadFileDescriptor));
            };
            super::park(frame, ProcessState::BlockedOnPipe { pipe: pipe_id, for_read: true });
            Err(KernelError::WouldBlock)
        }
        Err(e) => Err(KernelError::from(e)),
    }
}

/// `write(fd, buf_ptr, len)`. Mirrors [`read`]'s blocking behavior for
/// a full pipe with at least one reader left.
pub fn write(frame: &mut TrapFrame, pid: u32, fd: u32, buf_ptr: u32, len: u32) -> Result<i32, KernelError> {
    let mut buf = alloc::vec![0u8; len as usize];
    user::copy_from_user(buf_ptr, &mut buf)?;
    let result = table::with(pid, |p| p.fds.write(fd as usize, &buf)).ok_or(KernelError::ProcessNotFound { pid })?;
    match result {
        Ok(n) => Ok(n as i32),
        Err(FsError::WouldBlock) => {
            let pipe_id = table::with(pid, |p| p.fds.get(fd as usize))
                .ok_or(KernelError::ProcessNotFound { pid })?
                .ok()
                .and_then(|d| match d {
                    crate::fs::FileDescriptor::PipeWrite(id) => Some(id),
                    _ => None,
                });
            let Some(pipe_id) = pipe_id else {
                return Err(KernelError::FsError(FsError::BadFileDescriptor));
            };
            super::park(frame, ProcessState::BlockedOnPipe { pipe: pipe_id, for_read: false });
            Err(KernelError::WouldBlock)
        }
        Err(e) => Err(KernelError::from(e)),
    }
}

pub fn seek(pid: u32, fd: u32, delta: i32, whence: u32) -> Result<i32, KernelError> {
    table::with(pid, |p| p.fds.seek(fd as usize, delta, whence as u8))
        .ok_or(KernelError::ProcessNotFound { pid })?
        .map(|off| off as i32)
        .map_err(KernelError::from)
}

/// `stat(path_ptr, out_ptr)`: writes a packed `(inode: u32, size: u32,
/// ty: u8, permissions: u8)` record. Returns 0 on success.
pub fn stat(pid: u32, path_ptr: u32, out_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let (inode, fs_inode) = crate::fs::stat(&path)?;
    let mut record = [0u8; 10];
    record[0..4].copy_from_slice(&inode.to_ne_bytes());
    record[4..8].copy_from_slice(&fs_inode.size.to_ne_bytes());
    record[8] = fs_inode.ty;
    record[9] = fs_inode.permissions;
    user::copy_to_user(out_ptr, &record)?;
    Ok(0)
}

/// `listdir(path_ptr, out_ptr, max)`: writes up to `max` 32-byte
/// records `(inode: u32, is_dir: u8, name: [u8; 27])`. Returns the
/// number of entries written.
pub fn listdir(pid: u32, path_ptr: u32, out_ptr: u32, max: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let entries = crate::fs::readdir(&path)?;
    let n = entries.len().min(max as usize);
    for (i, entry) in entries.iter().take(n).enumerate() {
        let mut record = [0u8; 32];
        record[0..4].copy_from_slice(&entry.inode.to_ne_bytes());
        record[4] = entry.is_dir as u8;
        let name_len = entry.name.iter().position(|&b| b == 0).unwrap_or(entry.name.len()).min(27);
        record[5..5 + name_len].copy_from_slice(&entry.name[..name_len]);
        user::copy_to_user(out_ptr + (i * 32) as u32, &record)?;
    }
    Ok(n as i32)
}

pub fn mkdir(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let (dir, name) = split_parent(&path);
    crate::fs::mkdir(&dir, &name)?;
    Ok(0)
}

pub fn rm(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    crate::fs::unlink(&path)?;
    Ok(0)
}

/// `touch(path_ptr)`: create an empty file and return its fd, like
/// `creat()`.
pub fn touch(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let (dir, name) = split_parent(&path);
    table::with(pid, |p| p.fds.create(&dir, &name))
        .ok_or(KernelError::ProcessNotFound { pid })?
        .map(|fd| fd as i32)
        .map_err(KernelError::from)
}

/// `writefile(path_ptr, buf_ptr, len)`: replace a file's entire
/// contents at offset 0, creating it if it doesn't already exist.
/// Frees whatever blocks the file previously held before allocating
/// fresh ones, unlike `write`'s in-place update through an open fd.
pub fn writefile(pid: u32, path_ptr: u32, buf_ptr: u32, len: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let mut buf = alloc::vec![0u8; len as usize];
    if len > 0 {
        user::copy_from_user(buf_ptr, &mut buf)?;
    }
    let (dir, name) = split_parent(&path);
    let n = crate::fs::write_whole(&dir, &name, &buf)?;
    Ok(n as i32)
}

pub fn rename(pid: u32, path_ptr: u32, new_path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let new_path = resolve(pid, &user::read_path(new_path_ptr)?)?;
    let (new_dir, new_name) = split_parent(&new_path);
    crate::fs::rename(&path, &new_dir, &new_name)?;
    Ok(0)
}

pub fn fs_free_blocks() -> Result<i32, KernelError> {
    Ok(crate::fs::blockfs::BLOCK_FS.free_blocks() as i32)
}

pub fn getcwd(pid: u32, buf_ptr: u32, buf_len: u32) -> Result<i32, KernelError> {
    let cwd = table::with(pid, |p| p.cwd.clone()).ok_or(KernelError::ProcessNotFound { pid })?;
    let n = cwd.len().min(buf_len as usize);
    user::copy_to_user(buf_ptr, &cwd.as_bytes()[..n])?;
    Ok(n as i32)
}

pub fn setcwd(pid: u32, path_ptr: u32) -> Result<i32, KernelError> {
    let path = resolve(pid, &user::read_path(path_ptr)?)?;
    let (_, fs_inode) = crate::fs::stat(&path)?;
    if fs_inode.ty != INODE_TYPE_DIR {
        return Err(KernelError::FsError(FsError::NotADirectory));
    }
    table::with(pid, |p| p.cwd = path).ok_or(KernelError::ProcessNotFound { pid })?;
    Ok(0)
}
