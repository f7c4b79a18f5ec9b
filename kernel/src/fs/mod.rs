//! Filesystem layer: the block filesystem (component G), pipe IPC
//! (component E), and the per-process file-descriptor table that glues
//! both to the syscall dispatcher (component F).
//!
//! There is no generic VFS/mount-table abstraction here — one block
//! device is mounted as the one filesystem, and pipes are a distinct fd
//! kind rather than filesystem nodes, matching the flat design the
//! on-disk format and the bounded pipe pool both assume.

extern crate alloc;

pub mod blockfs;
pub mod pipe;

use crate::error::FsError;
use alloc::string::String;
use alloc::vec::Vec;
use blockfs::{DirEntry, BLOCK_FS};
use pipe::PipeId;

/// Boot drive the root filesystem is mounted from.
pub const ROOT_DRIVE: u8 = 0;

/// Fixed-size per-process descriptor table. fds 0/1/2 are reserved for
/// the controlling terminal, matching the Unix convention the syscall
/// layer's stdio calls assume.
pub const PROCESS_MAX_FDS: usize = 16;
pub const FD_STDIN: usize = 0;
pub const FD_STDOUT: usize = 1;
pub const FD_STDERR: usize = 2;

#[derive(Debug, Clone, Copy)]
pub enum FileDescriptor {
    File { inode: u32, offset: u32 },
    PipeRead(PipeId),
    PipeWrite(PipeId),
    Tty,
}

/// Mount the root filesystem. Called once from `kernel_main_impl` after
/// `drivers::init`.
pub fn init() {
    log::info!("[fs] mounting root filesystem from drive {}", ROOT_DRIVE);
    match BLOCK_FS.mount(ROOT_DRIVE) {
        Ok(()) => log::info!("[fs] root filesystem mounted"),
        Err(e) => log::warn!("[fs] failed to mount root filesystem: {:?}", e),
    }
}

/// A process's open-file table. Every `Process` owns one; `fork`
/// duplicates it by cloning the entries and bumping the pipe ref counts
/// of any pipe ends it copies.
pub struct FileTable {
    entries: [Option<FileDescriptor>; PROCESS_MAX_FDS],
}

impl FileTable {
    pub fn new() -> Self {
        let mut entries = [None; PROCESS_MAX_FDS];
        entries[FD_STDIN] = Some(FileDescriptor::Tty);
        entries[FD_STDOUT] = Some(FileDescriptor::Tty);
        entries[FD_STDERR] = Some(FileDescriptor::Tty);
        Self { entries }
    }

    fn alloc_slot(&mut self) -> Result<usize, FsError> {
        self.entries
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)
    }

    pub fn get(&self, fd: usize) -> Result<FileDescriptor, FsError> {
        self.entries
            .get(fd)
            .and_then(|e| *e)
            .ok_or(FsError::BadFileDescriptor)
    }

    /// Duplicate every live entry into a child table, taking an
    /// additional reference on any pipe end it copies. Used by `fork`.
    pub fn fork(&self) -> Self {
        let mut entries = self.entries;
        for entry in entries.iter().flatten() {
            match entry {
                FileDescriptor::PipeRead(id) => pipe::add_reader(*id),
                FileDescriptor::PipeWrite(id) => pipe::add_writer(*id),
                _ => {}
            }
        }
        Self { entries }
    }

    /// Place `entry` directly at `fd`, overwriting whatever was there.
    /// Used by `dup2`; the caller is responsible for closing/refcounting
    /// whatever previously lived in that slot and bumping refcounts on
    /// `entry` itself.
    pub fn install(&mut self, fd: usize, entry: FileDescriptor) -> Result<(), FsError> {
        let slot = self.entries.get_mut(fd).ok_or(FsError::BadFileDescriptor)?;
        *slot = Some(entry);
        Ok(())
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        let entry = self.entries.get_mut(fd).ok_or(FsError::BadFileDescriptor)?;
        match entry.take() {
            Some(FileDescriptor::PipeRead(id)) => pipe::close_read(id),
            Some(FileDescriptor::PipeWrite(id)) => pipe::close_write(id),
            Some(_) => {}
            None => return Err(FsError::BadFileDescriptor),
        }
        Ok(())
    }

    pub fn open(&mut self, path: &str) -> Result<usize, FsError> {
        let (inode, _) = BLOCK_FS.stat(path)?;
        let slot = self.alloc_slot()?;
        self.entries[slot] = Some(FileDescriptor::File { inode, offset: 0 });
        Ok(slot)
    }

    pub fn create(&mut self, dir: &str, name: &str) -> Result<usize, FsError> {
        let inode = BLOCK_FS.create(dir, name, false)?;
        let slot = self.alloc_slot()?;
        self.entries[slot] = Some(FileDescriptor::File { inode, offset: 0 });
        Ok(slot)
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        match self.get(fd)? {
            FileDescriptor::File { inode, offset } => {
                let n = BLOCK_FS.read(inode, offset, buf)?;
                if let Some(FileDescriptor::File { offset, .. }) = self.entries[fd].as_mut() {
                    *offset += n as u32;
                }
                Ok(n)
            }
            FileDescriptor::PipeRead(id) => match pipe::try_read(id, buf) {
                Ok(n) => Ok(n),
                Err(crate::error::PipeError::Empty) => Err(FsError::WouldBlock),
                Err(_) => Err(FsError::BadFileDescriptor),
            },
            FileDescriptor::PipeWrite(_) => Err(FsError::BadFileDescriptor),
            FileDescriptor::Tty => Err(FsError::NotAFile),
        }
    }

    pub fn write(&mut self, fd: usize, data: &[u8]) -> Result<usize, FsError> {
        match self.get(fd)? {
            FileDescriptor::File { inode, offset } => {
                let n = BLOCK_FS.write(inode, offset, data)?;
                if let Some(FileDescriptor::File { offset, .. }) = self.entries[fd].as_mut() {
                    *offset += n as u32;
                }
                Ok(n)
            }
            FileDescriptor::PipeWrite(id) => match pipe::try_write(id, data) {
                Ok(n) => Ok(n),
                Err(crate::error::PipeError::Full) => Err(FsError::WouldBlock),
                Err(_) => Err(FsError::BadFileDescriptor),
            },
            FileDescriptor::PipeRead(_) => Err(FsError::BadFileDescriptor),
            FileDescriptor::Tty => {
                for &byte in data {
                    crate::print!("{}", byte as char);
                }
                Ok(data.len())
            }
        }
    }

    /// Reposition a file descriptor's offset. `whence` follows the usual
    /// convention: 0 = from start, 1 = from current offset, 2 = from
    /// end-of-file. Returns the new absolute offset.
    pub fn seek(&mut self, fd: usize, delta: i32, whence: u8) -> Result<u32, FsError> {
        let FileDescriptor::File { inode, offset } = self.get(fd)? else {
            return Err(FsError::NotAFile);
        };
        let size = blockfs::BLOCK_FS.inode(inode).size;
        let base = match whence {
            0 => 0,
            1 => offset,
            2 => size,
            _ => return Err(FsError::InvalidPath),
        };
        let new_offset = base as i64 + delta as i64;
        if new_offset < 0 || new_offset > size as i64 {
            return Err(FsError::InvalidPath);
        }
        let new_offset = new_offset as u32;
        if let Some(FileDescriptor::File { offset, .. }) = self.entries[fd].as_mut() {
            *offset = new_offset;
        }
        Ok(new_offset)
    }

    /// Create a pipe, returning `(read_fd, write_fd)`.
    pub fn pipe(&mut self) -> Result<(usize, usize), FsError> {
        let id = pipe::create().map_err(|_| FsError::TooManyOpenFiles)?;
        let read_fd = self.alloc_slot()?;
        self.entries[read_fd] = Some(FileDescriptor::PipeRead(id));
        let write_fd = match self.alloc_slot() {
            Ok(slot) => slot,
            Err(e) => {
                self.entries[read_fd] = None;
                pipe::close_read(id);
                pipe::close_write(id);
                return Err(e);
            }
        };
        self.entries[write_fd] = Some(FileDescriptor::PipeWrite(id));
        Ok((read_fd, write_fd))
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileTable {
    fn drop(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            match entry {
                FileDescriptor::PipeRead(id) => pipe::close_read(*id),
                FileDescriptor::PipeWrite(id) => pipe::close_write(*id),
                _ => {}
            }
        }
    }
}

pub fn mkdir(dir: &str, name: &str) -> Result<u32, FsError> {
    BLOCK_FS.create(dir, name, true)
}

pub fn unlink(path: &str) -> Result<(), FsError> {
    BLOCK_FS.delete(path)
}

pub fn rename(path: &str, new_dir: &str, new_name: &str) -> Result<(), FsError> {
    BLOCK_FS.rename(path, new_dir, new_name)
}

/// `WRITEFILE`: replace a file's entire contents, creating it under
/// `dir`/`name` first if it doesn't already exist.
pub fn write_whole(dir: &str, name: &str, data: &[u8]) -> Result<usize, FsError> {
    let path = join_path(dir, name);
    let inode = match BLOCK_FS.stat(&path) {
        Ok((inode, _)) => inode,
        Err(FsError::NotFound) => BLOCK_FS.create(dir, name, false)?,
        Err(e) => return Err(e),
    };
    BLOCK_FS.write_whole(inode, data)
}

pub fn readdir(path: &str) -> Result<Vec<DirEntry>, FsError> {
    BLOCK_FS.list(path)
}

pub fn stat(path: &str) -> Result<(u32, blockfs::FsInode), FsError> {
    BLOCK_FS.stat(path)
}

/// Join a directory and a name into a display path, used for error
/// messages and the `pwd`-style shell glue syscalls.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        alloc::format!("/{}", name)
    } else {
        alloc::format!("{}/{}", dir, name)
    }
}
