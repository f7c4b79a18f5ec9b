//! Block-based persistent filesystem (component G).
//!
//! On-disk format pinned down from the original kernel's `fs.h`: magic
//! `"ROHS"`, 512-byte blocks doubling as inodes and sectors, a flat
//! 256-entry inode table, and *implicit* directories — there is no
//! on-disk name-to-inode directory-entry array; a directory's children
//! are simply every inode whose `parent_inode` equals it. Free-block
//! accounting is reference-based: a block is free iff no inode's direct
//! or indirect pointers name it, rather than maintained in a bitmap.
//! Data block 0 is a permanent sentinel meaning "no block" and is never
//! handed out.

extern crate alloc;

use crate::drivers::storage;
use crate::error::FsError;
use spin::Mutex;

pub const FS_MAGIC: u32 = 0x524F_4853; // "ROHS" little-endian
pub const FS_VERSION: u32 = 1;
pub const FS_BLOCK_SIZE: usize = 512;
pub const FS_MAX_INODES: usize = 256;
pub const FS_MAX_FILENAME: usize = 28;
pub const FS_INODE_BLOCKS: usize = 12;
pub const FS_DIRECT_BLOCKS: usize = 11;
pub const FS_INDIRECT_BLOCK: usize = 11;
pub const FS_PTRS_PER_BLOCK: usize = 128;
pub const ROOT_INODE: u32 = 0;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Free = 0,
    File = 1,
    Directory = 2,
}

impl InodeType {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => InodeType::File,
            2 => InodeType::Directory,
            _ => InodeType::Free,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct FsSuperblock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_blocks: u32,
    pub data_blocks: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub first_data_block: u32,
    pub reserved: [u8; 476],
}

const _: () = assert!(core::mem::size_of::<FsSuperblock>() == FS_BLOCK_SIZE);

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct FsInode {
    pub size: u32,
    pub ty: u8,
    pub permissions: u8,
    pub parent_inode: u16,
    pub blocks: [u32; FS_INODE_BLOCKS],
    pub name: [u8; FS_MAX_FILENAME],
}

const _: () = assert!(core::mem::size_of::<FsInode>() == 84);

impl FsInode {
    const EMPTY: Self = Self {
        size: 0,
        ty: InodeType::Free as u8,
        permissions: 0,
        parent_inode: 0,
        blocks: [0; FS_INODE_BLOCKS],
        name: [0; FS_MAX_FILENAME],
    };

    fn inode_type(&self) -> InodeType {
        InodeType::from_u8(self.ty)
    }

    fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn set_name(&mut self, name: &str) -> Result<(), FsError> {
        if name.len() >= FS_MAX_FILENAME {
            return Err(FsError::NameTooLong);
        }
        self.name = [0; FS_MAX_FILENAME];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }
}

const INODES_PER_BLOCK: usize = FS_BLOCK_SIZE / core::mem::size_of::<FsInode>();

#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub inode: u32,
    pub name: [u8; FS_MAX_FILENAME],
    pub is_dir: bool,
}

struct Inner {
    drive: u8,
    mounted: bool,
    superblock: FsSuperblock,
    inodes: alloc::vec::Vec<FsInode>,
}

impl Inner {
    const fn unmounted() -> Self {
        Self {
            drive: 0,
            mounted: false,
            superblock: FsSuperblock {
                magic: 0,
                version: 0,
                block_size: 0,
                total_blocks: 0,
                inode_blocks: 0,
                data_blocks: 0,
                free_blocks: 0,
                free_inodes: 0,
                first_data_block: 0,
                reserved: [0; 476],
            },
            inodes: alloc::vec::Vec::new(),
        }
    }

    fn read_block(&self, block: u32, buf: &mut [u8; FS_BLOCK_SIZE]) -> Result<(), FsError> {
        if storage::ata_read_sectors(self.drive, block, 1, buf) {
            Ok(())
        } else {
            Err(FsError::IoError)
        }
    }

    fn write_block(&self, block: u32, buf: &[u8; FS_BLOCK_SIZE]) -> Result<(), FsError> {
        if storage::ata_write_sectors(self.drive, block, 1, buf) {
            Ok(())
        } else {
            Err(FsError::IoError)
        }
    }

    fn inode_block_for(&self, inode_idx: usize) -> u32 {
        1 + (inode_idx / INODES_PER_BLOCK) as u32
    }

    fn flush_inode(&self, inode_idx: usize) -> Result<(), FsError> {
        let block_idx = self.inode_block_for(inode_idx);
        let base = (inode_idx / INODES_PER_BLOCK) * INODES_PER_BLOCK;
        let mut buf = [0u8; FS_BLOCK_SIZE];
        for slot in 0..INODES_PER_BLOCK {
            let idx = base + slot;
            if idx >= FS_MAX_INODES {
                break;
            }
            let inode = self.inodes[idx];
            let bytes = unsafe {
                core::slice::from_raw_parts(
                    &inode as *const FsInode as *const u8,
                    core::mem::size_of::<FsInode>(),
                )
            };
            let off = slot * core::mem::size_of::<FsInode>();
            buf[off..off + bytes.len()].copy_from_slice(bytes);
        }
        self.write_block(block_idx, &buf)
    }

    fn flush_superblock(&self) -> Result<(), FsError> {
        let bytes = unsafe {
            core::slice::from_raw_parts(
                &self.superblock as *const FsSuperblock as *const u8,
                FS_BLOCK_SIZE,
            )
        };
        let mut buf = [0u8; FS_BLOCK_SIZE];
        buf.copy_from_slice(bytes);
        self.write_block(0, &buf)
    }

    /// A data block is free iff no inode's direct or indirect pointers
    /// reference it. Block 0 is the permanent "unallocated" sentinel and
    /// is never returned. Scans inodes in index order, matching the
    /// original kernel's free-block search.
    fn find_free_block(&self) -> Result<u32, FsError> {
        'candidate: for block in 1..self.superblock.data_blocks {
            let abs = self.superblock.first_data_block + block;
            for inode in &self.inodes {
                if inode.inode_type() == InodeType::Free {
                    continue;
                }
                for &direct in &inode.blocks[..FS_DIRECT_BLOCKS] {
                    if direct == abs {
                        continue 'candidate;
                    }
                }
                let indirect = inode.blocks[FS_INDIRECT_BLOCK];
                if indirect != 0 {
                    let mut ptrs = [0u8; FS_BLOCK_SIZE];
                    if self.read_block(indirect, &mut ptrs).is_ok() {
                        for chunk in ptrs.chunks_exact(4) {
                            let ptr = u32::from_le_bytes(chunk.try_into().unwrap());
                            if ptr == abs {
                                continue 'candidate;
                            }
                        }
                    }
                }
            }
            return Ok(abs);
        }
        Err(FsError::NoSpace)
    }

    fn find_free_inode(&self) -> Result<usize, FsError> {
        self.inodes
            .iter()
            .position(|i| i.inode_type() == InodeType::Free)
            .ok_or(FsError::NoInodes)
    }

    fn resolve(&self, path: &str) -> Result<u32, FsError> {
        if path == "/" || path.is_empty() {
            return Ok(ROOT_INODE);
        }
        let mut current = ROOT_INODE;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = self.lookup_child(current, component)?;
        }
        Ok(current)
    }

    fn lookup_child(&self, dir_inode: u32, name: &str) -> Result<u32, FsError> {
        for (idx, inode) in self.inodes.iter().enumerate() {
            if inode.inode_type() != InodeType::Free
                && inode.parent_inode as u32 == dir_inode
                && inode.name_str() == name
            {
                return Ok(idx as u32);
            }
        }
        Err(FsError::NotFound)
    }

    fn list_dir(&self, dir_inode: u32) -> alloc::vec::Vec<DirEntry> {
        let mut out = alloc::vec::Vec::new();
        for (idx, inode) in self.inodes.iter().enumerate() {
            if idx as u32 == dir_inode {
                continue;
            }
            if inode.inode_type() != InodeType::Free && inode.parent_inode as u32 == dir_inode {
                out.push(DirEntry {
                    inode: idx as u32,
                    name: inode.name,
                    is_dir: inode.inode_type() == InodeType::Directory,
                });
            }
        }
        out
    }

    fn block_for_offset(&self, inode: &FsInode, block_idx: usize, allocate: bool) -> Result<Option<u32>, FsError> {
        if block_idx < FS_DIRECT_BLOCKS {
            if inode.blocks[block_idx] == 0 && allocate {
                return Ok(None); // caller allocates and stores back
            }
            return Ok(if inode.blocks[block_idx] == 0 {
                None
            } else {
                Some(inode.blocks[block_idx])
            });
        }
        let indirect_idx = block_idx - FS_DIRECT_BLOCKS;
        if indirect_idx >= FS_PTRS_PER_BLOCK {
            return Err(FsError::FileTooLarge);
        }
        if inode.blocks[FS_INDIRECT_BLOCK] == 0 {
            return Ok(None);
        }
        let mut ptrs = [0u8; FS_BLOCK_SIZE];
        self.read_block(inode.blocks[FS_INDIRECT_BLOCK], &mut ptrs)?;
        let off = indirect_idx * 4;
        let ptr = u32::from_le_bytes(ptrs[off..off + 4].try_into().unwrap());
        Ok(if ptr == 0 { None } else { Some(ptr) })
    }

    fn ensure_block(&mut self, inode_idx: usize, block_idx: usize) -> Result<u32, FsError> {
        if let Some(existing) = self.block_for_offset(&self.inodes[inode_idx], block_idx, true)? {
            return Ok(existing);
        }
        let new_block = self.find_free_block()?;

        if block_idx < FS_DIRECT_BLOCKS {
            self.inodes[inode_idx].blocks[block_idx] = new_block;
        } else {
            let indirect_idx = block_idx - FS_DIRECT_BLOCKS;
            if indirect_idx >= FS_PTRS_PER_BLOCK {
                return Err(FsError::FileTooLarge);
            }
            if self.inodes[inode_idx].blocks[FS_INDIRECT_BLOCK] == 0 {
                let indirect_block = self.find_free_block()?;
                self.write_block(indirect_block, &[0u8; FS_BLOCK_SIZE])?;
                self.inodes[inode_idx].blocks[FS_INDIRECT_BLOCK] = indirect_block;
            }
            let indirect_block = self.inodes[inode_idx].blocks[FS_INDIRECT_BLOCK];
            let mut ptrs = [0u8; FS_BLOCK_SIZE];
            self.read_block(indirect_block, &mut ptrs)?;
            ptrs[indirect_idx * 4..indirect_idx * 4 + 4].copy_from_slice(&new_block.to_le_bytes());
            self.write_block(indirect_block, &ptrs)?;
        }
        Ok(new_block)
    }
}

pub struct BlockFs {
    inner: Mutex<Inner>,
}

impl BlockFs {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::unmounted()),
        }
    }

    pub fn mount(&self, drive: u8) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        let mut sb_buf = [0u8; FS_BLOCK_SIZE];
        if !storage::ata_read_sectors(drive, 0, 1, &mut sb_buf) {
            return Err(FsError::IoError);
        }
        // SAFETY: `FsSuperblock` is `repr(C, packed)` and exactly
        // FS_BLOCK_SIZE bytes (asserted above), so any 512-byte sector
        // can be reinterpreted as one.
        let superblock = unsafe { core::ptr::read_unaligned(sb_buf.as_ptr() as *const FsSuperblock) };
        if superblock.magic != FS_MAGIC || superblock.version != FS_VERSION {
            return Err(FsError::InvalidPath);
        }

        let mut inodes = alloc::vec::Vec::with_capacity(FS_MAX_INODES);
        let inode_blocks = superblock.inode_blocks;
        let mut loaded = 0;
        for block in 1..=inode_blocks {
            if loaded >= FS_MAX_INODES {
                break;
            }
            let mut buf = [0u8; FS_BLOCK_SIZE];
            if !storage::ata_read_sectors(drive, block, 1, &mut buf) {
                return Err(FsError::IoError);
            }
            for slot in 0..INODES_PER_BLOCK {
                if loaded >= FS_MAX_INODES {
                    break;
                }
                let off = slot * core::mem::size_of::<FsInode>();
                // SAFETY: `FsInode` is `repr(C, packed)`; `off` stays
                // within the 512-byte `buf` because
                // `INODES_PER_BLOCK * size_of::<FsInode>() <=
                // FS_BLOCK_SIZE`.
                let inode = unsafe { core::ptr::read_unaligned(buf[off..].as_ptr() as *const FsInode) };
                inodes.push(inode);
                loaded += 1;
            }
        }
        while inodes.len() < FS_MAX_INODES {
            inodes.push(FsInode::EMPTY);
        }

        inner.drive = drive;
        inner.superblock = superblock;
        inner.inodes = inodes;
        inner.mounted = true;
        log::info!(
            "[fs] mounted drive {} ({} inodes, {} data blocks)",
            drive,
            FS_MAX_INODES,
            { superblock.data_blocks }
        );
        Ok(())
    }

    pub fn unmount(&self) -> Result<(), FsError> {
        let inner = self.inner.lock();
        if !inner.mounted {
            return Err(FsError::NotMounted);
        }
        for idx in 0..FS_MAX_INODES {
            inner.flush_inode(idx)?;
        }
        inner.flush_superblock()?;
        storage::ata_flush(inner.drive);
        Ok(())
    }

    pub fn stat(&self, path: &str) -> Result<(u32, FsInode), FsError> {
        let inner = self.inner.lock();
        let idx = inner.resolve(path)?;
        Ok((idx, inner.inodes[idx as usize]))
    }

    pub fn inode(&self, idx: u32) -> FsInode {
        self.inner.lock().inodes[idx as usize]
    }

    pub fn list(&self, dir_path: &str) -> Result<alloc::vec::Vec<DirEntry>, FsError> {
        let inner = self.inner.lock();
        let dir_inode = inner.resolve(dir_path)?;
        if inner.inodes[dir_inode as usize].inode_type() != InodeType::Directory && dir_inode != ROOT_INODE {
            return Err(FsError::NotADirectory);
        }
        Ok(inner.list_dir(dir_inode))
    }

    pub fn create(&self, dir_path: &str, name: &str, is_dir: bool) -> Result<u32, FsError> {
        if name.is_empty() || name.contains('/') {
            return Err(FsError::InvalidPath);
        }
        let mut inner = self.inner.lock();
        let dir_inode = inner.resolve(dir_path)?;
        if inner.lookup_child(dir_inode, name).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let new_idx = inner.find_free_inode()?;
        let mut inode = FsInode::EMPTY;
        inode.ty = if is_dir { InodeType::Directory } else { InodeType::File } as u8;
        inode.parent_inode = dir_inode as u16;
        inode.set_name(name)?;
        inner.inodes[new_idx] = inode;
        inner.flush_inode(new_idx)?;
        Ok(new_idx as u32)
    }

    pub fn delete(&self, path: &str) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        let idx = inner.resolve(path)?;
        if idx == ROOT_INODE {
            return Err(FsError::PermissionDenied);
        }
        if inner.inodes[idx as usize].inode_type() == InodeType::Directory
            && !inner.list_dir(idx).is_empty()
        {
            return Err(FsError::DirectoryNotEmpty);
        }
        inner.inodes[idx as usize] = FsInode::EMPTY;
        inner.flush_inode(idx as usize)
    }

    pub fn rename(&self, path: &str, new_dir_path: &str, new_name: &str) -> Result<(), FsError> {
        if new_name.is_empty() || new_name.contains('/') {
            return Err(FsError::InvalidPath);
        }
        let mut inner = self.inner.lock();
        let idx = inner.resolve(path)?;
        let new_dir = inner.resolve(new_dir_path)?;
        if inner.lookup_child(new_dir, new_name).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        inner.inodes[idx as usize].parent_inode = new_dir as u16;
        inner.inodes[idx as usize].set_name(new_name)?;
        inner.flush_inode(idx as usize)
    }

    pub fn read(&self, inode_idx: u32, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let inner = self.inner.lock();
        let inode = inner.inodes[inode_idx as usize];
        if inode.inode_type() != InodeType::File {
            return Err(FsError::NotAFile);
        }
        let size = inode.size;
        if offset >= size {
            return Ok(0);
        }
        let to_read = buf.len().min((size - offset) as usize);
        let mut done = 0;
        while done < to_read {
            let file_pos = offset as usize + done;
            let block_idx = file_pos / FS_BLOCK_SIZE;
            let block_off = file_pos % FS_BLOCK_SIZE;
            let chunk = (FS_BLOCK_SIZE - block_off).min(to_read - done);

            let mut block_buf = [0u8; FS_BLOCK_SIZE];
            if let Some(block) = inner.block_for_offset(&inode, block_idx, false)? {
                inner.read_block(block, &mut block_buf)?;
            }
            buf[done..done + chunk].copy_from_slice(&block_buf[block_off..block_off + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    pub fn write(&self, inode_idx: u32, offset: u32, data: &[u8]) -> Result<usize, FsError> {
        let mut inner = self.inner.lock();
        if inner.inodes[inode_idx as usize].inode_type() != InodeType::File {
            return Err(FsError::NotAFile);
        }
        let mut done = 0;
        while done < data.len() {
            let file_pos = offset as usize + done;
            let block_idx = file_pos / FS_BLOCK_SIZE;
            let block_off = file_pos % FS_BLOCK_SIZE;
            let chunk = (FS_BLOCK_SIZE - block_off).min(data.len() - done);

            let block = inner.ensure_block(inode_idx as usize, block_idx)?;
            let mut block_buf = [0u8; FS_BLOCK_SIZE];
            if block_off != 0 || chunk != FS_BLOCK_SIZE {
                inner.read_block(block, &mut block_buf)?;
            }
            block_buf[block_off..block_off + chunk].copy_from_slice(&data[done..done + chunk]);
            inner.write_block(block, &block_buf)?;
            done += chunk;
        }
        let new_size = offset as usize + done;
        if new_size as u32 > inner.inodes[inode_idx as usize].size {
            inner.inodes[inode_idx as usize].size = new_size as u32;
        }
        inner.flush_inode(inode_idx as usize)?;
        Ok(done)
    }

    pub fn truncate(&self, inode_idx: u32, new_size: u32) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        inner.inodes[inode_idx as usize].size = new_size;
        inner.flush_inode(inode_idx as usize)
    }

    /// `WRITEFILE`: replace a file's entire contents at offset 0. Frees
    /// every block the inode currently owns before allocating fresh
    /// ones, rather than overwriting in place like [`Self::write`].
    pub fn write_whole(&self, inode_idx: u32, data: &[u8]) -> Result<usize, FsError> {
        let mut inner = self.inner.lock();
        if inner.inodes[inode_idx as usize].inode_type() != InodeType::File {
            return Err(FsError::NotAFile);
        }
        inner.inodes[inode_idx as usize].blocks = [0; FS_INODE_BLOCKS];
        inner.inodes[inode_idx as usize].size = 0;

        let mut done = 0;
        while done < data.len() {
            let block_idx = done / FS_BLOCK_SIZE;
            let block_off = done % FS_BLOCK_SIZE;
            let chunk = (FS_BLOCK_SIZE - block_off).min(data.len() - done);

            let block = inner.ensure_block(inode_idx as usize, block_idx)?;
            let mut block_buf = [0u8; FS_BLOCK_SIZE];
            if block_off != 0 || chunk != FS_BLOCK_SIZE {
                inner.read_block(block, &mut block_buf)?;
            }
            block_buf[block_off..block_off + chunk].copy_from_slice(&data[done..done + chunk]);
            inner.write_block(block, &block_buf)?;
            done += chunk;
        }
        inner.inodes[inode_idx as usize].size = done as u32;
        inner.flush_inode(inode_idx as usize)?;
        Ok(done)
    }

    /// Count data blocks referenced by no inode, by the same
    /// reference-scan `find_free_block` uses to locate one.
    pub fn free_blocks(&self) -> u32 {
        let inner = self.inner.lock();
        let mut referenced = alloc::vec![false; inner.superblock.data_blocks as usize];
        for inode in &inner.inodes {
            if inode.inode_type() == InodeType::Free {
                continue;
            }
            for &direct in &inode.blocks[..FS_DIRECT_BLOCKS] {
                if direct != 0 {
                    let rel = direct - inner.superblock.first_data_block;
                    referenced[rel as usize] = true;
                }
            }
            let indirect = inode.blocks[FS_INDIRECT_BLOCK];
            if indirect != 0 {
                let rel = indirect - inner.superblock.first_data_block;
                referenced[rel as usize] = true;
                let mut ptrs = [0u8; FS_BLOCK_SIZE];
                if inner.read_block(indirect, &mut ptrs).is_ok() {
                    for chunk in ptrs.chunks_exact(4) {
                        let ptr = u32::from_le_bytes(chunk.try_into().unwrap());
                        if ptr != 0 {
                            let rel = ptr - inner.superblock.first_data_block;
                            referenced[rel as usize] = true;
                        }
                    }
                }
            }
        }
        // Block 0 is the permanent sentinel, never free.
        referenced.iter().skip(1).filter(|&&r| !r).count() as u32
    }
}

pub static BLOCK_FS: BlockFs = BlockFs::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_and_superblock_sizes_match_format() {
        assert_eq!(core::mem::size_of::<FsInode>(), 84);
        assert_eq!(core::mem::size_of::<FsSuperblock>(), FS_BLOCK_SIZE);
    }

    #[test]
    fn name_round_trips() {
        let mut inode = FsInode::EMPTY;
        inode.set_name("hello.txt").unwrap();
        assert_eq!(inode.name_str(), "hello.txt");
    }

    #[test]
    fn name_too_long_rejected() {
        let mut inode = FsInode::EMPTY;
        let long_name = "x".repeat(FS_MAX_FILENAME);
        assert!(inode.set_name(&long_name).is_err());
    }
}
