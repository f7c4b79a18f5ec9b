//! Copy-on-write page-directory service (component B).
//!
//! Physical memory below `KERNEL_PHYS_WINDOW_END` is identity-mapped by
//! the boot page directory that every process's page directory copies
//! its kernel-half entries from, so the kernel can dereference a
//! physical frame address directly as `*mut u8` without a separate
//! physical-memory window. User space occupies
//! `[USER_SPACE_START, USER_SPACE_END)`; everything above that is the
//! shared kernel half, present and global in every address space but
//! never user-accessible.

use crate::error::KernelError;
use crate::mm::frame_allocator::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};
use crate::mm::page_table::{decompose, PageDirectory, PageFlags, PageTable, PageTableEntry};

/// Every physical frame the allocator can ever hand out is identity
/// mapped into this range in every address space's kernel half, so the
/// raw `frame.as_phys_addr() as *mut u8` writes `map_alloc`/`clone_cow`/
/// the ELF loader do are valid no matter which process's page directory
/// happens to be loaded when they run. Matches `MAX_FRAMES` in
/// `frame_allocator`.
pub const KERNEL_PHYS_WINDOW_END: usize = 64 * 1024 * 1024; // 64 MiB
pub const USER_SPACE_START: usize = KERNEL_PHYS_WINDOW_END;
pub const USER_SPACE_END: usize = 0xC000_0000; // 3 GiB; above this is kernel-only
pub const USER_STACK_TOP: usize = USER_SPACE_END - FRAME_SIZE;
pub const USER_STACK_SIZE: usize = 256 * 1024;

/// Index of the first page-directory entry that belongs to user space.
fn pde_index_in_user_range(pde: usize) -> bool {
    let addr = pde << 22;
    (USER_SPACE_START..USER_SPACE_END).contains(&addr)
}

/// An address space: one physical page directory frame plus the page
/// table frames it references. Owns a reference to every frame it maps
/// through the frame allocator's refcount, so cloning and freeing are
/// both just refcount operations on the shared frames.
pub struct AddressSpace {
    pd_frame: FrameNumber,
}

fn frame_ptr(frame: FrameNumber) -> *mut u8 {
    frame.as_phys_addr() as *mut u8
}

fn pd_table(frame: FrameNumber) -> &'static mut PageDirectory {
    // SAFETY: physical memory is identity-mapped; `frame` was allocated
    // specifically to hold a PageDirectory and nothing else aliases it
    // outside this module's own locking (callers serialize through the
    // process table's lock).
    unsafe { &mut *(frame_ptr(frame) as *mut PageDirectory) }
}

fn pt_table(frame: FrameNumber) -> &'static mut PageTable {
    // SAFETY: see `pd_table`; the same identity-mapping and ownership
    // argument applies to page-table frames.
    unsafe { &mut *(frame_ptr(frame) as *mut PageTable) }
}

impl AddressSpace {
    /// Allocate a fresh address space with the kernel half of
    /// `template`'s page directory copied in (shared, not cloned — every
    /// process must see the same kernel mappings).
    pub fn create(template: Option<&AddressSpace>) -> Result<Self, KernelError> {
        let pd_frame = FRAME_ALLOCATOR.alloc()?;
        let pd = pd_table(pd_frame);
        for e in pd.entries.iter_mut() {
            e.clear();
        }
        if let Some(template) = template {
            let template_pd = pd_table(template.pd_frame);
            for i in 0..1024 {
                if !pde_index_in_user_range(i) && template_pd.entries[i].is_present() {
                    pd.entries[i] = template_pd.entries[i];
                }
            }
        }
        Ok(Self { pd_frame })
    }

    pub fn phys_addr(&self) -> u32 {
        self.pd_frame.as_phys_addr() as u32
    }

    fn pte_mut(&self, vaddr: usize) -> Option<&'static mut PageTableEntry> {
        let (pd_idx, pt_idx, _) = decompose(vaddr);
        let pd = pd_table(self.pd_frame);
        let pde = &mut pd.entries[pd_idx];
        if !pde.is_present() {
            return None;
        }
        let pt_frame = FrameNumber::from_phys_addr(pde.frame_addr() as usize);
        Some(&mut pt_table(pt_frame).entries[pt_idx])
    }

    fn pte_mut_or_create(&self, vaddr: usize) -> Result<&'static mut PageTableEntry, KernelError> {
        let (pd_idx, pt_idx, _) = decompose(vaddr);
        let pd = pd_table(self.pd_frame);
        let pde = &mut pd.entries[pd_idx];
        if !pde.is_present() {
            let pt_frame = FRAME_ALLOCATOR.alloc()?;
            pt_table(pt_frame).zero();
            *pde = PageTableEntry::new(
                pt_frame.as_phys_addr() as u32,
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            );
        }
        let pt_frame = FrameNumber::from_phys_addr(pde.frame_addr() as usize);
        Ok(&mut pt_table(pt_frame).entries[pt_idx])
    }

    /// Map `frame` at `vaddr` with `flags`. `vaddr` must be page-aligned.
    pub fn map(&self, vaddr: usize, frame: FrameNumber, flags: PageFlags) -> Result<(), KernelError> {
        let pte = self.pte_mut_or_create(vaddr)?;
        if pte.is_present() {
            return Err(KernelError::InvalidState {
                expected: "unmapped page",
                actual: "already mapped",
            });
        }
        *pte = PageTableEntry::new(frame.as_phys_addr() as u32, flags | PageFlags::PRESENT);
        crate::arch::x86::flush_tlb_address(vaddr);
        Ok(())
    }

    /// Allocate a fresh zeroed frame and map it at `vaddr`.
    pub fn map_alloc(&self, vaddr: usize, flags: PageFlags) -> Result<FrameNumber, KernelError> {
        let frame = FRAME_ALLOCATOR.alloc()?;
        // SAFETY: the frame was just allocated, is identity-mapped, and
        // has no other readers/writers yet.
        unsafe {
            core::ptr::write_bytes(frame_ptr(frame), 0, FRAME_SIZE);
        }
        if let Err(e) = self.map(vaddr, frame, flags) {
            FRAME_ALLOCATOR.free(frame);
            return Err(e);
        }
        Ok(frame)
    }

    /// Unmap `vaddr`, dropping this address space's reference to the
    /// backing frame.
    pub fn unmap(&self, vaddr: usize) -> Result<(), KernelError> {
        let pte = self.pte_mut(vaddr).ok_or(KernelError::UnmappedMemory { addr: vaddr })?;
        if !pte.is_present() {
            return Err(KernelError::UnmappedMemory { addr: vaddr });
        }
        let frame = FrameNumber::from_phys_addr(pte.frame_addr() as usize);
        pte.clear();
        crate::arch::x86::flush_tlb_address(vaddr);
        FRAME_ALLOCATOR.free(frame);
        Ok(())
    }

    /// Clone the user half of this address space as copy-on-write: every
    /// present, user-accessible page is shared (refcount bumped) and
    /// remapped read-only with the COW bit set in both the parent and
    /// the child, so the next write by either side triggers
    /// `handle_cow_fault`.
    pub fn clone_cow(&self) -> Result<Self, KernelError> {
        let child = Self::create(Some(self))?;
        let parent_pd = pd_table(self.pd_frame);

        for pd_idx in 0..1024 {
            if !pde_index_in_user_range(pd_idx) {
                continue;
            }
            let pde = parent_pd.entries[pd_idx];
            if !pde.is_present() {
                continue;
            }
            let parent_pt_frame = FrameNumber::from_phys_addr(pde.frame_addr() as usize);
            let child_pt_frame = FRAME_ALLOCATOR.alloc()?;
            pt_table(child_pt_frame).zero();

            for pt_idx in 0..1024 {
                let parent_entry = pt_table(parent_pt_frame).entries[pt_idx];
                if !parent_entry.is_present() {
                    continue;
                }
                let frame = FrameNumber::from_phys_addr(parent_entry.frame_addr() as usize);
                FRAME_ALLOCATOR.ref_inc(frame);

                let mut cow_flags = parent_entry.flags();
                cow_flags.remove(PageFlags::WRITABLE);
                cow_flags.insert(PageFlags::COW);

                let shared = PageTableEntry::new(frame.as_phys_addr() as u32, cow_flags);
                pt_table(parent_pt_frame).entries[pt_idx] = shared;
                pt_table(child_pt_frame).entries[pt_idx] = shared;
            }

            let child_pd = pd_table(child.pd_frame);
            child_pd.entries[pd_idx] = PageTableEntry::new(
                child_pt_frame.as_phys_addr() as u32,
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            );
        }

        crate::arch::x86::flush_tlb_all();
        Ok(child)
    }

    /// Handle a page fault at `vaddr` that the fault handler determined
    /// was a write to a COW page. Returns `Err` if `vaddr` is not
    /// actually COW-marked (a real protection violation).
    pub fn handle_cow_fault(&self, vaddr: usize) -> Result<(), KernelError> {
        let page_start = vaddr & !(FRAME_SIZE - 1);
        let pte = self
            .pte_mut(page_start)
            .ok_or(KernelError::UnmappedMemory { addr: vaddr })?;
        if !pte.flags().contains(PageFlags::COW) {
            return Err(KernelError::InvalidState {
                expected: "COW-marked page",
                actual: "non-COW page fault",
            });
        }

        let frame = FrameNumber::from_phys_addr(pte.frame_addr() as usize);
        if FRAME_ALLOCATOR.ref_count(frame) <= 1 {
            // Sole remaining owner: just reclaim write access.
            let mut flags = pte.flags();
            flags.remove(PageFlags::COW);
            flags.insert(PageFlags::WRITABLE);
            pte.set_flags(flags);
        } else {
            let new_frame = FRAME_ALLOCATOR.alloc()?;
            // SAFETY: both frames are identity-mapped physical pages;
            // `new_frame` was just allocated and has no other readers.
            unsafe {
                core::ptr::copy_nonoverlapping(frame_ptr(frame), frame_ptr(new_frame), FRAME_SIZE);
            }
            let mut flags = pte.flags();
            flags.remove(PageFlags::COW);
            flags.insert(PageFlags::WRITABLE);
            *pte = PageTableEntry::new(new_frame.as_phys_addr() as u32, flags);
            FRAME_ALLOCATOR.free(frame);
        }
        crate::arch::x86::flush_tlb_address(page_start);
        Ok(())
    }

    /// Check that every page in `[addr, addr + len)` is present and
    /// user-accessible, the validation every `copy_*_user`/`memset_user`
    /// call performs before touching memory.
    pub fn user_range_mapped(&self, addr: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        if addr < USER_SPACE_START || addr.saturating_add(len) > USER_SPACE_END {
            return false;
        }
        let first_page = addr & !(FRAME_SIZE - 1);
        let last_page = (addr + len - 1) & !(FRAME_SIZE - 1);
        let mut page = first_page;
        while page <= last_page {
            match self.pte_mut(page) {
                Some(pte) if pte.is_present() && pte.flags().contains(PageFlags::USER) => {}
                _ => return false,
            }
            page += FRAME_SIZE;
        }
        true
    }

    /// Copy `len` bytes from user address `src` into kernel buffer `dst`.
    pub fn copy_from_user(&self, src: usize, dst: &mut [u8]) -> Result<(), KernelError> {
        if !self.user_range_mapped(src, dst.len()) {
            return Err(KernelError::UnmappedMemory { addr: src });
        }
        // SAFETY: `user_range_mapped` just confirmed every page backing
        // `[src, src + dst.len())` is present and user-accessible in the
        // currently active address space.
        unsafe {
            core::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    /// Copy `src` into user address `dst`.
    pub fn copy_to_user(&self, dst: usize, src: &[u8]) -> Result<(), KernelError> {
        if !self.user_range_mapped(dst, src.len()) {
            return Err(KernelError::UnmappedMemory { addr: dst });
        }
        // SAFETY: see `copy_from_user`; the destination range was just
        // validated as present, writable, user-accessible memory.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    /// Fill `len` bytes starting at user address `addr` with `value`.
    pub fn memset_user(&self, addr: usize, value: u8, len: usize) -> Result<(), KernelError> {
        if !self.user_range_mapped(addr, len) {
            return Err(KernelError::UnmappedMemory { addr });
        }
        // SAFETY: see `copy_from_user`.
        unsafe {
            core::ptr::write_bytes(addr as *mut u8, value, len);
        }
        Ok(())
    }

    /// Tear down the user half of this address space, dropping this
    /// process's reference to every frame it mapped (COW siblings keep
    /// theirs alive via the refcount).
    pub fn destroy(&self) {
        let pd = pd_table(self.pd_frame);
        for pd_idx in 0..1024 {
            if !pde_index_in_user_range(pd_idx) {
                continue;
            }
            let pde = pd.entries[pd_idx];
            if !pde.is_present() {
                continue;
            }
            let pt_frame = FrameNumber::from_phys_addr(pde.frame_addr() as usize);
            for pte in pt_table(pt_frame).entries.iter() {
                if pte.is_present() {
                    let frame = FrameNumber::from_phys_addr(pte.frame_addr() as usize);
                    FRAME_ALLOCATOR.free(frame);
                }
            }
            FRAME_ALLOCATOR.free(pt_frame);
        }
        FRAME_ALLOCATOR.free(self.pd_frame);
    }
}
