//! Process lifecycle operations (component D): spawn, fork, exec, wait,
//! exit, kill, brk.

use super::pcb::{ProcessControlBlock, ProcessState, DEFAULT_PRIORITY, DEFAULT_TIME_SLICE};
use super::table;
use crate::arch::x86::context::TrapFrame;
use crate::error::KernelError;
use crate::fs::FileTable;
use crate::mm::page_table::PageFlags;
use crate::mm::{AddressSpace, USER_SPACE_START, USER_STACK_SIZE, USER_STACK_TOP};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

const HEAP_DEFAULT_SIZE: usize = 64 * 1024;

fn map_user_stack(address_space: &AddressSpace) -> Result<(), KernelError> {
    let pages = USER_STACK_SIZE / crate::mm::FRAME_SIZE;
    for i in 0..pages {
        let vaddr = USER_STACK_TOP - (i + 1) * crate::mm::FRAME_SIZE;
        address_space.map_alloc(vaddr, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER)?;
    }
    Ok(())
}

/// Load `elf_data` into a new address space and register a new process
/// with no parent (used once, for the first userspace process).
pub fn spawn(name: &str, elf_data: &[u8], args: Vec<String>) -> Result<u32, KernelError> {
    spawn_with_parent(name, elf_data, args, None)
}

fn spawn_with_parent(name: &str, elf_data: &[u8], args: Vec<String>, parent: Option<u32>) -> Result<u32, KernelError> {
    let address_space = AddressSpace::create(Some(crate::mm::kernel_address_space()))?;
    let entry = crate::elf::load(elf_data, &address_space)?;
    map_user_stack(&address_space)?;

    let (kernel_stack_base, kernel_stack_top) =
        crate::mm::kernel_stack::alloc(&address_space).ok_or(KernelError::ResourceExhausted { resource: "kernel stacks" })?;

    let heap_base = USER_SPACE_START + 16 * 1024 * 1024; // leave headroom past a typical small binary's image
    for i in 0..(HEAP_DEFAULT_SIZE / crate::mm::FRAME_SIZE) {
        address_space.map_alloc(
            heap_base + i * crate::mm::FRAME_SIZE,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        )?;
    }

    let pid = table::alloc_pid();
    let pcb = ProcessControlBlock {
        pid,
        parent,
        name: name.to_string(),
        args,
        state: ProcessState::Ready,
        priority: DEFAULT_PRIORITY,
        time_slice: DEFAULT_TIME_SLICE,
        total_time: 0,
        page_directory: address_space,
        kernel_stack_base,
        kernel_stack_top,
        user_stack_top: USER_STACK_TOP,
        heap_base,
        heap_end: heap_base + HEAP_DEFAULT_SIZE,
        trap_frame: TrapFrame::new_user(entry, USER_STACK_TOP as u32),
        fds: FileTable::new(),
        cwd: String::from("/"),
        wait_status_ptr: 0,
        exit_code: 0,
        uid: 0,
        gid: 0,
    };
    table::insert(pcb)
}

/// Copy-on-write fork of the process currently running `parent_pid`.
/// Returns the child's pid; the child's own view of the return value
/// (`eax == 0`) is set directly in its trap frame.
pub fn fork(parent_pid: u32) -> Result<u32, KernelError> {
    let mut child_as = None;
    let mut snapshot: Option<(String, Vec<String>, u8, usize, usize, TrapFrame, FileTable, String, u32, u32)> = None;

    table::with(parent_pid, |parent| {
        child_as = Some(parent.page_directory.clone_cow());
        snapshot = Some((
            parent.name.clone(),
            parent.args.clone(),
            parent.priority,
            parent.heap_base,
            parent.heap_end,
            parent.trap_frame,
            parent.fds.fork(),
            parent.cwd.clone(),
            parent.uid,
            parent.gid,
        ));
    });

    let address_space = child_as.ok_or(KernelError::ProcessNotFound { pid: parent_pid })?;
    let address_space = address_space?;
    let (name, args, priority, heap_base, heap_end, mut trap_frame, fds, cwd, uid, gid) =
        snapshot.ok_or(KernelError::ProcessNotFound { pid: parent_pid })?;

    let (kernel_stack_base, kernel_stack_top) =
        crate::mm::kernel_stack::alloc(&address_space).ok_or(KernelError::ResourceExhausted { resource: "kernel stacks" })?;

    trap_frame.set_return_value(0);

    let pid = table::alloc_pid();
    let pcb = ProcessControlBlock {
        pid,
        parent: Some(parent_pid),
        name,
        args,
        state: ProcessState::Ready,
        priority,
        time_slice: DEFAULT_TIME_SLICE,
        total_time: 0,
        page_directory: address_space,
        kernel_stack_base,
        kernel_stack_top,
        user_stack_top: USER_STACK_TOP,
        heap_base,
        heap_end,
        trap_frame,
        fds,
        cwd,
        wait_status_ptr: 0,
        exit_code: 0,
        uid,
        gid,
    };
    table::insert(pcb)
}

/// Replace the calling process's image with a new ELF binary, in place
/// (same pid, same parent, fresh address space).
pub fn exec(pid: u32, elf_data: &[u8], args: Vec<String>) -> Result<(), KernelError> {
    let address_space = AddressSpace::create(Some(crate::mm::kernel_address_space()))?;
    let entry = crate::elf::load(elf_data, &address_space)?;
    map_user_stack(&address_space)?;

    let heap_base = USER_SPACE_START + 16 * 1024 * 1024;
    for i in 0..(HEAP_DEFAULT_SIZE / crate::mm::FRAME_SIZE) {
        address_space.map_alloc(
            heap_base + i * crate::mm::FRAME_SIZE,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        )?;
    }

    table::with(pid, |p| {
        p.page_directory.destroy();
        p.page_directory = address_space;
        p.trap_frame = TrapFrame::new_user(entry, USER_STACK_TOP as u32);
        p.heap_base = heap_base;
        p.heap_end = heap_base + HEAP_DEFAULT_SIZE;
        p.args = args;
    })
    .ok_or(KernelError::ProcessNotFound { pid })
}

/// Grow or shrink the calling process's heap. Returns the new break.
pub fn brk(pid: u32, requested_end: usize) -> Result<usize, KernelError> {
    table::with(pid, |p| -> Result<usize, KernelError> {
        let page = crate::mm::FRAME_SIZE;
        let old_pages_end = p.heap_end.div_ceil(page) * page;
        let new_pages_end = requested_end.div_ceil(page) * page;

        if new_pages_end > old_pages_end {
            let mut vaddr = old_pages_end;
            while vaddr < new_pages_end {
                p.page_directory.map_alloc(vaddr, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER)?;
                vaddr += page;
            }
        } else if new_pages_end < old_pages_end {
            let mut vaddr = new_pages_end;
            while vaddr < old_pages_end {
                let _ = p.page_directory.unmap(vaddr);
                vaddr += page;
            }
        }
        p.heap_end = requested_end;
        Ok(requested_end)
    })
    .ok_or(KernelError::ProcessNotFound { pid })?
}

/// Mark `pid` a zombie, record its exit code, and wake a parent blocked
/// in `wait`. Children are reparented to pid 1 (init), matching the
/// original kernel's orphan-reaping convention.
pub fn exit(pid: u32, code: i32) {
    table::reparent_children(pid, 1);
    table::with(pid, |p| {
        p.state = ProcessState::Zombie;
        p.exit_code = code;
    });
    if let Some(parent) = table::with(pid, |p| p.parent).flatten() {
        table::with(parent, |parent_pcb| {
            if let ProcessState::BlockedOnWait { child } = parent_pcb.state {
                if child.is_none() || child == Some(pid) {
                    parent_pcb.state = ProcessState::Ready;
                }
            }
        });
    }
}

/// Reap a zombie child of `parent_pid`, if one is already waiting.
/// Returns `(child_pid, exit_code)` and removes the zombie's table
/// entry, freeing its address space and kernel stack.
pub fn try_reap(parent_pid: u32, wanted: Option<u32>) -> Option<(u32, i32)> {
    let child_pid = table::find_zombie_child(parent_pid, wanted)?;
    let child = table::remove(child_pid)?;
    child.page_directory.destroy();
    crate::mm::kernel_stack::free_deferred(child.kernel_stack_base);
    Some((child_pid, child.exit_code))
}

/// Forcibly terminate `pid`. There is no general signal-delivery
/// mechanism; `kill` always terminates the target immediately with the
/// requested code, matching this kernel's reduced IPC surface.
pub fn kill(pid: u32, code: i32) -> Result<(), KernelError> {
    if table::with(pid, |_| ()).is_none() {
        return Err(KernelError::ProcessNotFound { pid });
    }
    exit(pid, code);
    Ok(())
}
