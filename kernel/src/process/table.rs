//! Fixed-size process table (component D).
//!
//! `MAX_PROCESSES` slots, each either empty or owning a boxed
//! `ProcessControlBlock`. pids are allocated monotonically (never
//! reused within a boot) and looked up by linear scan — the table is
//! small enough that this is simpler and no slower in practice than a
//! pid-to-slot index.

use super::pcb::{ProcessControlBlock, ProcessState};
use crate::fs::pipe;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

pub const MAX_PROCESSES: usize = 64;

static NEXT_PID: AtomicU32 = AtomicU32::new(1);
static TABLE: Mutex<[Option<Box<ProcessControlBlock>>; MAX_PROCESSES]> =
    Mutex::new([const { None }; MAX_PROCESSES]);
static CURRENT_PID: Mutex<Option<u32>> = Mutex::new(None);

pub fn alloc_pid() -> u32 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// Insert a freshly constructed process into the first free slot.
pub fn insert(pcb: ProcessControlBlock) -> Result<u32, crate::error::KernelError> {
    let pid = pcb.pid;
    let mut table = TABLE.lock();
    let slot = table
        .iter()
        .position(|e| e.is_none())
        .ok_or(crate::error::KernelError::ResourceExhausted { resource: "process table" })?;
    table[slot] = Some(Box::new(pcb));
    Ok(pid)
}

pub fn with<R>(pid: u32, f: impl FnOnce(&mut ProcessControlBlock) -> R) -> Option<R> {
    let mut table = TABLE.lock();
    table
        .iter_mut()
        .flatten()
        .find(|p| p.pid == pid)
        .map(|p| f(p))
}

pub fn remove(pid: u32) -> Option<Box<ProcessControlBlock>> {
    let mut table = TABLE.lock();
    let slot = table.iter().position(|e| e.as_ref().is_some_and(|p| p.pid == pid))?;
    table[slot].take()
}

pub fn find_zombie_child(parent: u32, wanted: Option<u32>) -> Option<u32> {
    let table = TABLE.lock();
    table
        .iter()
        .flatten()
        .find(|p| {
            p.parent == Some(parent)
                && p.is_zombie()
                && match wanted {
                    Some(w) => w == p.pid,
                    None => true,
                }
        })
        .map(|p| p.pid)
}

/// Whether `parent` has a live child matching `wanted` (any child if
/// `None`). A specific `wanted` pid that belongs to someone else's
/// family returns `false` even if `parent` has other children.
pub fn has_child(parent: u32, wanted: Option<u32>) -> bool {
    let table = TABLE.lock();
    table.iter().flatten().any(|p| {
        p.parent == Some(parent)
            && match wanted {
                Some(w) => w == p.pid,
                None => true,
            }
    })
}

pub fn for_each_runnable(mut f: impl FnMut(u32, u8)) {
    let table = TABLE.lock();
    for p in table.iter().flatten() {
        if p.is_runnable() {
            f(p.pid, p.priority);
        }
    }
}

pub fn reparent_children(old_parent: u32, new_parent: u32) {
    let mut table = TABLE.lock();
    for p in table.iter_mut().flatten() {
        if p.parent == Some(old_parent) {
            p.parent = Some(new_parent);
        }
    }
}

pub fn current_pid() -> Option<u32> {
    *CURRENT_PID.lock()
}

pub fn set_current_pid(pid: Option<u32>) {
    *CURRENT_PID.lock() = pid;
}

pub fn count(mut pred: impl FnMut(&ProcessControlBlock) -> bool) -> usize {
    TABLE.lock().iter().flatten().filter(|p| pred(p)).count()
}

/// Scan every blocked/sleeping process, transition the ones whose
/// wait condition is now satisfied to `Ready`, and return their
/// `(pid, priority)` so the caller can enqueue them on the scheduler's
/// ready queue. Called once per timer tick.
///
/// This only flips state -- it never touches user memory. A woken
/// `Sleeping` process gets its return value set directly here (sleep
/// has nothing left to do); a woken pipe reader/writer still has to
/// redo its actual read/write against the user buffer, which only the
/// syscall handler can do safely once that process's own address space
/// is active again -- its eip was rewound to the `int 0x80` instruction
/// before it blocked, so waking it just re-enters the syscall, which
/// will now see its condition satisfied and complete for real.
///
/// `BlockedOnWait` is not handled here: [`super::lifecycle::exit`]
/// wakes a waiting parent directly the moment its child becomes a
/// zombie, so there is nothing left for a periodic scan to find.
pub fn wake_ready(now_ticks: u64) -> Vec<(u32, u8)> {
    let mut woken = Vec::new();
    let mut table = TABLE.lock();
    for p in table.iter_mut().flatten() {
        let ready = match p.state {
            ProcessState::Sleeping { until_ticks } => {
                let due = until_ticks <= now_ticks;
                if due {
                    p.trap_frame.set_return_value(0);
                }
                due
            }
            ProcessState::BlockedOnPipe { pipe: id, for_read: true } => {
                pipe::has_data(id) || pipe::writers_remaining(id) == 0
            }
            ProcessState::BlockedOnPipe { pipe: id, for_read: false } => {
                pipe::has_space(id) || pipe::readers_remaining(id) == 0
            }
            ProcessState::BlockedOnKeyboard => crate::drivers::keyboard::has_input(),
            _ => false,
        };
        if ready {
            p.state = ProcessState::Ready;
            woken.push((p.pid, p.priority));
        }
    }
    woken
}
