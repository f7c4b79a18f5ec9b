//! Priority-preemptive, single-CPU scheduler (component D).
//!
//! Every interrupt return passes through a single `TrapFrame` living on
//! the interrupted process's kernel stack; a switch is just overwriting
//! that frame in place with the next process's saved frame before
//! `iretd` runs, after pointing the TSS at the next process's kernel
//! stack and loading its page directory. There is no separate
//! assembly context-switch routine — IRQ0 (the timer) is the only
//! preemption point, and syscalls that block do so by calling
//! [`block_current`] from inside the syscall's own interrupt handler,
//! before it returns.

use crate::arch::x86::context::TrapFrame;
use crate::arch::x86::gdt;
use crate::process::pcb::{ProcessState, DEFAULT_TIME_SLICE};
use crate::process::table;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::queue::ReadyQueue;

static READY: Mutex<ReadyQueue> = Mutex::new(ReadyQueue::new());
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    log::info!("[sched] priority round-robin scheduler ready");
}

pub fn current_tick() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub fn enqueue(pid: u32, priority: u8) {
    READY.lock().enqueue(pid, priority);
}

/// Overwrite `*frame` with `next_pid`'s saved trap frame, switch page
/// directories, point the TSS at the new kernel stack, flush any
/// kernel stacks deferred while `next_pid` was last descheduled, and
/// record `next_pid` as current and `Running`.
fn switch_to(frame: &mut TrapFrame, next_pid: u32) {
    table::with(next_pid, |next| {
        next.state = ProcessState::Running;
        *frame = next.trap_frame;
        // SAFETY: `next.page_directory` is a fully-initialized address
        // space owned by the process table; loading it here is safe
        // because interrupts are disabled for the duration of the
        // interrupt handler this runs inside of.
        unsafe {
            crate::arch::x86::load_page_directory(next.page_directory.phys_addr());
        }
        gdt::set_kernel_stack(next.kernel_stack_top as u32);
        crate::mm::kernel_stack::flush_deferred(&next.page_directory);
    });
    table::set_current_pid(Some(next_pid));
}

fn save_current(frame: &TrapFrame) -> Option<u32> {
    let current = table::current_pid()?;
    table::with(current, |p| p.trap_frame = *frame);
    Some(current)
}

/// Called from the IRQ0 handler on every timer tick.
pub fn on_timer_tick(frame: &mut TrapFrame) {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    for (pid, priority) in table::wake_ready(now) {
        enqueue(pid, priority);
    }

    let expired = match table::current_pid() {
        Some(pid) => table::with(pid, |p| {
            p.time_slice = p.time_slice.saturating_sub(1);
            p.time_slice == 0
        })
        .unwrap_or(true),
        None => true,
    };

    if !expired {
        return;
    }

    let mut ready = READY.lock();
    let next_pid = ready.dequeue();
    drop(ready);

    let Some(next_pid) = next_pid else {
        // Nobody else is ready; let the current process keep running
        // with a fresh slice.
        if let Some(pid) = table::current_pid() {
            table::with(pid, |p| p.time_slice = DEFAULT_TIME_SLICE);
        }
        return;
    };

    if let Some(current) = save_current(frame) {
        table::with(current, |p| {
            if p.state == ProcessState::Running {
                p.state = ProcessState::Ready;
                p.time_slice = DEFAULT_TIME_SLICE;
            }
        });
        if table::with(current, |p| p.state == ProcessState::Ready).unwrap_or(false) {
            READY.lock().enqueue(current, table::with(current, |p| p.priority).unwrap_or(2));
        }
    }

    switch_to(frame, next_pid);
}

/// Voluntarily give up the CPU (used by a `yield`-style syscall).
pub fn yield_now(frame: &mut TrapFrame) {
    let mut ready = READY.lock();
    let next_pid = ready.dequeue();
    drop(ready);

    let Some(next_pid) = next_pid else { return };

    if let Some(current) = save_current(frame) {
        table::with(current, |p| p.state = ProcessState::Ready);
        READY.lock().enqueue(current, table::with(current, |p| p.priority).unwrap_or(2));
    }
    switch_to(frame, next_pid);
}

/// Mark the current process `new_state` (a blocking condition) and
/// switch to the next ready process. If nothing else is ready, the
/// caller's frame is left untouched and the process busy-waits back
/// into the same handler on the next tick -- acceptable for a
/// single-CPU kernel with no other runnable work.
pub fn block_current(frame: &mut TrapFrame, new_state: ProcessState) {
    let mut ready = READY.lock();
    let next_pid = ready.dequeue();
    drop(ready);

    let Some(next_pid) = next_pid else { return };

    if let Some(current) = save_current(frame) {
        table::with(current, |p| p.state = new_state);
    }
    switch_to(frame, next_pid);
}

/// Start running the very first process. Never returns normally: it
/// loads `pid`'s page directory and overwrites `frame` with its trap
/// frame so the caller's `iretd` enters user space.
pub fn start_first(frame: &mut TrapFrame, pid: u32) {
    switch_to(frame, pid);
}
